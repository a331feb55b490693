//! Client core for a CoAP-style firmware-over-the-air protocol.
//!
//! A constrained device POSTs a compact TLV report of its identity, decodes
//! the server's directive, and optionally pulls a firmware image as a
//! deterministic sequence of 256-byte blocks over UDP.

mod block;
mod client;
mod debug;
mod error;
mod message;
mod report;
mod transport;

pub use crate::block::{fetch_blockwise, BlockControl, BlockDescriptor, TransferStats};
pub use crate::client::{ClientConfig, FotaClient};
pub use crate::debug::debug_dump;
pub use crate::error::FotaError;
pub use crate::message::{
    decode, is_success, MessageWriter, Method, ParsedMessage, TokenSource, BLOCK_SIZE, MAX_MSG_LEN,
    TOKEN_LEN,
};
pub use crate::report::{
    decode_directive, encode_report, DeviceReport, ServerDirective, DIRECTIVE_STR_MAX,
};

#[cfg(test)]
mod tests {
    use crate::{
        decode, decode_directive, encode_report, DeviceReport, MessageWriter, Method,
        ServerDirective, TokenSource, MAX_MSG_LEN,
    };

    #[test]
    fn report_request_carries_the_tlv_payload() {
        let report = DeviceReport {
            version: "2.1.0".to_string(),
            model: "Model 7".to_string(),
            serial: "A-1234".to_string(),
            manufacturer: "Lab5e AS".to_string(),
        };
        let payload = encode_report(&report).expect("encode report");

        let mut tokens = TokenSource::new(99);
        let mut buf = [0u8; MAX_MSG_LEN];
        let mut writer = MessageWriter::new(
            &mut buf,
            Method::Post,
            tokens.next_id(),
            &tokens.next_token(),
        )
        .expect("init");
        writer.append_path("fw").expect("path");
        writer.append_payload(&payload).expect("payload");
        let len = writer.finish();

        let parsed = decode(&buf[..len]).expect("decode");
        assert_eq!(parsed.payload, payload.as_slice());
    }

    #[test]
    fn directive_survives_a_reply_round_trip() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1, 7, b'1', b'0', b'.', b'0', b'.', b'0', b'.']);
        payload.extend_from_slice(&[2, 4, 0, 0, 0x16, 0x33]);
        payload.extend_from_slice(&[4, 1, 0]);

        let mut reply = vec![0x40, 0x45, 0x12, 0x34, 0xff];
        reply.extend_from_slice(&payload);

        let parsed = decode(&reply).expect("decode reply");
        let mut directive = ServerDirective {
            path: "default.bin".to_string(),
            ..ServerDirective::default()
        };
        decode_directive(&mut directive, parsed.payload).expect("decode directive");
        assert_eq!(directive.host, "10.0.0.");
        assert_eq!(directive.port, 5683);
        assert_eq!(directive.path, "default.bin");
        assert!(!directive.update_available);
    }
}
