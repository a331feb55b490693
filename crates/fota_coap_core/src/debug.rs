use std::fmt::Write;

use crate::error::FotaError;
use crate::message;

/// Renders the main fields of a datagram as text for troubleshooting.
pub fn debug_dump(datagram: &[u8]) -> Result<String, FotaError> {
    let parsed = message::decode(datagram)?;
    let token_len = (datagram[0] & 0x0f) as usize;

    let mut out = String::new();
    writeln!(&mut out, "=== CoAP datagram ===")?;
    writeln!(&mut out, "len: {} bytes", datagram.len())?;
    writeln!(
        &mut out,
        "header ({} bytes): {}",
        4 + token_len,
        hex::encode(&datagram[..4 + token_len])
    )?;
    writeln!(
        &mut out,
        "code: {}.{:02}  message_id: {}",
        parsed.code >> 5,
        parsed.code & 0x1f,
        parsed.message_id
    )?;
    match parsed.block2 {
        Some(block) => writeln!(
            &mut out,
            "block2: index={} more={} size={}",
            block.index, block.more, block.size
        )?,
        None => writeln!(&mut out, "block2: none")?,
    }
    writeln!(&mut out, "payload: {} bytes", parsed.payload.len())?;
    if !parsed.payload.is_empty() {
        let shown = parsed.payload.len().min(32);
        writeln!(
            &mut out,
            "payload hex (first {} bytes): {}",
            shown,
            hex::encode(&parsed.payload[..shown])
        )?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockDescriptor;
    use crate::message::{MessageWriter, Method, MAX_MSG_LEN, TOKEN_LEN};

    #[test]
    fn dump_names_the_block_descriptor() {
        let mut buf = [0u8; MAX_MSG_LEN];
        let mut writer =
            MessageWriter::new(&mut buf, Method::Get, 77, &[0u8; TOKEN_LEN]).expect("init");
        writer.append_path("fw.bin").expect("path");
        writer
            .append_block2(&BlockDescriptor {
                index: 3,
                more: true,
                size: 256,
            })
            .expect("block2");
        let len = writer.finish();

        let dump = debug_dump(&buf[..len]).expect("dump");
        assert!(dump.contains("block2: index=3 more=true size=256"));
        assert!(dump.contains("message_id: 77"));
    }

    #[test]
    fn dump_rejects_garbage() {
        assert!(debug_dump(&[0x00, 0x00]).is_err());
    }
}
