//! TLV codec for the device report and the server directive.
//!
//! Both sides of the exchange are flat `{tag, len, value}` sequences with no
//! terminator and no total-length prefix. Reports are only ever encoded,
//! directives only ever decoded.

use crate::error::FotaError;

const TAG_FIRMWARE_VERSION: u8 = 1;
const TAG_MODEL_NUMBER: u8 = 2;
const TAG_SERIAL_NUMBER: u8 = 3;
const TAG_MANUFACTURER: u8 = 4;

const TAG_HOST: u8 = 1;
const TAG_PORT: u8 = 2;
const TAG_PATH: u8 = 3;
const TAG_AVAILABLE: u8 = 4;

/// Longest host or path string a directive may carry.
pub const DIRECTIVE_STR_MAX: usize = 24;

/// Device identity reported to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub version: String,
    pub model: String,
    pub serial: String,
    pub manufacturer: String,
}

/// Encodes the four identity fields in fixed tag order.
///
/// Each field must fit a one-byte length; longer strings are a caller
/// contract violation.
pub fn encode_report(report: &DeviceReport) -> Result<Vec<u8>, FotaError> {
    let fields = [
        (TAG_FIRMWARE_VERSION, &report.version),
        (TAG_MODEL_NUMBER, &report.model),
        (TAG_SERIAL_NUMBER, &report.serial),
        (TAG_MANUFACTURER, &report.manufacturer),
    ];
    let mut out = Vec::with_capacity(fields.iter().map(|(_, v)| 2 + v.len()).sum());
    for (tag, value) in fields {
        let bytes = value.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(FotaError::ReportFieldTooLong(bytes.len()));
        }
        out.push(tag);
        out.push(bytes.len() as u8);
        out.extend_from_slice(bytes);
    }
    Ok(out)
}

/// What the server wants the device to do next.
///
/// Every field is optional on the wire; absent tags leave the caller's
/// pre-initialized defaults untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDirective {
    pub host: String,
    pub port: u32,
    pub path: String,
    pub update_available: bool,
}

/// Decodes a directive record, committing to `directive` only when the whole
/// buffer parses. An unknown tag or a length mismatch aborts the decode with
/// no partial writes observable by the caller.
pub fn decode_directive(directive: &mut ServerDirective, buf: &[u8]) -> Result<(), FotaError> {
    let mut scratch = directive.clone();
    let mut pos = 0;
    while pos < buf.len() {
        let tag = buf[pos];
        pos += 1;
        match tag {
            TAG_HOST => scratch.host = read_string(buf, &mut pos)?,
            TAG_PORT => scratch.port = read_u32(buf, &mut pos, tag)?,
            TAG_PATH => scratch.path = read_string(buf, &mut pos)?,
            TAG_AVAILABLE => scratch.update_available = read_bool(buf, &mut pos, tag)?,
            other => return Err(FotaError::UnknownTag(other)),
        }
    }
    *directive = scratch;
    Ok(())
}

fn read_len(buf: &[u8], pos: &mut usize) -> Result<usize, FotaError> {
    if *pos >= buf.len() {
        return Err(FotaError::TruncatedRecord);
    }
    let len = buf[*pos] as usize;
    *pos += 1;
    Ok(len)
}

fn read_value<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], FotaError> {
    if *pos + len > buf.len() {
        return Err(FotaError::TruncatedRecord);
    }
    let value = &buf[*pos..*pos + len];
    *pos += len;
    Ok(value)
}

fn read_string(buf: &[u8], pos: &mut usize) -> Result<String, FotaError> {
    let len = read_len(buf, pos)?;
    if len > DIRECTIVE_STR_MAX {
        return Err(FotaError::DirectiveFieldTooLong {
            len,
            max: DIRECTIVE_STR_MAX,
        });
    }
    let value = read_value(buf, pos, len)?;
    Ok(std::str::from_utf8(value)?.to_string())
}

fn read_u32(buf: &[u8], pos: &mut usize, tag: u8) -> Result<u32, FotaError> {
    let len = read_len(buf, pos)?;
    if len != 4 {
        return Err(FotaError::RecordLengthMismatch {
            tag,
            expected: 4,
            actual: len,
        });
    }
    let value = read_value(buf, pos, len)?;
    Ok(u32::from_be_bytes([value[0], value[1], value[2], value[3]]))
}

fn read_bool(buf: &[u8], pos: &mut usize, tag: u8) -> Result<bool, FotaError> {
    let len = read_len(buf, pos)?;
    if len != 1 {
        return Err(FotaError::RecordLengthMismatch {
            tag,
            expected: 1,
            actual: len,
        });
    }
    Ok(read_value(buf, pos, len)?[0] == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_record(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
        out.push(tag);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
    }

    #[test]
    fn report_layout_is_fixed_order_tlv() {
        let report = DeviceReport {
            version: "1.0.0".to_string(),
            model: "Model 1".to_string(),
            serial: "00001".to_string(),
            manufacturer: "Lab5e AS".to_string(),
        };
        let encoded = encode_report(&report).expect("encode");

        let expected_len = [&report.version, &report.model, &report.serial, &report.manufacturer]
            .iter()
            .map(|f| 2 + f.len())
            .sum::<usize>();
        assert_eq!(encoded.len(), expected_len);

        let mut pos = 0;
        for (tag, value) in [
            (1u8, &report.version),
            (2, &report.model),
            (3, &report.serial),
            (4, &report.manufacturer),
        ] {
            assert_eq!(encoded[pos], tag);
            assert_eq!(encoded[pos + 1] as usize, value.len());
            assert_eq!(&encoded[pos + 2..pos + 2 + value.len()], value.as_bytes());
            pos += 2 + value.len();
        }
    }

    #[test]
    fn oversized_report_field_rejected() {
        let report = DeviceReport {
            version: "v".repeat(256),
            model: String::new(),
            serial: String::new(),
            manufacturer: String::new(),
        };
        assert!(matches!(
            encode_report(&report),
            Err(FotaError::ReportFieldTooLong(256))
        ));
    }

    #[test]
    fn directive_decodes_independent_of_tag_order() {
        let mut forward = Vec::new();
        push_record(&mut forward, 1, b"10.0.0.2");
        push_record(&mut forward, 2, &5683u32.to_be_bytes());
        push_record(&mut forward, 3, b"firmware.bin");
        push_record(&mut forward, 4, &[1]);

        let mut reversed = Vec::new();
        push_record(&mut reversed, 4, &[1]);
        push_record(&mut reversed, 3, b"firmware.bin");
        push_record(&mut reversed, 2, &5683u32.to_be_bytes());
        push_record(&mut reversed, 1, b"10.0.0.2");

        for buf in [forward, reversed] {
            let mut directive = ServerDirective::default();
            decode_directive(&mut directive, &buf).expect("decode");
            assert_eq!(directive.host, "10.0.0.2");
            assert_eq!(directive.port, 5683);
            assert_eq!(directive.path, "firmware.bin");
            assert!(directive.update_available);
        }
    }

    #[test]
    fn absent_tags_keep_caller_defaults() {
        let mut buf = Vec::new();
        push_record(&mut buf, 4, &[0]);

        let mut directive = ServerDirective {
            host: "fallback.local".to_string(),
            port: 9999,
            path: "fallback".to_string(),
            update_available: true,
        };
        decode_directive(&mut directive, &buf).expect("decode");
        assert_eq!(directive.host, "fallback.local");
        assert_eq!(directive.port, 9999);
        assert_eq!(directive.path, "fallback");
        assert!(!directive.update_available);
    }

    #[test]
    fn unknown_tag_fails_without_partial_writes() {
        let mut buf = Vec::new();
        push_record(&mut buf, 1, b"10.0.0.2");
        push_record(&mut buf, 9, b"x");

        let mut directive = ServerDirective::default();
        let err = decode_directive(&mut directive, &buf).unwrap_err();
        assert!(matches!(err, FotaError::UnknownTag(9)));
        // The host record before the unknown tag must not leak through.
        assert_eq!(directive, ServerDirective::default());
    }

    #[test]
    fn port_length_must_be_four() {
        let mut buf = Vec::new();
        push_record(&mut buf, 2, &[0x16, 0x33]);
        let mut directive = ServerDirective::default();
        assert!(matches!(
            decode_directive(&mut directive, &buf),
            Err(FotaError::RecordLengthMismatch {
                tag: 2,
                expected: 4,
                actual: 2,
            })
        ));
    }

    #[test]
    fn flag_length_must_be_one() {
        let mut buf = Vec::new();
        push_record(&mut buf, 4, &[1, 1]);
        let mut directive = ServerDirective::default();
        assert!(matches!(
            decode_directive(&mut directive, &buf),
            Err(FotaError::RecordLengthMismatch { tag: 4, .. })
        ));
    }

    #[test]
    fn oversized_directive_string_rejected_not_truncated() {
        let long = "h".repeat(DIRECTIVE_STR_MAX + 1);
        let mut buf = Vec::new();
        push_record(&mut buf, 1, long.as_bytes());
        let mut directive = ServerDirective::default();
        let err = decode_directive(&mut directive, &buf).unwrap_err();
        assert!(matches!(err, FotaError::DirectiveFieldTooLong { len: 25, .. }));
        assert!(directive.host.is_empty());
    }

    #[test]
    fn truncated_record_rejected() {
        // Declares 8 value bytes but carries 3.
        let buf = [1u8, 8, b'a', b'b', b'c'];
        let mut directive = ServerDirective::default();
        assert!(matches!(
            decode_directive(&mut directive, &buf),
            Err(FotaError::TruncatedRecord)
        ));
    }
}
