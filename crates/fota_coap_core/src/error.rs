use thiserror::Error;

#[derive(Debug, Error)]
pub enum FotaError {
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
    #[error("cannot resolve {0}")]
    UnresolvedHost(String),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error("message does not fit in the {0}-byte wire buffer")]
    BufferTooSmall(usize),
    #[error("empty resource path")]
    EmptyPath,
    #[error("path segment is {0} bytes, maximum is 255")]
    PathSegmentTooLong(usize),
    #[error("block index {0} does not fit in a Block2 option")]
    BlockIndexTooLarge(u32),
    #[error("unsupported block size {0}")]
    UnsupportedBlockSize(u16),
    #[error("report field is {0} bytes, maximum is 255")]
    ReportFieldTooLong(usize),
    #[error("truncated message header")]
    TruncatedHeader,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid token length {0}")]
    InvalidTokenLength(u8),
    #[error("truncated or reserved option encoding at offset {0}")]
    InvalidOption(usize),
    #[error("error response code {0:#04x} from peer")]
    ErrorResponse(u8),
    #[error("reply carries no block descriptor")]
    MissingBlockDescriptor,
    #[error("invalid Block2 option value")]
    InvalidBlockOption,
    #[error("unknown record tag {0}")]
    UnknownTag(u8),
    #[error("record for tag {tag} is {actual} bytes, expected {expected}")]
    RecordLengthMismatch {
        tag: u8,
        expected: usize,
        actual: usize,
    },
    #[error("truncated record")]
    TruncatedRecord,
    #[error("directive field is {len} bytes, maximum is {max}")]
    DirectiveFieldTooLong { len: usize, max: usize },
    #[error("invalid UTF-8 in record: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("transfer cancelled by caller (signal {0})")]
    Cancelled(i32),
    #[error("format error: {0}")]
    Fmt(#[from] std::fmt::Error),
}
