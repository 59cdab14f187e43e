/// Errors that can occur during blob encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The type tag on the wire does not match the expected tag.
    #[error("type tag mismatch (expected {expected:?}, found {found:?})")]
    TypeMismatch { expected: String, found: String },

    /// A frame end was requested with no matching frame start.
    #[error("unbalanced nesting (end without matching start)")]
    UnbalancedNesting,

    /// The operation needs a seekable sink.
    #[error("unsupported on a non-seekable sink: {0}")]
    Unsupported(&'static str),

    /// The declared frame length disagrees with the bytes produced/consumed.
    #[error("frame length mismatch (declared {declared}, consumed {consumed})")]
    LengthMismatch { declared: u64, consumed: u64 },

    /// The input ended before a complete value could be read.
    #[error("truncated input (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// The type tag exceeds the maximum encodable length.
    #[error("type tag too long ({len} bytes, max {max})")]
    TagTooLong { len: usize, max: usize },

    /// A string value is not valid UTF-8.
    #[error("string value is not valid UTF-8")]
    InvalidString,

    /// An I/O error occurred on the underlying sink.
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BlobError>;
