use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Capture is empty or smaller than one transport packet.
    #[error("not a transport stream: {0}")]
    NotAStream(String),

    /// Sync byte missing at an expected packet boundary. The demuxer
    /// recovers by scanning forward; callers only see this when no
    /// further sync byte exists.
    #[error("framing error at byte offset {offset}")]
    Framing { offset: usize },

    /// A bit-level read ran past the end of the available data. Always
    /// caught per sub-unit; it means "malformed or truncated input",
    /// not a programming error.
    #[error("truncated input: needed {needed} bits, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, TsError>;
