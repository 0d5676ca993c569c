/// Errors that can occur while decoding a frame candidate.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The line carried the frame marking but could not be split into
    /// payload and checksum fields.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The checksum recomputed over the payload does not match the
    /// transmitted checksum.
    #[error("checksum mismatch (expected {expected}, found {found})")]
    ChecksumMismatch { expected: u8, found: u8 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
