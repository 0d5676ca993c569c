use serlink_frame::Reply;

/// Errors surfaced by session operations.
///
/// The session recovers from checksum failures, malformed lines, and
/// per-attempt timeouts locally inside its retry loop; only the variants
/// below reach callers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// I/O failure on the underlying stream. Fatal: the session is
    /// disconnected and must be reopened.
    #[error("transport fault: {0}")]
    Transport(#[from] serlink_transport::TransportError),

    /// The device explicitly rejected the command (NACK). Not retried:
    /// re-sending the identical command would repeat the rejection.
    #[error("command rejected: {0}")]
    Rejected(Reply),

    /// No ACK/NACK arrived within the budget across all attempts. The
    /// session stays usable; the caller may re-issue.
    #[error("no reply after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// The session already hit a fatal fault or was closed.
    #[error("session disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, SessionError>;
