use std::io;

/// Terminal errors delivered through request completions.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The channel went inactive while the request was in flight.
    #[error("channel disconnected")]
    Disconnected,
    /// The channel refused a write after the request was accepted.
    #[error("write rejected")]
    Rejected,
    /// Transport-level failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
