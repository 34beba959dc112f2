use thiserror::Error;

/// Failures a relay call can report to its caller.
///
/// `InvalidRequest` and `UpstreamUnreachable` are returned before any stream
/// exists. The other two variants describe upstream trouble once the call is
/// underway and end up rendered in-band as the stream's last event.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },
    #[error("upstream stream failed: {0}")]
    UpstreamMidStream(String),
    #[error("relay setup failed: {0}")]
    Setup(String),
}

impl RelayError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }
}
