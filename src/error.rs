//! Engine error types.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine to callers.
///
/// The variants distinguish transport-level I/O from protocol violations
/// the engine detects itself, cooperative cancellation, and programmer
/// misuse of the public API (illegal state / illegal argument).
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure: unreachable host, reset connection, TLS
    /// handshake failure, or a timeout.
    #[error("I/O error: {0}")]
    Io(#[from] reqwest::Error),

    /// A protocol-level violation the engine detected itself: malformed
    /// response, unexpected interim response sequencing, too many
    /// follow-ups, a redirect with no `Location`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The call was canceled while in flight.
    #[error("canceled")]
    Canceled,

    /// Misuse of the public API: a `Call` executed twice, a `Chain`
    /// advanced twice, or an interceptor returned no response.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Invalid builder input: bad URL scheme, a method/body mismatch, or
    /// a required value left unset.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// A cache store or cookie jar collaborator failed.
    #[error("store error: {0}")]
    Store(String),

    /// URL parsing failure.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Local I/O failure, e.g. reading a streaming request body source.
    #[error("I/O error: {0}")]
    LocalIo(#[from] std::io::Error),
}

impl Error {
    /// Classifies whether this failure is one the retry policy is allowed
    /// to replay (§4.3). This only judges the error itself; callers still
    /// need to check cancellation and body-replayability separately.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// True if this is a cancellation failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// HTTP status code this error carries, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Io(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Error::IllegalState(message.into())
    }

    pub(crate) fn illegal_argument(message: impl Into<String>) -> Self {
        Error::IllegalArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_is_not_recoverable() {
        assert!(!Error::Canceled.is_recoverable());
        assert!(Error::Canceled.is_canceled());
    }

    #[test]
    fn illegal_state_display() {
        let err = Error::illegal_state("proceed() called twice");
        assert_eq!(err.to_string(), "illegal state: proceed() called twice");
    }
}
