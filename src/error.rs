use std::io;
use std::time::Duration;
use thiserror::Error;

/// type alias for all keyscope operations that could fail with a [`KeyscopeError`]
pub type Result<T> = std::result::Result<T, KeyscopeError>;

/// The error variants returned by the catalog client and its collaborators.
///
/// Each variant maps onto one failure class a caller may want to react to differently:
/// a bad connection target is never worth retrying, a timeout means "slow" rather than
/// "unreachable", and a payload error guarantees nothing was written.
#[derive(Debug, Error)]
pub enum KeyscopeError {
    /// malformed connection target or missing required field
    #[error("configuration error: {0}")]
    Config(String),

    /// the store could not be reached, authenticated against, or reconnect attempts ran out
    #[error("connection error: {0}")]
    Connection(String),

    /// the store replied with something other than what the command promises
    #[error("protocol error: {0}")]
    Protocol(String),

    /// the operation did not complete before its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// a structured write payload could not be parsed; no mutation happened
    #[error("payload error: {0}")]
    Payload(String),

    /// local I/O failure (settings file, worker thread spawn)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// local JSON failure outside of write payloads (settings file, report output)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KeyscopeError {
    /// true for the errors that mean the store itself could not be reached
    pub fn is_connection(&self) -> bool {
        matches!(self, KeyscopeError::Connection(_))
    }

    /// true if the operation lost its race against a deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, KeyscopeError::Timeout(_))
    }
}
