//! Error types for chatlog

use thiserror::Error;

/// The main error type for chatlog operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// The history backend could not be reached while opening a session.
    ///
    /// This is terminal for the session being opened.
    #[error("History backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),

    /// One stored record could not be turned back into a message
    #[error("Record {index} could not be decoded: {reason}")]
    RecordDecode {
        /// Position of the record in backend order
        index: usize,
        /// Decoder message
        reason: String,
    },

    /// A backend append or delete failed after the in-memory log was updated
    #[error("History backend write failed: {0}")]
    BackendWrite(#[source] BackendError),
}

/// A specialized Result type for chatlog operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Failure reported by a history backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The store could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// The store rejected or failed a request
    #[error("request failed: {0}")]
    Request(String),

    /// The store answered with something we cannot use
    #[error("unexpected response: {0}")]
    Response(String),
}

impl From<redis::RedisError> for BackendError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            BackendError::Connection(e.to_string())
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            BackendError::Connection(e.to_string())
        } else if e.is_decode() {
            BackendError::Response(e.to_string())
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = Error::BackendUnavailable(BackendError::Connection("refused".to_string()));
        assert_eq!(
            err.to_string(),
            "History backend unavailable: connection failed: refused"
        );
    }

    #[test]
    fn test_record_decode_display() {
        let err = Error::RecordDecode {
            index: 3,
            reason: "unknown type".to_string(),
        };
        assert_eq!(err.to_string(), "Record 3 could not be decoded: unknown type");
    }
}
