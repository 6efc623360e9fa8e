//! Error types for bday-core

use thiserror::Error;

/// Main error type for bday-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Contact source error: {0}")]
    Source(DavError),

    #[error("Event sink error: {0}")]
    Sink(DavError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by the CardDAV/CalDAV collaborators.
///
/// `Connection` and `Auth` are fatal for the cycle when they happen at the
/// collection level. Everything raised by a single create/update call only
/// fails that record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DavError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DavError {
    /// Map an HTTP status of a failed DAV request to an error kind
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let message = format!("{} (HTTP {})", context.into(), status);
        match status {
            401 | 403 => Self::Auth(message),
            400 | 409 | 412 | 415 | 422 => Self::Validation(message),
            408 | 504 => Self::Timeout(message),
            500..=599 => Self::Connection(message),
            _ => Self::Protocol(message),
        }
    }

    /// Whether this error means the whole remote collection is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Auth(_))
    }
}

/// Result type alias for bday-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(DavError::from_status(401, "list"), DavError::Auth(_)));
        assert!(matches!(DavError::from_status(403, "list"), DavError::Auth(_)));
        assert!(matches!(DavError::from_status(412, "put"), DavError::Validation(_)));
        assert!(matches!(DavError::from_status(503, "put"), DavError::Connection(_)));
        assert!(matches!(DavError::from_status(504, "put"), DavError::Timeout(_)));
        assert!(matches!(DavError::from_status(404, "put"), DavError::Protocol(_)));
    }

    #[test]
    fn test_is_fatal() {
        assert!(DavError::Connection("down".into()).is_fatal());
        assert!(DavError::Auth("denied".into()).is_fatal());
        assert!(!DavError::Validation("bad".into()).is_fatal());
        assert!(!DavError::Timeout("slow".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::Source(DavError::Auth("bad password (HTTP 401)".into()));
        assert_eq!(
            err.to_string(),
            "Contact source error: authentication error: bad password (HTTP 401)"
        );
    }
}
