//! Error types for bday-contacts

use bday_core::DavError;
use thiserror::Error;

/// bday-contacts error type
#[derive(Error, Debug)]
pub enum ContactsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("CardDAV error: {0}")]
    CarddavError(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("XML parsing error: {0}")]
    XmlParseError(String),

    #[error("No addressbooks found at {0}")]
    NoAddressbooks(String),
}

impl ContactsError {
    /// Classify a failed HTTP response
    pub fn from_status(status: u16, context: &str) -> Self {
        match DavError::from_status(status, context) {
            DavError::Auth(msg) => Self::Authentication(msg),
            DavError::Connection(msg) => Self::Connection(msg),
            DavError::Timeout(msg) => Self::Timeout(msg),
            other => Self::CarddavError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ContactsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

impl From<ContactsError> for DavError {
    fn from(e: ContactsError) -> Self {
        match e {
            ContactsError::Authentication(msg) => DavError::Auth(msg),
            ContactsError::Connection(msg) => DavError::Connection(msg),
            ContactsError::Timeout(msg) => DavError::Timeout(msg),
            ContactsError::XmlParseError(msg) | ContactsError::CarddavError(msg) => {
                DavError::Protocol(msg)
            }
            ContactsError::Configuration(msg) => DavError::Validation(msg),
            other @ ContactsError::NoAddressbooks(_) => DavError::Protocol(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ContactsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ContactsError::from_status(401, "fetch"),
            ContactsError::Authentication(_)
        ));
        assert!(matches!(
            ContactsError::from_status(503, "fetch"),
            ContactsError::Connection(_)
        ));
        assert!(matches!(
            ContactsError::from_status(404, "fetch"),
            ContactsError::CarddavError(_)
        ));
    }

    #[test]
    fn test_into_dav_error() {
        let err: DavError = ContactsError::Authentication("denied".into()).into();
        assert!(err.is_fatal());
        let err: DavError = ContactsError::NoAddressbooks("https://dav.example.com/".into()).into();
        assert!(matches!(err, DavError::Protocol(ref m) if m.contains("No addressbooks")));
        let err: DavError = ContactsError::Timeout("slow".into()).into();
        assert_eq!(err, DavError::Timeout("slow".into()));
    }
}
