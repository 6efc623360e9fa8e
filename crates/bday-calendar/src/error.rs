//! Error types for bday-calendar

use bday_core::DavError;
use thiserror::Error;

/// bday-calendar error type
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("CalDAV error: {0}")]
    CaldavError(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("XML parsing error: {0}")]
    XmlParseError(String),

    #[error("No calendars found at {0}")]
    NoCalendars(String),
}

impl CalendarError {
    /// Classify a failed HTTP response
    pub fn from_status(status: u16, context: &str) -> Self {
        match DavError::from_status(status, context) {
            DavError::Auth(msg) => Self::Authentication(msg),
            DavError::Connection(msg) => Self::Connection(msg),
            DavError::Timeout(msg) => Self::Timeout(msg),
            DavError::Validation(msg) => Self::Rejected(msg),
            DavError::Protocol(msg) => Self::CaldavError(msg),
        }
    }

    /// Classify a failed write; 403 there means the object was refused, not the login
    pub fn from_write_status(status: u16, context: &str) -> Self {
        if status == 403 {
            Self::Rejected(format!("{} (HTTP {})", context, status))
        } else {
            Self::from_status(status, context)
        }
    }
}

impl From<reqwest::Error> for CalendarError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

impl From<CalendarError> for DavError {
    fn from(e: CalendarError) -> Self {
        match e {
            CalendarError::Authentication(msg) => DavError::Auth(msg),
            CalendarError::Connection(msg) => DavError::Connection(msg),
            CalendarError::Timeout(msg) => DavError::Timeout(msg),
            CalendarError::Rejected(msg) | CalendarError::Configuration(msg) => {
                DavError::Validation(msg)
            }
            CalendarError::CaldavError(msg) | CalendarError::XmlParseError(msg) => {
                DavError::Protocol(msg)
            }
            other @ CalendarError::NoCalendars(_) => DavError::Protocol(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CalendarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            CalendarError::from_status(412, "PUT"),
            CalendarError::Rejected(_)
        ));
        assert!(matches!(
            CalendarError::from_status(403, "REPORT"),
            CalendarError::Authentication(_)
        ));
        assert!(matches!(
            CalendarError::from_write_status(403, "PUT"),
            CalendarError::Rejected(_)
        ));
        assert!(matches!(
            CalendarError::from_write_status(401, "PUT"),
            CalendarError::Authentication(_)
        ));
    }

    #[test]
    fn test_into_dav_error() {
        let err: DavError = CalendarError::Rejected("bad object".into()).into();
        assert_eq!(err, DavError::Validation("bad object".into()));
        assert!(!err.is_fatal());
        let err: DavError = CalendarError::Connection("refused".into()).into();
        assert!(err.is_fatal());
    }
}
