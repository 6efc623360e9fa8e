//! Data models shared by the contact source, the event sink and the reconciler

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw contact as delivered by the contact source
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Contact {
    /// Server path of the vCard object
    pub href: String,
    /// ETag reported by the server
    #[serde(default)]
    pub etag: Option<String>,
    /// Unparsed vCard text
    pub vcard: String,
}

impl Contact {
    pub fn new(href: impl Into<String>, vcard: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            etag: None,
            vcard: vcard.into(),
        }
    }
}

/// Birthday of one contact, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayRecord {
    /// Stable contact identifier (vCard UID, or href as fallback)
    pub contact_id: String,
    /// Name used in templates
    pub display_name: String,
    /// 1..=12
    pub month: u32,
    /// Valid for `month` in a leap year
    pub day: u32,
    /// Birth year, when the contact declares one
    pub year: Option<i32>,
}

impl BirthdayRecord {
    /// Build a record, rejecting impossible dates
    ///
    /// Feb 29 is accepted without a year; with a year the full date must exist.
    pub fn new(
        contact_id: impl Into<String>,
        display_name: impl Into<String>,
        month: u32,
        day: u32,
        year: Option<i32>,
    ) -> Option<Self> {
        NaiveDate::from_ymd_opt(year.unwrap_or(REFERENCE_LEAP_YEAR), month, day)?;
        Some(Self {
            contact_id: contact_id.into(),
            display_name: display_name.into(),
            month,
            day,
            year,
        })
    }

    pub fn is_leap_day(&self) -> bool {
        self.month == 2 && self.day == 29
    }
}

/// Year used to anchor birthdays whose year is unknown
pub const REFERENCE_LEAP_YEAR: i32 = 2000;

/// One VALARM of a birthday event
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reminder {
    /// Days before the event
    pub days_before: u32,
    /// Alarm text
    pub message: String,
}

/// The comparable part of a birthday event
///
/// Holds no timestamps: DTSTAMP, LAST-MODIFIED and SEQUENCE never take part
/// in comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContent {
    pub summary: String,
    pub description: String,
    pub categories: Vec<String>,
    pub rrule: String,
    /// First occurrence (all-day)
    pub start: NaiveDate,
    /// Sorted by `days_before`
    pub reminders: Vec<Reminder>,
}

/// The event a contact should have on the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredEvent {
    /// Correlation key, independent of server object ids
    pub identity_key: String,
    /// iCalendar UID used when the event is created
    pub uid: String,
    pub contact_id: String,
    pub display_name: String,
    pub content: EventContent,
}

/// Server-side address of a calendar object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandle {
    /// Object href on the CalDAV server
    pub href: String,
    /// ETag for conditional updates
    #[serde(default)]
    pub etag: Option<String>,
    /// UID of the stored VEVENT
    pub uid: String,
}

/// A birthday event already present on the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingEvent {
    /// Recovered from the X-BDAYSYNC-KEY property
    pub identity_key: String,
    pub handle: EventHandle,
    pub content: EventContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_validation() {
        assert!(BirthdayRecord::new("a", "A", 3, 14, Some(1990)).is_some());
        assert!(BirthdayRecord::new("a", "A", 2, 29, None).is_some());
        assert!(BirthdayRecord::new("a", "A", 2, 29, Some(1992)).is_some());
        assert!(BirthdayRecord::new("a", "A", 2, 29, Some(1991)).is_none());
        assert!(BirthdayRecord::new("a", "A", 4, 31, None).is_none());
        assert!(BirthdayRecord::new("a", "A", 13, 1, None).is_none());
        assert!(BirthdayRecord::new("a", "A", 0, 1, None).is_none());
    }

    #[test]
    fn test_leap_day() {
        let record = BirthdayRecord::new("a", "A", 2, 29, None).unwrap();
        assert!(record.is_leap_day());
        let record = BirthdayRecord::new("a", "A", 2, 28, None).unwrap();
        assert!(!record.is_leap_day());
    }
}
