//! bday-calendar: CalDAV event sink for bday-sync
//!
//! This crate writes yearly all-day birthday events, with reminders, to a
//! CalDAV calendar and reads them back for reconciliation. Only events
//! carrying an `X-BDAYSYNC-KEY` property are considered; everything else on
//! the calendar is left alone.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bday_calendar::CalendarClient;
//! use bday_core::{DavConfig, EventSink};
//!
//! let config = DavConfig::new("https://caldav.example.com/", "user", "password")
//!     .with_collection("calendars/user/birthdays/");
//! let client = CalendarClient::new(config, Duration::from_secs(30))?;
//!
//! let events = client.list_events().await?;
//! ```

pub mod client;
pub mod error;
pub mod ical;

pub use client::CalendarClient;
pub use error::{CalendarError, Result};
