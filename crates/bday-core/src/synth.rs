//! Birthday event synthesis
//!
//! Turns a [`BirthdayRecord`] into the event it should have on the calendar.
//!
//! Recurrence policy:
//! - the first occurrence is the birth date when the year is known, otherwise
//!   the same day in the reference year 2000;
//! - events repeat yearly without an end date;
//! - Feb 29 birthdays recur on the last day of February, i.e. Feb 29 in leap
//!   years and Feb 28 otherwise.
//!
//! Rendered text uses `\n` line breaks and carries no surrounding whitespace,
//! so it reads back from the calendar exactly as written.

use crate::config::BirthdayConfig;
use crate::models::{BirthdayRecord, DesiredEvent, EventContent, REFERENCE_LEAP_YEAR, Reminder};
use crate::template::{render, render_reminder};
use chrono::NaiveDate;
use uuid::Uuid;

/// Prefix of every identity key
pub const IDENTITY_PREFIX: &str = "bday-sync:";

/// Plain yearly recurrence
pub const RRULE_YEARLY: &str = "FREQ=YEARLY";

/// Recurrence for Feb 29 birthdays
pub const RRULE_LEAP_DAY: &str = "FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=-1";

/// Templates and reminder settings for synthesized events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateConfig {
    pub title_template: String,
    pub description_template: String,
    pub reminder_template: String,
    pub reminder_days: Vec<u32>,
    pub category: String,
}

impl From<&BirthdayConfig> for TemplateConfig {
    fn from(config: &BirthdayConfig) -> Self {
        Self {
            title_template: config.title_template.clone(),
            description_template: config.description_template.clone(),
            reminder_template: config.reminder_template.clone(),
            reminder_days: config.reminder_days.clone(),
            category: config.category.clone(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self::from(&BirthdayConfig::default())
    }
}

/// Identity key correlating a contact with its calendar event
pub fn identity_key(contact_id: &str) -> String {
    format!("{}{}", IDENTITY_PREFIX, contact_id)
}

/// Deterministic iCalendar UID for an identity key
pub fn event_uid(identity_key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, identity_key.as_bytes()).to_string()
}

/// Date of the first occurrence
pub fn anchor_date(record: &BirthdayRecord) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        record.year.unwrap_or(REFERENCE_LEAP_YEAR),
        record.month,
        record.day,
    )
}

/// Recurrence rule for a record
pub fn recurrence_rule(record: &BirthdayRecord) -> &'static str {
    if record.is_leap_day() {
        RRULE_LEAP_DAY
    } else {
        RRULE_YEARLY
    }
}

/// Build the desired event for a record
///
/// Pure: the same inputs always give the same output.
pub fn synthesize(record: &BirthdayRecord, templates: &TemplateConfig) -> DesiredEvent {
    let name = record.display_name.as_str();
    let vars = [("name", name)];
    let key = identity_key(&record.contact_id);

    let mut days: Vec<u32> = templates.reminder_days.clone();
    days.sort_unstable();
    days.dedup();

    let reminders = days
        .into_iter()
        .map(|days_before| Reminder {
            days_before,
            message: clean_text(&render_reminder(&templates.reminder_template, name, days_before)),
        })
        .collect();

    // BirthdayRecord::new guarantees the date exists
    let start = anchor_date(record).unwrap_or_default();

    DesiredEvent {
        uid: event_uid(&key),
        identity_key: key,
        contact_id: record.contact_id.clone(),
        display_name: record.display_name.clone(),
        content: EventContent {
            summary: clean_text(&render(&templates.title_template, &vars)),
            description: clean_text(&render(&templates.description_template, &vars)),
            categories: vec![clean_text(&templates.category)],
            rrule: recurrence_rule(record).to_string(),
            start,
            reminders,
        },
    }
}

/// Normalize line breaks to `\n` and strip surrounding whitespace
fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Dates on which a recurrence rule produced by [`synthesize`] falls in `year`
///
/// Used to document and test the leap-day policy.
pub fn occurrence_in_year(record: &BirthdayRecord, year: i32) -> Option<NaiveDate> {
    if record.is_leap_day() {
        NaiveDate::from_ymd_opt(year, 2, 29).or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
    } else {
        NaiveDate::from_ymd_opt(year, record.month, record.day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> BirthdayRecord {
        BirthdayRecord::new("alice-uid", "Alice", 3, 14, Some(1990)).unwrap()
    }

    #[test]
    fn test_synthesize_defaults() {
        let event = synthesize(&alice(), &TemplateConfig::default());
        assert_eq!(event.identity_key, "bday-sync:alice-uid");
        assert_eq!(event.content.summary, "🎂 Alice's Birthday");
        assert_eq!(event.content.description, "Birthday of Alice");
        assert_eq!(event.content.categories, vec!["Birthday"]);
        assert_eq!(event.content.rrule, "FREQ=YEARLY");
        assert_eq!(event.content.start, NaiveDate::from_ymd_opt(1990, 3, 14).unwrap());
        assert_eq!(event.content.reminders.len(), 1);
        assert_eq!(
            event.content.reminders[0].message,
            "Reminder: Alice's birthday is in 1 day!"
        );
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let templates = TemplateConfig {
            reminder_days: vec![7, 1, 7, 0],
            ..Default::default()
        };
        let first = synthesize(&alice(), &templates);
        let second = synthesize(&alice(), &templates);
        assert_eq!(first, second);
        assert_eq!(first.uid, second.uid);
        let days: Vec<u32> = first.content.reminders.iter().map(|r| r.days_before).collect();
        assert_eq!(days, vec![0, 1, 7]);
    }

    #[test]
    fn test_identity_key_is_injective() {
        let a = BirthdayRecord::new("a", "Same Name", 1, 1, None).unwrap();
        let b = BirthdayRecord::new("b", "Same Name", 1, 1, None).unwrap();
        let ea = synthesize(&a, &TemplateConfig::default());
        let eb = synthesize(&b, &TemplateConfig::default());
        assert_ne!(ea.identity_key, eb.identity_key);
        assert_ne!(ea.uid, eb.uid);
    }

    #[test]
    fn test_yearless_anchor() {
        let record = BirthdayRecord::new("bob", "Bob", 7, 1, None).unwrap();
        let event = synthesize(&record, &TemplateConfig::default());
        assert_eq!(event.content.start, NaiveDate::from_ymd_opt(2000, 7, 1).unwrap());
    }

    #[test]
    fn test_leap_day_policy() {
        let record = BirthdayRecord::new("leap", "Leap", 2, 29, None).unwrap();
        let event = synthesize(&record, &TemplateConfig::default());
        assert_eq!(event.content.rrule, "FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=-1");
        assert_eq!(event.content.start, NaiveDate::from_ymd_opt(2000, 2, 29).unwrap());

        // Observed Feb 28 in non-leap years, Feb 29 otherwise
        assert_eq!(occurrence_in_year(&record, 2023), NaiveDate::from_ymd_opt(2023, 2, 28));
        assert_eq!(occurrence_in_year(&record, 2024), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(occurrence_in_year(&record, 2100), NaiveDate::from_ymd_opt(2100, 2, 28));

        // Synthesis does not depend on the current year
        assert_eq!(event, synthesize(&record, &TemplateConfig::default()));
    }

    #[test]
    fn test_leap_day_with_year() {
        let record = BirthdayRecord::new("leap", "Leap", 2, 29, Some(1992)).unwrap();
        let event = synthesize(&record, &TemplateConfig::default());
        assert_eq!(event.content.start, NaiveDate::from_ymd_opt(1992, 2, 29).unwrap());
        assert_eq!(event.content.rrule, RRULE_LEAP_DAY);
    }

    #[test]
    fn test_padded_and_crlf_templates_are_normalized() {
        let templates = TemplateConfig {
            title_template: "🎂 {name} ".to_string(),
            description_template: "Birthday of {name}\r\nCall!\r".to_string(),
            reminder_template: " {name} soon\r\n".to_string(),
            ..Default::default()
        };
        let event = synthesize(&alice(), &templates);
        assert_eq!(event.content.summary, "🎂 Alice");
        assert_eq!(event.content.description, "Birthday of Alice\nCall!");
        assert_eq!(event.content.reminders[0].message, "Alice soon");
    }

    #[test]
    fn test_custom_templates() {
        let templates = TemplateConfig {
            title_template: "{name} ({unknown})".to_string(),
            description_template: "Call {name}".to_string(),
            reminder_template: "{days}d until {name}".to_string(),
            reminder_days: vec![3],
            category: "Family".to_string(),
        };
        let event = synthesize(&alice(), &templates);
        assert_eq!(event.content.summary, "Alice ({unknown})");
        assert_eq!(event.content.description, "Call Alice");
        assert_eq!(event.content.reminders[0].message, "3d until Alice");
        assert_eq!(event.content.categories, vec!["Family"]);
    }
}
