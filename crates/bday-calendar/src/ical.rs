//! iCalendar generation and parsing for birthday events
//!
//! Built on the `icalendar` crate. TEXT values are escaped and unescaped here
//! since the crate passes them through verbatim.

use bday_core::vcard::unescape;
use bday_core::{DesiredEvent, EventContent, Reminder};
use chrono::{DateTime, Days, NaiveDate, Utc};
use icalendar::parser::{Component as ParsedComponent, read_calendar, unfold};
use icalendar::{Alarm, Calendar, Component, EventLike, Property, Trigger, ValueType};

/// Property carrying the identity key of events this service owns
pub const KEY_PROPERTY: &str = "X-BDAYSYNC-KEY";

const PRODID: &str = "-//bday-sync//birthdays//EN";

/// A VEVENT read back from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub uid: String,
    /// `None` for events not created by this service
    pub identity_key: Option<String>,
    pub content: EventContent,
}

/// Render a desired event as a VCALENDAR object
pub fn to_ical(event: &DesiredEvent, stamp: DateTime<Utc>) -> String {
    let content = &event.content;
    let end = content
        .start
        .checked_add_days(Days::new(1))
        .unwrap_or(content.start);

    let mut cal = Calendar::new();
    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    ics_event.add_property("DTSTAMP", stamp.format("%Y%m%dT%H%M%SZ").to_string());
    add_date_property(&mut ics_event, "DTSTART", content.start);
    add_date_property(&mut ics_event, "DTEND", end);
    ics_event.summary(&escape_text(&content.summary));

    if !content.description.is_empty() {
        ics_event.description(&escape_text(&content.description));
    }
    if !content.categories.is_empty() {
        let categories: Vec<String> = content.categories.iter().map(|c| escape_text(c)).collect();
        ics_event.add_property("CATEGORIES", categories.join(","));
    }
    ics_event.add_property("RRULE", &content.rrule);
    ics_event.add_property("TRANSP", "TRANSPARENT");
    ics_event.add_property(KEY_PROPERTY, escape_text(&event.identity_key));

    for reminder in &content.reminders {
        let days = chrono::Duration::days(i64::from(reminder.days_before));
        let alarm = Alarm::display(&escape_text(&reminder.message), Trigger::before_start(days));
        ics_event.alarm(alarm);
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    strip_bloat(&cal.to_string())
}

fn add_date_property(ics_event: &mut icalendar::Event, name: &str, date: NaiveDate) {
    let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
    prop.append_parameter(ValueType::Date);
    ics_event.append_property(prop);
}

/// Use our PRODID and drop the DTSTAMP/UID the crate adds to every VALARM
fn strip_bloat(ics: &str) -> String {
    let mut out = String::with_capacity(ics.len());
    let mut in_alarm = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            out.push_str("PRODID:");
            out.push_str(PRODID);
            out.push_str("\r\n");
            continue;
        }
        match line {
            "BEGIN:VALARM" => in_alarm = true,
            "END:VALARM" => in_alarm = false,
            _ => {}
        }
        if in_alarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// RFC 5545 TEXT escaping
///
/// A CR is folded into the line break it belongs to, so `\r\n` and `\n` both
/// read back as `\n`.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    out.push_str("\\n");
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Days before the event for a relative TRIGGER (`-P1D`, `-P2W`, `-PT24H`, `PT0S`)
///
/// Triggers after the start, or not on a whole day, are not ours and give `None`.
pub fn parse_trigger(value: &str) -> Option<u32> {
    let value = value.trim();
    let (negative, rest) = match value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };

    // Nine digits per component keep the sum well inside u64
    if rest.split(|c: char| !c.is_ascii_digit()).any(|run| run.len() > 9) {
        return None;
    }

    let duration: std::time::Duration = iso8601::duration(rest).ok()?.into();
    let seconds = duration.as_secs();

    if seconds == 0 && duration.subsec_nanos() == 0 {
        return Some(0);
    }
    if !negative || seconds % 86_400 != 0 || duration.subsec_nanos() != 0 {
        return None;
    }
    u32::try_from(seconds / 86_400).ok()
}

/// Read the first VEVENT of a calendar object
///
/// Returns `None` when the object holds no usable VEVENT.
pub fn parse_event(ics: &str) -> Option<ParsedEvent> {
    let unfolded = unfold(ics);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let uid = vevent.find_prop("UID")?.val.to_string();
    let start = parse_date(vevent.find_prop("DTSTART")?.val.as_ref())?;

    let identity_key = text_prop(vevent, KEY_PROPERTY);
    let summary = text_prop(vevent, "SUMMARY").unwrap_or_default();
    let description = text_prop(vevent, "DESCRIPTION").unwrap_or_default();
    let rrule = vevent
        .find_prop("RRULE")
        .map(|p| p.val.to_string())
        .unwrap_or_default();

    let categories: Vec<String> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "CATEGORIES")
        .flat_map(|p| split_list(p.val.as_ref()))
        .collect();

    let mut reminders: Vec<Reminder> = vevent
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .filter_map(|alarm| {
            let days_before = parse_trigger(alarm.find_prop("TRIGGER")?.val.as_ref())?;
            Some(Reminder {
                days_before,
                message: text_prop(alarm, "DESCRIPTION").unwrap_or_default(),
            })
        })
        .collect();
    reminders.sort();

    Some(ParsedEvent {
        uid,
        identity_key,
        content: EventContent {
            summary,
            description,
            categories,
            rrule,
            start,
            reminders,
        },
    })
}

fn text_prop(component: &ParsedComponent<'_>, name: &str) -> Option<String> {
    component.find_prop(name).map(|p| unescape(p.val.as_ref()))
}

/// `20000314` or `20000314T000000[Z]`
fn parse_date(value: &str) -> Option<NaiveDate> {
    let date = value.get(..8)?;
    NaiveDate::parse_from_str(date, "%Y%m%d").ok()
}

/// Split a TEXT list on unescaped commas
fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            items.push(unescape(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    items.push(unescape(&current));
    items.retain(|item| !item.is_empty());
    items
}
