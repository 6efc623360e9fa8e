//! Birthday extraction from raw vCards
//!
//! Contacts without a usable BDAY are skipped, never reported as errors.

use crate::models::{BirthdayRecord, Contact, REFERENCE_LEAP_YEAR};
use crate::vcard::{self, Property};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

/// Why a BDAY value could not be read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BirthdayParseError {
    #[error("birthday is free text: {0}")]
    TextValue(String),

    #[error("unknown birthday format: {0}")]
    UnknownFormat(String),

    #[error("impossible date: {0}")]
    InvalidDate(String),
}

/// Month/day with optional year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthdayDate {
    pub month: u32,
    pub day: u32,
    pub year: Option<i32>,
}

/// Extract a normalized birthday from a contact
///
/// Returns `None` when the contact has no BDAY, no identity, or the value is malformed.
pub fn extract(contact: &Contact) -> Option<BirthdayRecord> {
    let properties = vcard::parse(&contact.vcard);
    if properties.is_empty() {
        debug!(href = %contact.href, "Skipping object without vCard content");
        return None;
    }

    let name = display_name(&properties);

    let Some(bday) = properties.iter().find(|p| p.name == "BDAY") else {
        debug!(contact = %name, "No birthday found");
        return None;
    };

    let contact_id = match properties
        .iter()
        .find(|p| p.name == "UID")
        .map(|p| vcard::unescape(&p.value))
        .filter(|uid| !uid.trim().is_empty())
    {
        Some(uid) => uid.trim().to_string(),
        None if !contact.href.is_empty() => contact.href.clone(),
        None => {
            debug!(contact = %name, "Skipping contact without UID or href");
            return None;
        }
    };

    let date = match parse_birthday(bday) {
        Ok(date) => date,
        Err(e) => {
            debug!(contact = %name, value = %bday.value, "Could not parse birthday: {}", e);
            return None;
        }
    };

    let record = BirthdayRecord::new(contact_id, name, date.month, date.day, date.year);
    if record.is_none() {
        debug!(value = %bday.value, "Birthday is not a valid calendar date");
    }
    record
}

/// Display name: FN, else "Given Family" from N, else "Unknown"
fn display_name(properties: &[Property]) -> String {
    if let Some(fn_prop) = properties.iter().find(|p| p.name == "FN") {
        let name = vcard::unescape(&fn_prop.value).trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }

    if let Some(n_prop) = properties.iter().find(|p| p.name == "N") {
        let parts = vcard::components(&n_prop.value);
        let family = parts.first().map(|s| s.trim()).unwrap_or_default();
        let given = parts.get(1).map(|s| s.trim()).unwrap_or_default();
        let name = [given, family]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            return name;
        }
    }

    "Unknown".to_string()
}

/// Parse a BDAY property, honouring VALUE=text and X-APPLE-OMIT-YEAR
pub fn parse_birthday(property: &Property) -> Result<BirthdayDate, BirthdayParseError> {
    if property
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("text"))
    {
        return Err(BirthdayParseError::TextValue(property.value.clone()));
    }

    let mut date = parse_birthday_value(&property.value)?;

    let omitted_year = property
        .param("X-APPLE-OMIT-YEAR")
        .and_then(|v| v.trim().parse::<i32>().ok());
    if date.year.is_some() && date.year == omitted_year {
        date.year = None;
    }

    Ok(date)
}

/// Parse the date forms found in the wild
///
/// `YYYYMMDD`, `YYYY-MM-DD` (optionally followed by a time part), `--MMDD`,
/// `--MM-DD`, `MM/DD/YYYY` and, when that reading is impossible, `DD/MM/YYYY`.
/// Year `0000` means "no year".
pub fn parse_birthday_value(value: &str) -> Result<BirthdayDate, BirthdayParseError> {
    let raw = value.trim();
    let clean = raw.split('T').next().unwrap_or_default();

    if let Some(month_day) = clean.strip_prefix("--") {
        let digits: String = month_day.chars().filter(|c| *c != '-').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(BirthdayParseError::UnknownFormat(raw.to_string()));
        }
        return checked(None, &digits[0..2], &digits[2..4], raw);
    }

    if clean.len() == 8 && clean.chars().all(|c| c.is_ascii_digit()) {
        return checked(Some(&clean[0..4]), &clean[4..6], &clean[6..8], raw);
    }

    if clean.len() == 10 && clean.matches('-').count() == 2 {
        let parts: Vec<&str> = clean.split('-').collect();
        return checked(Some(parts[0]), parts[1], parts[2], raw);
    }

    if clean.len() == 10 && clean.matches('/').count() == 2 {
        let parts: Vec<&str> = clean.split('/').collect();
        return checked(Some(parts[2]), parts[0], parts[1], raw)
            .or_else(|_| checked(Some(parts[2]), parts[1], parts[0], raw));
    }

    Err(BirthdayParseError::UnknownFormat(raw.to_string()))
}

fn checked(
    year: Option<&str>,
    month: &str,
    day: &str,
    raw: &str,
) -> Result<BirthdayDate, BirthdayParseError> {
    let invalid = || BirthdayParseError::InvalidDate(raw.to_string());

    let year = match year {
        Some(y) => Some(y.parse::<i32>().map_err(|_| invalid())?).filter(|y| *y != 0),
        None => None,
    };
    let month = month.parse::<u32>().map_err(|_| invalid())?;
    let day = day.parse::<u32>().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year.unwrap_or(REFERENCE_LEAP_YEAR), month, day).ok_or_else(invalid)?;

    Ok(BirthdayDate { month, day, year })
}
