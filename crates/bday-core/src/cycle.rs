//! One sync cycle and the read-only diagnostics pass

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::extract;
use crate::models::BirthdayRecord;
use crate::reconcile::{ReconcileOptions, Reconciler};
use crate::report::CycleReport;
use crate::synth::{TemplateConfig, synthesize};
use crate::traits::{ContactSource, EventSink};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Everything a cycle needs besides the two collaborators
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    pub templates: TemplateConfig,
    pub reconcile: ReconcileOptions,
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            templates: TemplateConfig::from(&config.birthday),
            reconcile: ReconcileOptions {
                update_existing: config.birthday.update_existing,
                call_timeout: Some(config.sync.request_timeout()),
                concurrency: config.sync.concurrency,
            },
        }
    }
}

/// Read contacts and keep those with a usable birthday
pub async fn collect_birthdays(source: &dyn ContactSource) -> Result<Vec<BirthdayRecord>> {
    let contacts = source.list_contacts().await.map_err(Error::Source)?;
    let total = contacts.len();

    let records: Vec<BirthdayRecord> = contacts.iter().filter_map(extract).collect();
    info!("Found {} contacts with birthdays out of {}", records.len(), total);
    Ok(records)
}

/// Fetch, extract, synthesize and reconcile once
///
/// Only collection-level failures (listing contacts or events) are returned as
/// errors; per-record problems end up in the report.
pub async fn run_cycle(
    source: &dyn ContactSource,
    sink: &dyn EventSink,
    settings: &SyncSettings,
) -> Result<CycleReport> {
    let started_at = Utc::now();

    info!("Fetching contacts from CardDAV server...");
    let records = collect_birthdays(source).await?;
    if records.is_empty() {
        warn!("No contacts with birthdays found");
    }

    let desired = records
        .iter()
        .map(|record| {
            debug!(
                contact = %record.display_name,
                month = record.month,
                day = record.day,
                "Processing birthday"
            );
            synthesize(record, &settings.templates)
        })
        .collect();

    info!("Fetching existing birthday events from CalDAV server...");
    let existing = sink.list_events().await.map_err(Error::Sink)?;
    debug!("{} existing birthday events on calendar", existing.len());

    let mut report = Reconciler::new(sink, settings.reconcile.clone())
        .reconcile(desired, existing)
        .await;
    report.started_at = started_at;
    report.finished_at = Utc::now();

    Ok(report)
}

/// Outcome of probing one server
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Whether the collection could be read
    pub ok: bool,
    /// Objects seen (contacts or birthday events)
    pub count: usize,
    /// Error text when not ok
    pub error: Option<String>,
}

impl ProbeResult {
    fn success(count: usize) -> Self {
        Self {
            ok: true,
            count,
            error: None,
        }
    }

    fn failure(error: impl ToString) -> Self {
        Self {
            ok: false,
            count: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Read-only connectivity and permission report for both servers
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub contacts: ProbeResult,
    pub calendar: ProbeResult,
    /// Birthdays found in the address book
    pub birthdays: Vec<BirthdayRecord>,
}

impl DiagnosticReport {
    pub fn is_healthy(&self) -> bool {
        self.contacts.ok && self.calendar.ok
    }
}

/// Probe both collections without writing anything
pub async fn run_diagnostics(source: &dyn ContactSource, sink: &dyn EventSink) -> DiagnosticReport {
    let (contacts, birthdays) = match source.list_contacts().await {
        Ok(contacts) => {
            let birthdays: Vec<BirthdayRecord> = contacts.iter().filter_map(extract).collect();
            info!(
                contacts = contacts.len(),
                birthdays = birthdays.len(),
                "CardDAV check passed"
            );
            (ProbeResult::success(contacts.len()), birthdays)
        }
        Err(e) => {
            warn!("CardDAV check failed: {}", e);
            (ProbeResult::failure(e), Vec::new())
        }
    };

    let calendar = match sink.list_events().await {
        Ok(events) => {
            info!(events = events.len(), "CalDAV check passed");
            ProbeResult::success(events.len())
        }
        Err(e) => {
            warn!("CalDAV check failed: {}", e);
            ProbeResult::failure(e)
        }
    };

    DiagnosticReport {
        contacts,
        calendar,
        birthdays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DavError;
    use crate::report::SyncOutcome;
    use crate::testing::{MemorySink, MemorySource};
    use crate::models::Contact;

    fn address_book() -> MemorySource {
        MemorySource::new(vec![
            MemorySource::vcard("alice", "Alice", "1990-03-14"),
            MemorySource::vcard("bob", "Bob", "--0701"),
            Contact::new("/addressbooks/me/contacts/carl.vcf", "BEGIN:VCARD\r\nUID:carl\r\nFN:Carl\r\nEND:VCARD\r\n"),
            MemorySource::vcard("dora", "Dora", "not a date"),
        ])
    }

    #[tokio::test]
    async fn test_cycle_first_then_idempotent() {
        let source = address_book();
        let sink = MemorySink::new();
        let settings = SyncSettings::default();

        let first = run_cycle(&source, &sink, &settings).await.unwrap();
        assert_eq!(first.created(), 2);
        assert!(first.finished_at >= first.started_at);

        let second = run_cycle(&source, &sink, &settings).await.unwrap();
        assert_eq!(second.unchanged(), 2);
        assert_eq!(second.created() + second.updated(), 0);
    }

    #[tokio::test]
    async fn test_template_change_triggers_update() {
        let source = address_book();
        let sink = MemorySink::new();
        run_cycle(&source, &sink, &SyncSettings::default()).await.unwrap();

        let mut settings = SyncSettings::default();
        settings.templates.title_template = "Birthday: {name}".to_string();
        let report = run_cycle(&source, &sink, &settings).await.unwrap();

        assert_eq!(report.updated(), 2);
        assert_eq!(sink.summary_of("bday-sync:alice").as_deref(), Some("Birthday: Alice"));
    }

    #[tokio::test]
    async fn test_source_failure_is_cycle_error() {
        let source = MemorySource::failing(DavError::Auth("bad password (HTTP 401)".into()));
        let sink = MemorySink::new();
        let err = run_cycle(&source, &sink, &SyncSettings::default()).await.unwrap_err();
        assert!(matches!(err, Error::Source(DavError::Auth(_))));
        assert_eq!(sink.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_sink_listing_failure_is_cycle_error() {
        let sink = MemorySink::new();
        sink.fail_listing(DavError::Connection("refused".into()));
        let err = run_cycle(&address_book(), &sink, &SyncSettings::default()).await.unwrap_err();
        assert!(matches!(err, Error::Sink(DavError::Connection(_))));
    }

    #[tokio::test]
    async fn test_record_failure_is_not_cycle_error() {
        let sink = MemorySink::new();
        sink.fail_create_for("bday-sync:alice");
        let report = run_cycle(&address_book(), &sink, &SyncSettings::default()).await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.created(), 1);
        assert!(matches!(report.outcomes[0].outcome, SyncOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_diagnostics_is_read_only() {
        let sink = MemorySink::new();
        let report = run_diagnostics(&address_book(), &sink).await;
        assert!(report.is_healthy());
        assert_eq!(report.contacts.count, 4);
        assert_eq!(report.birthdays.len(), 2);
        assert_eq!(report.calendar.count, 0);
        assert_eq!(sink.create_calls() + sink.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_diagnostics_reports_failure() {
        let source = MemorySource::failing(DavError::Connection("refused".into()));
        let report = run_diagnostics(&source, &MemorySink::new()).await;
        assert!(!report.is_healthy());
        assert!(report.contacts.error.as_deref().unwrap().contains("refused"));
        assert!(report.calendar.ok);
    }

    #[test]
    fn test_collect_birthdays_skips_unusable_contacts() {
        let records = tokio_test::block_on(collect_birthdays(&address_book())).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(records[1].year, None);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.birthday.update_existing = false;
        config.sync.concurrency = 3;
        let settings = SyncSettings::from(&config);
        assert!(!settings.reconcile.update_existing);
        assert_eq!(settings.reconcile.concurrency, 3);
        assert_eq!(settings.reconcile.call_timeout, Some(std::time::Duration::from_secs(30)));
    }
}
