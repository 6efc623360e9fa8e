//! Scheduled jobs wired to the sync and diagnostics runners

use async_trait::async_trait;
use bday_core::{
    ContactSource, CycleReport, DiagnosticReport, EventSink, SyncOutcome, SyncSettings, run_cycle,
    run_diagnostics,
};
use bday_schedule::{RunResult, ScheduledJob};
use std::sync::Arc;
use tracing::{error, info, warn};

/// One full sync cycle per fire
pub struct SyncJob {
    source: Arc<dyn ContactSource>,
    sink: Arc<dyn EventSink>,
    settings: SyncSettings,
}

impl SyncJob {
    pub fn new(source: Arc<dyn ContactSource>, sink: Arc<dyn EventSink>, settings: SyncSettings) -> Self {
        Self {
            source,
            sink,
            settings,
        }
    }
}

#[async_trait]
impl ScheduledJob for SyncJob {
    fn name(&self) -> &str {
        "sync"
    }

    async fn run(&self) -> RunResult {
        match run_cycle(self.source.as_ref(), self.sink.as_ref(), &self.settings).await {
            Ok(report) => {
                log_report(&report);
                if report.is_success() {
                    RunResult::success(report.to_string())
                } else {
                    RunResult::failure(report.to_string())
                }
            }
            Err(e) => {
                error!("Sync cycle failed: {}", e);
                RunResult::failure(e.to_string())
            }
        }
    }
}

/// Read-only connectivity check per fire
pub struct DiagnosticJob {
    source: Arc<dyn ContactSource>,
    sink: Arc<dyn EventSink>,
}

impl DiagnosticJob {
    pub fn new(source: Arc<dyn ContactSource>, sink: Arc<dyn EventSink>) -> Self {
        Self { source, sink }
    }
}

#[async_trait]
impl ScheduledJob for DiagnosticJob {
    fn name(&self) -> &str {
        "diagnostics"
    }

    async fn run(&self) -> RunResult {
        let report = run_diagnostics(self.source.as_ref(), self.sink.as_ref()).await;
        log_diagnostics(&report);
        if report.is_healthy() {
            RunResult::success("diagnostics passed")
        } else {
            RunResult::failure("diagnostics failed")
        }
    }
}

/// Log a cycle report: totals at info, every failure at warn
pub fn log_report(report: &CycleReport) {
    info!(
        created = report.created(),
        updated = report.updated(),
        unchanged = report.unchanged(),
        skipped = report.skipped(),
        failed = report.failed(),
        "Sync cycle finished: {}",
        report
    );

    for record in &report.outcomes {
        match &record.outcome {
            SyncOutcome::Failed(e) => {
                warn!(contact = %record.display_name, key = %record.identity_key, "Failed: {}", e)
            }
            SyncOutcome::Skipped(reason) => {
                info!(contact = %record.display_name, "Skipped: {}", reason)
            }
            SyncOutcome::Created | SyncOutcome::Updated => {
                info!(contact = %record.display_name, "{}", record.outcome)
            }
            SyncOutcome::Unchanged => {}
        }
    }
}

/// Log a diagnostics report
pub fn log_diagnostics(report: &DiagnosticReport) {
    match &report.contacts.error {
        None => info!(
            "CardDAV: OK ({} contacts, {} with birthdays)",
            report.contacts.count,
            report.birthdays.len()
        ),
        Some(e) => error!("CardDAV: FAILED - {}", e),
    }
    for record in &report.birthdays {
        let year = record.year.map(|y| y.to_string()).unwrap_or_else(|| "----".to_string());
        info!("  - {} ({}-{:02}-{:02})", record.display_name, year, record.month, record.day);
    }
    match &report.calendar.error {
        None => info!("CalDAV: OK ({} birthday events)", report.calendar.count),
        Some(e) => error!("CalDAV: FAILED - {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bday_core::{Contact, DavError, DesiredEvent, EventHandle, ExistingEvent};
    use std::sync::Mutex;

    struct StaticSource(Result<Vec<Contact>, DavError>);

    #[async_trait]
    impl ContactSource for StaticSource {
        async fn list_contacts(&self) -> Result<Vec<Contact>, DavError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn list_events(&self) -> Result<Vec<ExistingEvent>, DavError> {
            Ok(Vec::new())
        }

        async fn create_event(&self, event: &DesiredEvent) -> Result<EventHandle, DavError> {
            self.created.lock().unwrap().push(event.identity_key.clone());
            Ok(EventHandle {
                href: format!("/cal/{}.ics", event.uid),
                etag: None,
                uid: event.uid.clone(),
            })
        }

        async fn update_event(&self, _: &EventHandle, _: &DesiredEvent) -> Result<(), DavError> {
            Ok(())
        }
    }

    fn contacts() -> Vec<Contact> {
        vec![Contact::new(
            "/ab/alice.vcf",
            "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:alice\r\nFN:Alice\r\nBDAY:1990-03-14\r\nEND:VCARD\r\n",
        )]
    }

    #[tokio::test]
    async fn test_sync_job_success() {
        let sink = Arc::new(RecordingSink::default());
        let job = SyncJob::new(
            Arc::new(StaticSource(Ok(contacts()))),
            sink.clone(),
            SyncSettings::default(),
        );

        let result = job.run().await;
        assert!(result.success);
        assert!(result.summary.contains("1 created"));
        assert_eq!(*sink.created.lock().unwrap(), vec!["bday-sync:alice".to_string()]);
    }

    #[tokio::test]
    async fn test_sync_job_source_failure() {
        let job = SyncJob::new(
            Arc::new(StaticSource(Err(DavError::Auth("HTTP 401".into())))),
            Arc::new(RecordingSink::default()),
            SyncSettings::default(),
        );

        let result = job.run().await;
        assert!(!result.success);
        assert!(result.summary.contains("401"));
    }

    #[tokio::test]
    async fn test_diagnostic_job_writes_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let job = DiagnosticJob::new(Arc::new(StaticSource(Ok(contacts()))), sink.clone());

        let result = job.run().await;
        assert!(result.success);
        assert!(sink.created.lock().unwrap().is_empty());
    }
}
