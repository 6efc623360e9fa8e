//! Reconciliation of desired birthday events against the calendar
//!
//! The sync is additive: events are created or rewritten, never deleted, and
//! events without a desired counterpart are left alone. A failing record only
//! produces a `Failed` outcome; the remaining records are still processed.

use crate::error::DavError;
use crate::models::{DesiredEvent, EventHandle, ExistingEvent};
use crate::report::{CycleReport, RecordOutcome, SyncOutcome};
use crate::traits::EventSink;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const REASON_UPDATES_DISABLED: &str = "updates disabled";
pub const REASON_DUPLICATE_KEY: &str = "duplicate identity key";
pub const REASON_DUPLICATE_CONTACT: &str = "duplicate contact";

/// Knobs for a reconciliation pass
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Rewrite existing events whose content differs
    pub update_existing: bool,
    /// Upper bound for each create/update call
    pub call_timeout: Option<Duration>,
    /// Records processed at once (1 = sequential)
    pub concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            update_existing: true,
            call_timeout: None,
            concurrency: 1,
        }
    }
}

/// What to do with one desired event
enum Action {
    Create(DesiredEvent),
    Update(EventHandle, DesiredEvent),
    Settled(RecordOutcome),
}

/// Diffs desired events against existing ones and applies the difference
pub struct Reconciler<'a> {
    sink: &'a dyn EventSink,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(sink: &'a dyn EventSink, options: ReconcileOptions) -> Self {
        Self { sink, options }
    }

    /// Run one pass and report an outcome per record
    ///
    /// Never fails as a whole: sink errors become `Failed` outcomes.
    pub async fn reconcile(
        &self,
        desired: Vec<DesiredEvent>,
        existing: Vec<ExistingEvent>,
    ) -> CycleReport {
        let mut report = CycleReport::new(Utc::now());

        let mut index: HashMap<String, ExistingEvent> = HashMap::with_capacity(existing.len());
        for event in existing {
            match index.entry(event.identity_key.clone()) {
                Entry::Occupied(_) => {
                    warn!(
                        key = %event.identity_key,
                        href = %event.handle.href,
                        "Duplicate identity key on calendar, keeping the first event"
                    );
                    report.push(
                        event.identity_key,
                        event.content.summary,
                        SyncOutcome::Skipped(REASON_DUPLICATE_KEY.to_string()),
                    );
                }
                Entry::Vacant(slot) => {
                    slot.insert(event);
                }
            }
        }

        let mut seen = HashSet::with_capacity(desired.len());
        let actions: Vec<Action> = desired
            .into_iter()
            .map(|event| {
                if !seen.insert(event.identity_key.clone()) {
                    debug!(key = %event.identity_key, "Contact seen twice in this cycle");
                    return settled(&event, SyncOutcome::Skipped(REASON_DUPLICATE_CONTACT.to_string()));
                }
                self.plan(event, &index)
            })
            .collect();

        let outcomes: Vec<RecordOutcome> = stream::iter(actions)
            .map(|action| self.apply(action))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        report.outcomes.extend(outcomes);
        report.finished_at = Utc::now();
        report
    }

    fn plan(&self, event: DesiredEvent, index: &HashMap<String, ExistingEvent>) -> Action {
        let Some(current) = index.get(&event.identity_key) else {
            return Action::Create(event);
        };

        // Checked before the update switch: Skipped is only for real differences
        if current.content == event.content {
            return settled(&event, SyncOutcome::Unchanged);
        }

        if !self.options.update_existing {
            debug!(
                contact = %event.display_name,
                "Birthday event differs but updates are disabled"
            );
            return settled(&event, SyncOutcome::Skipped(REASON_UPDATES_DISABLED.to_string()));
        }

        Action::Update(current.handle.clone(), event)
    }

    async fn apply(&self, action: Action) -> RecordOutcome {
        match action {
            Action::Settled(outcome) => outcome,
            Action::Create(event) => {
                let result = self.bounded("create", self.sink.create_event(&event)).await;
                let outcome = match result {
                    Ok(handle) => {
                        info!(contact = %event.display_name, href = %handle.href, "Created birthday event");
                        SyncOutcome::Created
                    }
                    Err(e) => {
                        warn!(contact = %event.display_name, "Failed to create birthday event: {}", e);
                        SyncOutcome::Failed(e)
                    }
                };
                settled_outcome(&event, outcome)
            }
            Action::Update(handle, event) => {
                let result = self.bounded("update", self.sink.update_event(&handle, &event)).await;
                let outcome = match result {
                    Ok(()) => {
                        info!(contact = %event.display_name, href = %handle.href, "Updated birthday event");
                        SyncOutcome::Updated
                    }
                    Err(e) => {
                        warn!(contact = %event.display_name, "Failed to update birthday event: {}", e);
                        SyncOutcome::Failed(e)
                    }
                };
                settled_outcome(&event, outcome)
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, DavError>>,
    ) -> Result<T, DavError> {
        match self.options.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(DavError::Timeout(format!(
                    "{} did not finish within {}s",
                    operation,
                    limit.as_secs_f32()
                )))
            }),
            None => call.await,
        }
    }
}

fn settled_outcome(event: &DesiredEvent, outcome: SyncOutcome) -> RecordOutcome {
    RecordOutcome {
        identity_key: event.identity_key.clone(),
        display_name: event.display_name.clone(),
        outcome,
    }
}

fn settled(event: &DesiredEvent, outcome: SyncOutcome) -> Action {
    Action::Settled(settled_outcome(event, outcome))
}
