//! bday-core: Birthday Sync Core Library
//!
//! 連絡先の誕生日抽出、イベント生成、カレンダーとの差分同期など、
//! サーバー実装に依存しないコア機能を提供します。

pub mod config;
pub mod cycle;
pub mod dav;
pub mod error;
pub mod extract;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod synth;
pub mod template;
pub mod traits;
pub mod vcard;

#[cfg(test)]
mod testing;

pub use config::{
    BirthdayConfig, Config, DavConfig, HealthConfig, LoggingConfig, RunMode, SchedulerConfig,
    SyncConfig,
};
pub use cycle::{DiagnosticReport, ProbeResult, SyncSettings, run_cycle, run_diagnostics};
pub use error::{DavError, Error, Result};
pub use models::{BirthdayRecord, Contact, DesiredEvent, EventContent, EventHandle, ExistingEvent, Reminder};
pub use reconcile::{ReconcileOptions, Reconciler};
pub use report::{CycleReport, RecordOutcome, SyncOutcome};
pub use synth::{TemplateConfig, synthesize};
pub use traits::{ContactSource, EventSink};
