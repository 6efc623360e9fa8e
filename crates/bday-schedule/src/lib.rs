//! スケジュール実行モジュール
//!
//! cron 形式または固定間隔で同期ジョブを実行し、
//! ヘルスチェック用のステータスファイルを書き出します。

mod error;
mod health;
mod scheduler;
mod state;
mod trigger;

pub use error::{Result, ScheduleError};
pub use health::{HEARTBEAT_INTERVAL, HealthStatus, StatusFile, Verdict, evaluate};
pub use scheduler::{Job, ScheduledJob, Scheduler, SchedulerHandle, SchedulerOptions};
pub use state::{FireDecision, Phase, RunResult, RunState};
pub use trigger::Trigger;
