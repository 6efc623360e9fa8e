//! ヘルスチェック用ステータスファイル
//!
//! デーモンのループがハートビートごとに JSON を書き出し、
//! `--health-check` がそれを読んで判定します。

use crate::error::Result;
use crate::state::{Phase, RunResult, RunState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// ループが最低限起きる間隔
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// ハートビート何回分の遅れを異常とみなすか
const STALE_HEARTBEATS: u32 = 3;

/// ステータスファイルの内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub pid: u32,
    pub job: String,
    pub heartbeat: DateTime<Utc>,
    pub phase: Phase,
    pub next_fire: Option<DateTime<Utc>>,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_result: Option<RunResult>,
    pub in_flight_since: Option<DateTime<Utc>>,
    pub missed_fires: u64,
}

impl HealthStatus {
    /// 実行状態のスナップショット
    pub fn from_state(job: &str, state: &RunState, now: DateTime<Utc>) -> Self {
        Self {
            pid: std::process::id(),
            job: job.to_string(),
            heartbeat: now,
            phase: state.phase(),
            next_fire: state.next_fire(),
            last_started: state.last_started(),
            last_finished: state.last_finished(),
            last_result: state.last_result().cloned(),
            in_flight_since: state.running_since(),
            missed_fires: state.missed(),
        }
    }
}

/// ステータスファイルの読み書き
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 一時ファイル経由で書き込み（読み手が途中状態を見ないように）
    pub fn write(&self, status: &HealthStatus) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(status)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// ファイルがなければ `Ok(None)`
    pub fn read(&self) -> Result<Option<HealthStatus>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// 判定結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Unhealthy(String),
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// ステータスの健全性を判定
pub fn evaluate(status: Option<&HealthStatus>, now: DateTime<Utc>, grace: Duration) -> Verdict {
    let Some(status) = status else {
        return Verdict::Unhealthy("status file not found (daemon not running?)".to_string());
    };

    let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);
    let stale_after = chrono::Duration::from_std(HEARTBEAT_INTERVAL * STALE_HEARTBEATS)
        .unwrap_or(chrono::Duration::MAX);

    if status.phase == Phase::Terminated {
        return Verdict::Unhealthy(format!("daemon (pid {}) has shut down", status.pid));
    }

    let age = now - status.heartbeat;
    if age > stale_after {
        return Verdict::Unhealthy(format!(
            "heartbeat is stale ({}s old)",
            age.num_seconds()
        ));
    }

    if let Some(since) = status.in_flight_since {
        if now - since > grace {
            return Verdict::Unhealthy(format!(
                "sync cycle in flight since {} (longer than {}s)",
                since.format("%Y-%m-%d %H:%M:%S UTC"),
                grace.num_seconds()
            ));
        }
    } else if let Some(next) = status.next_fire {
        if now - next > grace {
            return Verdict::Unhealthy(format!(
                "next run was due at {} and is overdue",
                next.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
    }

    Verdict::Healthy
}
