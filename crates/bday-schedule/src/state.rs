//! ジョブの実行状態
//!
//! 状態は所有値として各判断に渡され、新しい状態が返されます。
//! Idle → Waiting(next) → Running → Waiting … → Terminated

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 1 回の実行結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    /// ログ用の要約
    pub summary: String,
}

impl RunResult {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
        }
    }

    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
        }
    }
}

/// ループの現在位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Waiting { next: DateTime<Utc> },
    Running { since: DateTime<Utc> },
    Terminated,
}

/// 発火時の判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    /// 新しいサイクルを開始する
    Run,
    /// 前回のサイクルが実行中なのでスキップ
    SkipOverlap,
}

/// ジョブ 1 つ分の実行状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    phase: Phase,
    next_fire: Option<DateTime<Utc>>,
    last_started: Option<DateTime<Utc>>,
    last_finished: Option<DateTime<Utc>>,
    last_result: Option<RunResult>,
    runs: u64,
    missed: u64,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            next_fire: None,
            last_started: None,
            last_finished: None,
            last_result: None,
            runs: 0,
            missed: 0,
        }
    }

    /// 次回発火時刻を記録
    ///
    /// 実行中は Running のまま、次回時刻だけを更新します。
    pub fn scheduled(mut self, next: Option<DateTime<Utc>>) -> Self {
        self.next_fire = next;
        self.phase = match (self.phase, next) {
            (Phase::Running { .. } | Phase::Terminated, _) => self.phase,
            (_, Some(next)) => Phase::Waiting { next },
            (_, None) => Phase::Idle,
        };
        self
    }

    /// 発火時の判断
    pub fn fire(mut self, now: DateTime<Utc>) -> (Self, FireDecision) {
        match self.phase {
            Phase::Running { .. } => {
                self.missed += 1;
                (self, FireDecision::SkipOverlap)
            }
            _ => {
                self.phase = Phase::Running { since: now };
                self.last_started = Some(now);
                self.runs += 1;
                (self, FireDecision::Run)
            }
        }
    }

    /// 実行完了を記録
    pub fn finished(mut self, now: DateTime<Utc>, result: RunResult) -> Self {
        if matches!(self.phase, Phase::Running { .. }) {
            self.phase = match self.next_fire {
                Some(next) => Phase::Waiting { next },
                None => Phase::Idle,
            };
        }
        self.last_finished = Some(now);
        self.last_result = Some(result);
        self
    }

    /// シャットダウン
    pub fn terminate(mut self) -> Self {
        self.phase = Phase::Terminated;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    /// 実行中ならその開始時刻
    pub fn running_since(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            Phase::Running { since } => Some(since),
            _ => None,
        }
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.next_fire
    }

    pub fn last_started(&self) -> Option<DateTime<Utc>> {
        self.last_started
    }

    pub fn last_finished(&self) -> Option<DateTime<Utc>> {
        self.last_finished
    }

    pub fn last_result(&self) -> Option<&RunResult> {
        self.last_result.as_ref()
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// 重複のためスキップされた発火回数
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lifecycle() {
        let t0 = Utc::now();
        let next = t0 + Duration::hours(1);

        let state = RunState::new();
        assert_eq!(state.phase(), Phase::Idle);

        let state = state.scheduled(Some(next));
        assert_eq!(state.phase(), Phase::Waiting { next });

        let (state, decision) = state.fire(next);
        assert_eq!(decision, FireDecision::Run);
        assert_eq!(state.running_since(), Some(next));

        let later = next + Duration::hours(1);
        let state = state.scheduled(Some(later));
        assert!(state.is_running());

        let state = state.finished(next + Duration::minutes(1), RunResult::success("ok"));
        assert_eq!(state.phase(), Phase::Waiting { next: later });
        assert_eq!(state.runs(), 1);
        assert_eq!(state.last_result(), Some(&RunResult::success("ok")));

        assert_eq!(state.terminate().phase(), Phase::Terminated);
    }

    #[test]
    fn test_overlap_is_skipped_and_counted() {
        let now = Utc::now();
        let (state, first) = RunState::new().fire(now);
        let (state, second) = state.fire(now + Duration::minutes(5));
        let (state, third) = state.fire(now + Duration::minutes(10));

        assert_eq!(first, FireDecision::Run);
        assert_eq!(second, FireDecision::SkipOverlap);
        assert_eq!(third, FireDecision::SkipOverlap);
        assert_eq!(state.missed(), 2);
        assert_eq!(state.runs(), 1);
        assert_eq!(state.running_since(), Some(now));
    }

    #[test]
    fn test_finish_without_next_fire_is_idle() {
        let (state, _) = RunState::new().fire(Utc::now());
        let state = state.finished(Utc::now(), RunResult::failure("boom"));
        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.last_result().unwrap().success);
    }
}
