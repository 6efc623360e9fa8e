//! 実行トリガー
//!
//! 5 フィールドの cron 式（ローカル時刻で評価）または固定間隔。

use crate::error::{Result, ScheduleError};
use chrono::{DateTime, Local, Utc};
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// ジョブの発火タイミング
#[derive(Debug, Clone)]
pub enum Trigger {
    /// cron 式（元の文字列を保持）
    Cron { expr: String, schedule: CronSchedule },
    /// 固定間隔
    Interval(Duration),
}

impl Trigger {
    /// cron 式からトリガーを作成
    ///
    /// "分 時 日 月 曜日" の 5 フィールド形式を受け付けます。
    /// cron クレートは秒フィールドが必須なので先頭に "0" を補います。
    pub fn cron(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let fields = expr.split_whitespace().count();
        let full = match fields {
            5 => {
                let mut parts: Vec<String> = expr.split_whitespace().map(str::to_string).collect();
                parts[4] = weekday_names(&parts[4]);
                format!("0 {}", parts.join(" "))
            }
            6 | 7 => expr.to_string(),
            _ => {
                return Err(ScheduleError::CronParse(format!(
                    "'{}': 5 フィールドが必要です ({} フィールド)",
                    expr, fields
                )));
            }
        };

        let schedule = CronSchedule::from_str(&full)
            .map_err(|e| ScheduleError::CronParse(format!("'{}': {}", expr, e)))?;

        Ok(Self::Cron {
            expr: expr.to_string(),
            schedule,
        })
    }

    /// 時間単位の固定間隔
    pub fn interval_hours(hours: u64) -> Result<Self> {
        if hours == 0 {
            return Err(ScheduleError::InvalidTrigger(
                "間隔は 1 時間以上を指定してください".to_string(),
            ));
        }
        Ok(Self::every(Duration::from_secs(hours * 3600)))
    }

    /// 任意の固定間隔
    pub fn every(interval: Duration) -> Self {
        Self::Interval(interval)
    }

    /// 設定値から作成（間隔が 0 以外なら cron より優先）
    pub fn from_config(schedule: &str, interval_hours: u64) -> Result<Self> {
        if interval_hours > 0 {
            Self::interval_hours(interval_hours)
        } else {
            Self::cron(schedule)
        }
    }

    /// `after` より後の次回発火時刻
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule
                .after(&after.with_timezone(&Local))
                .next()
                .map(|t| t.with_timezone(&Utc)),
            Self::Interval(interval) => {
                let interval = chrono::Duration::from_std(*interval).ok()?;
                after.checked_add_signed(interval)
            }
        }
    }
}

/// 曜日フィールドの数値を名前に置き換える
///
/// 標準の cron は 0/7 = 日曜、1 = 月曜だが cron クレートは 1 = 日曜なので、
/// 数値をそのまま渡すと 1 日ずれる。ステップ値 ("*/2") はそのまま。
fn weekday_names(field: &str) -> String {
    const NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = range
                .split('-')
                .map(|token| match token.parse::<usize>() {
                    Ok(n) if n < NAMES.len() => NAMES[n].to_string(),
                    _ => token.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron { expr, .. } => write!(f, "cron '{}'", expr),
            Self::Interval(interval) if interval.as_secs() % 3600 == 0 && !interval.is_zero() => {
                write!(f, "every {} hours", interval.as_secs() / 3600)
            }
            Self::Interval(interval) => write!(f, "every {:?}", interval),
        }
    }
}
