//! エラー型定義 (bday-schedule)

use thiserror::Error;

/// bday-schedule のエラー型
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("cron パースエラー: {0}")]
    CronParse(String),

    #[error("無効なトリガー: {0}")]
    InvalidTrigger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, ScheduleError>;
