//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. bday-sync.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default config file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "bday-sync.toml";

/// Process run mode selected through `RUN_MODE`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Persistent scheduler
    #[default]
    Daemon,
    /// Single sync cycle, then exit
    Once,
}

/// Connection settings for one DAV server
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct DavConfig {
    /// Server or collection URL
    #[serde(default)]
    pub server_url: String,
    /// Username for authentication
    #[serde(default)]
    pub username: String,
    /// Password for authentication
    #[serde(default)]
    pub password: String,
    /// Collection path or URL (optional, discovered when absent)
    #[serde(default)]
    pub collection: Option<String>,
}

impl DavConfig {
    /// Create a new DAV config
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
            collection: None,
        }
    }

    /// Pin a collection instead of discovering one
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

impl fmt::Debug for DavConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("collection", &self.collection)
            .finish()
    }
}

/// Birthday event templates and behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BirthdayConfig {
    /// Event title, `{name}` is substituted
    pub title_template: String,
    /// Event description, `{name}` is substituted
    pub description_template: String,
    /// Reminder offsets in days before the birthday
    pub reminder_days: Vec<u32>,
    /// Reminder text, `{name}` and `{days}` are substituted
    pub reminder_template: String,
    /// CATEGORIES value
    pub category: String,
    /// Whether changed events are rewritten
    pub update_existing: bool,
}

impl Default for BirthdayConfig {
    fn default() -> Self {
        Self {
            title_template: "🎂 {name}'s Birthday".to_string(),
            description_template: "Birthday of {name}".to_string(),
            reminder_days: vec![1],
            reminder_template: "Reminder: {name}'s birthday is in {days} days!".to_string(),
            category: "Birthday".to_string(),
            update_existing: true,
        }
    }
}

/// スケジューラー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 同期の cron 式 (5 フィールド)
    pub sync_schedule: String,
    /// 診断の cron 式 (5 フィールド)
    pub diagnostic_schedule: String,
    /// 0 より大きい場合は cron より優先される間隔 (時間)
    pub sync_interval_hours: u64,
    /// 最初のサイクルまでの待機秒数
    pub startup_delay_secs: u64,
    /// シャットダウン時に実行中サイクルを待つ秒数
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_schedule: "0 6 * * *".to_string(),
            diagnostic_schedule: "0 7 * * 0".to_string(),
            sync_interval_hours: 0,
            startup_delay_secs: 30,
            shutdown_grace_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Network and reconciliation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timeout applied to every DAV request
    pub request_timeout_secs: u64,
    /// Records reconciled concurrently (1 = sequential)
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            concurrency: 1,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Forces debug level and keeps HTTP client logs
    pub debug: bool,
    /// Also write logs to `file_path`
    pub to_file: bool,
    /// Log file location
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
            to_file: false,
            file_path: "/var/log/birthday-sync/sync.log".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Level actually applied, `debug` wins over `level`
    pub fn effective_level(&self) -> String {
        if self.debug {
            "debug".to_string()
        } else {
            self.level.to_lowercase()
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Status file written by the daemon and read by `--health-check`
    pub status_file: String,
    /// How late a cycle may be before the process counts as unhealthy
    pub grace_secs: u64,
    /// Also run connectivity diagnostics during the health check
    pub check_connectivity: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            grace_secs: 900,
            check_connectivity: false,
        }
    }
}

impl HealthConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

fn default_status_file() -> String {
    std::env::temp_dir()
        .join("bday-sync-status.json")
        .to_string_lossy()
        .into_owned()
}

/// Main configuration for bday-sync
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// CardDAV server (contacts)
    #[serde(default)]
    pub carddav: DavConfig,

    /// CalDAV server (birthday events)
    #[serde(default)]
    pub caldav: DavConfig,

    #[serde(default)]
    pub birthday: BirthdayConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub run_mode: RunMode,
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                while let Some(c) = chars.next() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換され、
    /// その後に環境変数による上書きが適用されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> Result<Self> {
        let expanded_content = Self::expand_env_vars(content);
        toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// デフォルトパスから設定を読み込み、検証する
    ///
    /// `BDAY_SYNC_CONFIG` か `./bday-sync.toml` があればそれを使い、
    /// なければ環境変数のみから読み込みます。
    pub fn load() -> Result<Self> {
        let path = std::env::var("BDAY_SYNC_CONFIG")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let cfg = if Path::new(&path).exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::from_env()?
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// 環境変数で設定を上書きする
    ///
    /// Parse failures are collected so one error names every bad variable.
    fn apply_env_overrides(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        // CardDAV (the CARDAV_ spelling is kept for existing deployments)
        if let Some(v) = env_any(&["CARDDAV_SERVER_URL", "CARDAV_SERVER_URL"]) {
            self.carddav.server_url = v;
        }
        if let Some(v) = env_any(&["CARDDAV_USERNAME", "CARDAV_USERNAME"]) {
            self.carddav.username = v;
        }
        if let Some(v) = env_any(&["CARDDAV_PASSWORD", "CARDAV_PASSWORD"]) {
            self.carddav.password = v;
        }
        if let Some(v) = env_any(&["CARDDAV_ADDRESSBOOK", "CARDAV_ADDRESSBOOK"]) {
            self.carddav.collection = Some(v);
        }

        // CalDAV
        if let Some(v) = env_any(&["CALDAV_SERVER_URL"]) {
            self.caldav.server_url = v;
        }
        if let Some(v) = env_any(&["CALDAV_USERNAME"]) {
            self.caldav.username = v;
        }
        if let Some(v) = env_any(&["CALDAV_PASSWORD"]) {
            self.caldav.password = v;
        }
        if let Some(v) = env_any(&["CALDAV_CALENDAR"]) {
            self.caldav.collection = Some(v);
        }

        // Birthday templates
        if let Some(v) = env_any(&["BIRTHDAY_EVENT_TITLE"]) {
            self.birthday.title_template = v;
        }
        if let Some(v) = env_any(&["BIRTHDAY_EVENT_DESCRIPTION"]) {
            self.birthday.description_template = v;
        }
        if let Some(v) = env_any(&["BIRTHDAY_REMINDER_DAYS"]) {
            match parse_reminder_days(&v) {
                Ok(days) => self.birthday.reminder_days = days,
                Err(e) => errors.push(format!("BIRTHDAY_REMINDER_DAYS: {}", e)),
            }
        }
        if let Some(v) = env_any(&["BIRTHDAY_REMINDER_MESSAGE"]) {
            self.birthday.reminder_template = v;
        }
        if let Some(v) = env_any(&["BIRTHDAY_EVENT_CATEGORY"]) {
            self.birthday.category = v;
        }
        override_parsed(&mut self.birthday.update_existing, "BIRTHDAY_UPDATE_EXISTING", parse_bool, &mut errors);

        // Scheduler
        if let Some(v) = env_any(&["SYNC_SCHEDULE"]) {
            self.scheduler.sync_schedule = v;
        }
        if let Some(v) = env_any(&["DIAGNOSTIC_SCHEDULE"]) {
            self.scheduler.diagnostic_schedule = v;
        }
        override_parsed(&mut self.scheduler.sync_interval_hours, "SYNC_INTERVAL_HOURS", parse_number, &mut errors);
        override_parsed(&mut self.scheduler.startup_delay_secs, "STARTUP_DELAY", parse_number, &mut errors);
        override_parsed(&mut self.scheduler.shutdown_grace_secs, "SHUTDOWN_GRACE", parse_number, &mut errors);

        // Sync tuning
        override_parsed(&mut self.sync.request_timeout_secs, "REQUEST_TIMEOUT", parse_number, &mut errors);
        override_parsed(&mut self.sync.concurrency, "SYNC_CONCURRENCY", parse_number, &mut errors);

        // Logging
        if let Some(v) = env_any(&["LOG_LEVEL"]) {
            self.logging.level = v.to_lowercase();
        }
        override_parsed(&mut self.logging.debug, "DEBUG", parse_bool, &mut errors);
        override_parsed(&mut self.logging.to_file, "LOG_TO_FILE", parse_bool, &mut errors);
        if let Some(v) = env_any(&["LOG_FILE"]) {
            self.logging.file_path = v;
        }

        // Health
        if let Some(v) = env_any(&["HEALTH_STATUS_FILE"]) {
            self.health.status_file = v;
        }
        override_parsed(&mut self.health.grace_secs, "HEALTH_GRACE", parse_number, &mut errors);
        override_parsed(&mut self.health.check_connectivity, "HEALTH_CHECK_CONNECTIVITY", parse_bool, &mut errors);

        if let Some(v) = env_any(&["RUN_MODE"]) {
            match v.to_lowercase().as_str() {
                "daemon" => self.run_mode = RunMode::Daemon,
                "once" => self.run_mode = RunMode::Once,
                other => errors.push(format!("RUN_MODE: unknown mode '{}'", other)),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors.join("; ")))
        }
    }

    /// Check every required and derived setting, naming all problems at once
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        for (name, value) in [
            ("CARDDAV_SERVER_URL", &self.carddav.server_url),
            ("CARDDAV_USERNAME", &self.carddav.username),
            ("CARDDAV_PASSWORD", &self.carddav.password),
            ("CALDAV_SERVER_URL", &self.caldav.server_url),
            ("CALDAV_USERNAME", &self.caldav.username),
            ("CALDAV_PASSWORD", &self.caldav.password),
        ] {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }

        for (name, value) in [
            ("CARDDAV_SERVER_URL", &self.carddav.server_url),
            ("CALDAV_SERVER_URL", &self.caldav.server_url),
        ] {
            if !value.trim().is_empty() {
                match reqwest::Url::parse(value) {
                    Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                    Ok(url) => invalid.push(format!("{}: unsupported scheme '{}'", name, url.scheme())),
                    Err(e) => invalid.push(format!("{}: {}", name, e)),
                }
            }
        }

        if self.birthday.title_template.trim().is_empty() {
            invalid.push("BIRTHDAY_EVENT_TITLE: must not be empty".to_string());
        }
        if self.birthday.category.trim().is_empty() {
            invalid.push("BIRTHDAY_EVENT_CATEGORY: must not be empty".to_string());
        }
        if let Some(days) = self.birthday.reminder_days.iter().find(|d| **d > MAX_REMINDER_DAYS) {
            invalid.push(format!(
                "BIRTHDAY_REMINDER_DAYS: {} exceeds {} days",
                days, MAX_REMINDER_DAYS
            ));
        }
        if self.scheduler.sync_interval_hours == 0 && self.scheduler.sync_schedule.trim().is_empty() {
            invalid.push("SYNC_SCHEDULE: required when SYNC_INTERVAL_HOURS is 0".to_string());
        }
        if self.sync.concurrency == 0 {
            invalid.push("SYNC_CONCURRENCY: must be at least 1".to_string());
        }
        if self.sync.request_timeout_secs == 0 {
            invalid.push("REQUEST_TIMEOUT: must be at least 1 second".to_string());
        }

        if missing.is_empty() && invalid.is_empty() {
            return Ok(());
        }

        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            ));
        }
        parts.extend(invalid);
        Err(Error::Config(parts.join("; ")))
    }
}

/// Reminders further out than this are almost certainly a typo
const MAX_REMINDER_DAYS: u32 = 365;

/// First non-empty value among the given variable names
fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn override_parsed<T>(
    target: &mut T,
    name: &str,
    parse: fn(&str) -> std::result::Result<T, String>,
    errors: &mut Vec<String>,
) {
    if let Some(raw) = env_any(&[name]) {
        match parse(&raw) {
            Ok(v) => *target = v,
            Err(e) => errors.push(format!("{}: {}", name, e)),
        }
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("expected true or false, got '{}'", other)),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("expected a non-negative integer, got '{}'", value))
}

/// Parse a comma-separated list of reminder offsets ("1, 7")
pub fn parse_reminder_days(value: &str) -> std::result::Result<Vec<u32>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| format!("invalid day offset '{}'", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            carddav: DavConfig::new("https://dav.example.com/addressbooks/me/", "me", "secret"),
            caldav: DavConfig::new("https://dav.example.com/calendars/me/", "me", "secret"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.birthday.title_template, "🎂 {name}'s Birthday");
        assert_eq!(config.birthday.reminder_days, vec![1]);
        assert!(config.birthday.update_existing);
        assert_eq!(config.scheduler.sync_schedule, "0 6 * * *");
        assert_eq!(config.scheduler.diagnostic_schedule, "0 7 * * 0");
        assert_eq!(config.scheduler.startup_delay_secs, 30);
        assert_eq!(config.sync.concurrency, 1);
        assert_eq!(config.run_mode, RunMode::Daemon);
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_names_all_missing() {
        let err = Config::default().validate().unwrap_err().to_string();
        assert!(err.contains("CARDDAV_SERVER_URL"));
        assert!(err.contains("CARDDAV_PASSWORD"));
        assert!(err.contains("CALDAV_USERNAME"));
    }

    #[test]
    fn test_validate_bad_url() {
        let mut config = valid_config();
        config.caldav.server_url = "ftp://dav.example.com".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("CALDAV_SERVER_URL"));
        assert!(err.contains("ftp"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = valid_config();
        config.sync.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_reminder_days() {
        assert_eq!(parse_reminder_days("1, 7,14").unwrap(), vec![1, 7, 14]);
        assert_eq!(parse_reminder_days("0").unwrap(), vec![0]);
        assert_eq!(parse_reminder_days("").unwrap(), Vec::<u32>::new());
        assert!(parse_reminder_days("1,week").is_err());
        assert!(parse_reminder_days("-1").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Ok(true));
        assert_eq!(parse_bool("no"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_effective_level() {
        let mut logging = LoggingConfig::default();
        logging.level = "WARN".to_string();
        assert_eq!(logging.effective_level(), "warn");
        logging.debug = true;
        assert_eq!(logging.effective_level(), "debug");
    }

    #[test]
    fn test_password_redacted() {
        let debug = format!("{:?}", DavConfig::new("https://x", "me", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_expand_env_vars() {
        // テスト用環境変数を設定
        unsafe {
            std::env::set_var("BDAY_SYNC_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${BDAY_SYNC_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        // 存在しない環境変数
        let result = Config::expand_env_vars("prefix_${BDAY_SYNC_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("BDAY_SYNC_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_empty_name() {
        let result = Config::expand_env_vars("${}_content");
        assert_eq!(result, "_content");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
run_mode = "once"

[carddav]
server_url = "https://contacts.example.com/remote.php/dav/addressbooks/users/me/"
username = "me"
password = "secret"

[caldav]
server_url = "https://cal.example.com/"
username = "me"
password = "secret"
collection = "/calendars/me/birthdays/"

[birthday]
title_template = "{name} turns older"
reminder_days = [0, 7]
update_existing = false

[scheduler]
sync_interval_hours = 12
startup_delay_secs = 0

[sync]
concurrency = 4
"#;

        let config = Config::from_toml_str(toml_content).unwrap();
        assert_eq!(config.run_mode, RunMode::Once);
        assert_eq!(config.carddav.username, "me");
        assert_eq!(config.caldav.collection.as_deref(), Some("/calendars/me/birthdays/"));
        assert_eq!(config.birthday.title_template, "{name} turns older");
        assert_eq!(config.birthday.reminder_days, vec![0, 7]);
        assert!(!config.birthday.update_existing);
        // 省略された項目はデフォルト値
        assert_eq!(config.birthday.category, "Birthday");
        assert_eq!(config.scheduler.sync_interval_hours, 12);
        assert_eq!(config.scheduler.sync_schedule, "0 6 * * *");
        assert_eq!(config.sync.concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_invalid() {
        let err = Config::from_toml_str("[birthday]\nreminder_days = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
