//! Logging setup

use bday_core::LoggingConfig;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// HTTP client crates that are only interesting when debugging
const NOISY_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls"];

/// Build the filter: `RUST_LOG` wins, otherwise the configured level
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok_and(|v| !v.is_empty()) {
        return EnvFilter::from_default_env();
    }
    EnvFilter::try_new(filter_directives(config)).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{}': {}, using info", config.level, e);
        EnvFilter::new("info")
    })
}

fn filter_directives(config: &LoggingConfig) -> String {
    let level = config.effective_level();
    if config.debug {
        return level;
    }
    let mut directives = vec![level];
    directives.extend(NOISY_TARGETS.iter().map(|t| format!("{}=warn", t)));
    directives.join(",")
}

/// Install the global subscriber (stdout plus optional log file)
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let file_layer = if config.to_file {
        match open_log_file(Path::new(&config.file_path)) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!(
                    "Warning: cannot open log file {}: {} (logging to stdout only)",
                    config.file_path, e
                );
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
