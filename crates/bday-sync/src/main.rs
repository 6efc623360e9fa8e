//! bday-sync: CardDAV to CalDAV birthday synchronization
//!
//! Usage:
//!   bday-sync                 - Start daemon mode (scheduled sync + diagnostics)
//!   bday-sync --once          - Run a single sync cycle and exit
//!   bday-sync --diagnose      - Check both servers without writing anything
//!   bday-sync --health-check  - Check the daemon status file
//!   bday-sync --help          - Show help

mod health;
mod jobs;
mod logging;

use bday_calendar::CalendarClient;
use bday_contacts::ContactsClient;
use bday_core::{Config, ContactSource, EventSink, RunMode, SyncSettings, run_cycle, run_diagnostics};
use bday_schedule::{HEARTBEAT_INTERVAL, Job, Scheduler, SchedulerOptions, StatusFile, Trigger};
use jobs::{DiagnosticJob, SyncJob, log_diagnostics, log_report};
use std::process::ExitCode;
use std::sync::Arc;

const BANNER: &str = r#"
╔══════════════════════════════════════════════════════════════╗
║                                                              ║
║              🎂 Birthday Sync Service 🎂                     ║
║         CardDAV to CalDAV Birthday Synchronization           ║
║                                                              ║
╚══════════════════════════════════════════════════════════════╝"#;

/// Command selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Follow RUN_MODE (daemon unless set to once)
    Default,
    /// Single sync cycle
    Once,
    /// Read-only connectivity report
    Diagnose,
    /// Status file check
    HealthCheck,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    command: Command,
    banner: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!();
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Command::Help => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Command::Version => {
            println!("bday-sync {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load();

    // Initialize logging (defaults when the configuration itself is broken)
    let logging_config = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if let Err(e) = logging::init(&logging_config) {
        eprintln!("{}", e);
    }

    if args.banner {
        print_banner();
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args.command, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a command; `Ok(false)` means it ran but did not succeed
async fn run(command: Command, config: Config) -> anyhow::Result<bool> {
    match command {
        Command::HealthCheck => Ok(health::check(&config).await),
        Command::Diagnose => run_diagnose(&config).await,
        Command::Once => run_once(&config).await,
        Command::Default if config.run_mode == RunMode::Once => run_once(&config).await,
        _ => run_daemon(config).await,
    }
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut parsed = CliArgs {
        command: Command::Default,
        banner: true,
    };

    for arg in args {
        let command = match arg.as_str() {
            "--once" => Command::Once,
            "--diagnose" => Command::Diagnose,
            "--health-check" => Command::HealthCheck,
            "--help" | "-h" => return Ok(CliArgs { command: Command::Help, ..parsed }),
            "--version" | "-V" => return Ok(CliArgs { command: Command::Version, ..parsed }),
            "--no-banner" => {
                parsed.banner = false;
                continue;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        };

        if parsed.command != Command::Default && parsed.command != command {
            return Err(format!("Conflicting arguments: {}", arg));
        }
        parsed.command = command;
    }

    Ok(parsed)
}

/// Print help message
fn print_help() {
    println!("bday-sync - CardDAV to CalDAV birthday synchronization");
    println!();
    println!("Usage:");
    println!("  bday-sync                 Start daemon mode (default, see RUN_MODE)");
    println!("  bday-sync --once          Run a single sync cycle and exit");
    println!("  bday-sync --diagnose      Check both servers without writing");
    println!("  bday-sync --health-check  Check the daemon status file");
    println!("  bday-sync --no-banner     Skip the startup banner");
    println!("  bday-sync --help          Show this help message");
    println!("  bday-sync --version       Show version");
    println!();
    println!("Environment Variables:");
    println!("  CARDDAV_SERVER_URL        CardDAV server or addressbook URL (required)");
    println!("  CARDDAV_USERNAME          CardDAV username (required)");
    println!("  CARDDAV_PASSWORD          CardDAV password (required)");
    println!("  CALDAV_SERVER_URL         CalDAV server or calendar URL (required)");
    println!("  CALDAV_USERNAME           CalDAV username (required)");
    println!("  CALDAV_PASSWORD           CalDAV password (required)");
    println!("  CALDAV_CALENDAR           Calendar path (default: first calendar found)");
    println!("  BIRTHDAY_REMINDER_DAYS    Comma separated reminder days (default: 1)");
    println!("  BIRTHDAY_UPDATE_EXISTING  Rewrite changed events (default: true)");
    println!("  SYNC_SCHEDULE             Cron expression (default: 0 6 * * *)");
    println!("  SYNC_INTERVAL_HOURS       Fixed interval, overrides the cron (default: 0)");
    println!("  RUN_MODE                  daemon or once (default: daemon)");
    println!("  LOG_LEVEL                 Log level (default: info)");
    println!();
    println!("Settings can also be placed in bday-sync.toml (or BDAY_SYNC_CONFIG).");
}

fn print_banner() {
    println!("{}", BANNER);
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Started: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z"));
    println!("{}", "─".repeat(62));
    println!();
}

/// Create the CardDAV source and CalDAV sink
pub(crate) fn build_clients(
    config: &Config,
) -> anyhow::Result<(Arc<dyn ContactSource>, Arc<dyn EventSink>)> {
    let timeout = config.sync.request_timeout();

    let contacts = ContactsClient::new(config.carddav.clone(), timeout)
        .map_err(|e| anyhow::anyhow!("Failed to create CardDAV client: {}", e))?;
    let calendar = CalendarClient::new(config.caldav.clone(), timeout)
        .map_err(|e| anyhow::anyhow!("Failed to create CalDAV client: {}", e))?;

    let source: Arc<dyn ContactSource> = Arc::new(contacts);
    let sink: Arc<dyn EventSink> = Arc::new(calendar);
    Ok((source, sink))
}

/// Run one sync cycle
async fn run_once(config: &Config) -> anyhow::Result<bool> {
    tracing::info!("Running single sync operation...");

    let (source, sink) = build_clients(config)?;
    let settings = SyncSettings::from(config);

    match run_cycle(source.as_ref(), sink.as_ref(), &settings).await {
        Ok(report) => {
            log_report(&report);
            Ok(true)
        }
        Err(e) => {
            tracing::error!("Sync cycle failed: {}", e);
            Ok(false)
        }
    }
}

/// Read-only check of both servers
async fn run_diagnose(config: &Config) -> anyhow::Result<bool> {
    tracing::info!("Running diagnostics...");
    tracing::info!("CardDAV: {} (user {})", config.carddav.server_url, config.carddav.username);
    tracing::info!("CalDAV: {} (user {})", config.caldav.server_url, config.caldav.username);

    let (source, sink) = build_clients(config)?;
    let report = run_diagnostics(source.as_ref(), sink.as_ref()).await;
    log_diagnostics(&report);

    Ok(report.is_healthy())
}

/// Run the scheduler until SIGTERM or Ctrl+C
async fn run_daemon(config: Config) -> anyhow::Result<bool> {
    let (source, sink) = build_clients(&config)?;

    let sync_trigger = Trigger::from_config(
        &config.scheduler.sync_schedule,
        config.scheduler.sync_interval_hours,
    )
    .map_err(|e| anyhow::anyhow!("Invalid sync schedule: {}", e))?;

    let options = SchedulerOptions {
        startup_delay: config.scheduler.startup_delay(),
        shutdown_grace: config.scheduler.shutdown_grace(),
        heartbeat: HEARTBEAT_INTERVAL,
    };

    let sync_job = SyncJob::new(
        Arc::clone(&source),
        Arc::clone(&sink),
        SyncSettings::from(&config),
    );
    let mut scheduler = Scheduler::new(options).add_job(
        Job::new(Arc::new(sync_job), sync_trigger)
            .run_on_start(true)
            .with_status_file(StatusFile::new(&config.health.status_file)),
    );

    let diagnostic_schedule = config.scheduler.diagnostic_schedule.trim();
    if diagnostic_schedule.is_empty() {
        tracing::info!("Scheduled diagnostics disabled");
    } else {
        let trigger = Trigger::cron(diagnostic_schedule)
            .map_err(|e| anyhow::anyhow!("Invalid diagnostic schedule: {}", e))?;
        scheduler = scheduler.add_job(Job::new(Arc::new(DiagnosticJob::new(source, sink)), trigger));
    }

    let handle = scheduler.start();
    tracing::info!("bday-sync daemon started");
    tracing::info!("Press Ctrl+C to exit");

    // Wait for shutdown signal
    shutdown_signal().await;
    tracing::info!("Shutting down...");

    handle.stop().await;
    tracing::info!("bday-sync stopped");
    Ok(true)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_default_is_daemon_with_banner() {
        let parsed = args(&[]).unwrap();
        assert_eq!(parsed.command, Command::Default);
        assert!(parsed.banner);
    }

    #[test]
    fn test_commands() {
        assert_eq!(args(&["--once"]).unwrap().command, Command::Once);
        assert_eq!(args(&["--diagnose"]).unwrap().command, Command::Diagnose);
        assert_eq!(args(&["--health-check"]).unwrap().command, Command::HealthCheck);
        assert_eq!(args(&["--version"]).unwrap().command, Command::Version);
        assert_eq!(args(&["--once", "--help"]).unwrap().command, Command::Help);
    }

    #[test]
    fn test_no_banner_combines() {
        let parsed = args(&["--no-banner", "--once"]).unwrap();
        assert_eq!(parsed.command, Command::Once);
        assert!(!parsed.banner);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["--once", "--diagnose"]).is_err());
        assert!(args(&["--once", "--once"]).is_ok());
    }
}
