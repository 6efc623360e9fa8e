//! `--health-check` command

use bday_core::{Config, run_diagnostics};
use bday_schedule::{StatusFile, Verdict, evaluate};
use chrono::Utc;
use tracing::{error, info};

use crate::build_clients;
use crate::jobs::log_diagnostics;

/// Check the daemon's status file and, when enabled, server connectivity
pub async fn check(config: &Config) -> bool {
    info!("Performing health check...");

    let file = StatusFile::new(&config.health.status_file);
    let status = match file.read() {
        Ok(status) => status,
        Err(e) => {
            error!("Cannot read status file {}: {}", file.path().display(), e);
            return false;
        }
    };

    let mut healthy = match evaluate(status.as_ref(), Utc::now(), config.health.grace()) {
        Verdict::Healthy => {
            if let Some(status) = &status {
                info!(
                    pid = status.pid,
                    missed_fires = status.missed_fires,
                    "Daemon is alive"
                );
            }
            true
        }
        Verdict::Unhealthy(reason) => {
            error!("Health check failed: {}", reason);
            false
        }
    };

    if config.health.check_connectivity {
        info!("Testing connectivity as part of health check...");
        match build_clients(config) {
            Ok((source, sink)) => {
                let report = run_diagnostics(source.as_ref(), sink.as_ref()).await;
                log_diagnostics(&report);
                healthy &= report.is_healthy();
            }
            Err(e) => {
                error!("Failed to create clients: {}", e);
                healthy = false;
            }
        }
    }

    if healthy {
        info!("Health check passed");
    }
    healthy
}

#[cfg(test)]
mod tests {
    use super::*;
    use bday_schedule::{HealthStatus, RunState};

    fn config_with_status(path: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.health.status_file = path.to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_missing_status_file_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_status(&dir.path().join("missing.json"));
        assert!(!check(&config).await);
    }

    #[tokio::test]
    async fn test_fresh_status_file_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let now = Utc::now();
        let state = RunState::new().scheduled(Some(now + chrono::Duration::hours(2)));
        StatusFile::new(&path)
            .write(&HealthStatus::from_state("sync", &state, now))
            .unwrap();

        assert!(check(&config_with_status(&path)).await);
    }
}
