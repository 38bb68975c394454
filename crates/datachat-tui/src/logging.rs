//! File-backed tracing setup. The terminal belongs to the UI, so nothing is
//! written to stdout/stderr.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE: &str = "datachat.log";

pub fn default_log_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::config_dir)
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("datachat"))
}

/// Filter used when `RUST_LOG` is not set
pub fn filter_directive(level: &str) -> String {
    format!("datachat_core={level},datachat_tui={level}")
}

/// Install the global subscriber; returns the log file path
pub fn init(log_dir: &Path, level: &str) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let path = log_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .ok();

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("debug"), "datachat_core=debug,datachat_tui=debug");
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let path = init(&log_dir, "info").unwrap();

        assert_eq!(path, log_dir.join(LOG_FILE));
        assert!(path.exists());
    }
}
