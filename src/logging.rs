//! Tracing setup for the two process modes.

use crate::config::SupervisorConfig;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Operator commands: warnings and up on stderr unless `RUST_LOG` says otherwise.
pub fn init_cli_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

/// Master daemon: rotate the previous log to its backup name, then append
/// plain-text records to a fresh file.
pub fn init_daemon_logging(config: &SupervisorConfig) -> io::Result<()> {
    fs::create_dir_all(&config.log_dir)?;
    rotate(&config.log_file(), &config.log_backup_file())?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_file())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .try_init();
    Ok(())
}

/// Keep exactly one previous generation of `log`.
pub fn rotate(log: &Path, backup: &Path) -> io::Result<()> {
    if !log.exists() {
        return Ok(());
    }
    match fs::remove_file(backup) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(log, backup)
}
