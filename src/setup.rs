//! Filesystem preparation done once at process entry, before any action.

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::paths;
use crate::update::set_world_writable;
use std::fs;
use tracing::info;

/// What happened to the installation directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallDir {
    Created,
    Existing,
}

/// Validate and prepare the installation and temporary directories.
///
/// The installation directory must live under the launch directory or the
/// temp root. A missing one is created world-writable; an existing one is
/// made world-writable only when updates are allowed.
pub fn prepare_environment(config: &SupervisorConfig) -> Result<InstallDir> {
    let trex_dir = &config.trex_dir;
    paths::ensure_under_roots(trex_dir, &config.allowed_roots())?;

    let outcome = if trex_dir.exists() {
        if !trex_dir.is_dir() {
            return Err(SupervisorError::Configuration(format!(
                "Given path {} is a file",
                trex_dir.display()
            )));
        }
        if config.allow_update {
            set_world_writable(trex_dir)?;
        }
        InstallDir::Existing
    } else {
        fs::create_dir_all(trex_dir)?;
        set_world_writable(trex_dir)?;
        info!("Created installation directory {}", trex_dir.display());
        InstallDir::Created
    };

    fs::create_dir_all(&config.tmp_dir)?;
    Ok(outcome)
}
