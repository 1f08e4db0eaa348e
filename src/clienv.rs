use std::path::PathBuf;

const TREX_MASTER_LOG_DIR: &str = "TREX_MASTER_LOG_DIR";
const TREX_MASTER_TMP_DIR: &str = "TREX_MASTER_TMP_DIR";
const TREX_MASTER_TEMP_ROOT: &str = "TREX_MASTER_TEMP_ROOT";

const DEFAULT_LOG_DIR: &str = "/var/log/trex";
const DEFAULT_TMP_DIR: &str = "/tmp/trex-tmp";
const DEFAULT_TEMP_ROOT: &str = "/tmp";

pub const MASTER_LOG_FILE: &str = "master_daemon.log";
pub const MASTER_LOG_BACKUP: &str = "master_daemon.log_bu";

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Log directory ($TREX_MASTER_LOG_DIR or /var/log/trex)
pub fn log_dir() -> PathBuf {
    let dir = env_opt(TREX_MASTER_LOG_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    tracing::trace!(dir = %dir.display(), "Resolved log directory");
    dir
}

/// Update staging directory ($TREX_MASTER_TMP_DIR or /tmp/trex-tmp)
pub fn tmp_dir() -> PathBuf {
    let dir = env_opt(TREX_MASTER_TMP_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TMP_DIR));
    tracing::trace!(dir = %dir.display(), "Resolved staging directory");
    dir
}

/// Temporary root the installation directory may live under ($TREX_MASTER_TEMP_ROOT or /tmp)
pub fn temp_root() -> PathBuf {
    let dir = env_opt(TREX_MASTER_TEMP_ROOT)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_ROOT));
    tracing::trace!(dir = %dir.display(), "Resolved temp root");
    dir
}
