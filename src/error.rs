use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("{name} is already running")]
    AlreadyRunning { name: String },

    #[error("{name} is not running")]
    NotRunning { name: String },

    #[error("{name} failed to run{}. Please look in log: {}", detail_suffix(.detail), .log_path.display())]
    SpawnTimeout {
        name: String,
        log_path: PathBuf,
        detail: Option<String>,
    },

    #[error("Could not stop {name}, even with SIGKILL")]
    StopTimeout { name: String },

    #[error("Could not get requested package: {0}")]
    Fetch(String),

    #[error("Could not untar the package: {0}")]
    Extract(String),

    #[error("Should be exactly one unpacked directory, got: {found:?}")]
    Layout { found: Vec<PathBuf> },

    #[error("Updating server not allowed")]
    UpdateDisabled,

    #[error("Stop {name} before updating, it is still running")]
    UpdateWhileRunning { name: String },

    #[error("Only allowed to use path under {}: {}", format_roots(.allowed), .path.display())]
    PathSafety { path: PathBuf, allowed: Vec<PathBuf> },

    #[error("Please run this program as root/with sudo ({0})")]
    Privilege(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Rollback failed, installation needs manual repair: {rollback} (original error: {original})")]
    RollbackFailed {
        original: Box<SupervisorError>,
        rollback: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Stable name reported to RPC callers in the fault `data.kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "AlreadyRunning",
            Self::NotRunning { .. } => "NotRunning",
            Self::SpawnTimeout { .. } => "SpawnTimeout",
            Self::StopTimeout { .. } => "StopTimeout",
            Self::Fetch(_) => "FetchError",
            Self::Extract(_) => "ExtractError",
            Self::Layout { .. } => "LayoutError",
            Self::UpdateDisabled => "UpdateDisabled",
            Self::UpdateWhileRunning { .. } => "UpdateWhileRunning",
            Self::PathSafety { .. } => "PathSafetyError",
            Self::Privilege(_) => "PrivilegeError",
            Self::Configuration(_) => "ConfigurationError",
            Self::RollbackFailed { .. } => "RollbackFailed",
            Self::Io(_) => "IoError",
        }
    }

    pub fn already_running(name: impl Into<String>) -> Self {
        Self::AlreadyRunning { name: name.into() }
    }

    pub fn not_running(name: impl Into<String>) -> Self {
        Self::NotRunning { name: name.into() }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

fn format_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_follow_taxonomy() {
        assert_eq!(SupervisorError::already_running("x").kind(), "AlreadyRunning");
        assert_eq!(SupervisorError::Fetch("boom".into()).kind(), "FetchError");
        assert_eq!(
            SupervisorError::Layout { found: vec![] }.kind(),
            "LayoutError"
        );
        assert_eq!(SupervisorError::UpdateDisabled.kind(), "UpdateDisabled");
    }

    #[test]
    fn spawn_timeout_mentions_log_location() {
        let err = SupervisorError::SpawnTimeout {
            name: "TRex daemon server".into(),
            log_path: PathBuf::from("/var/log/trex/trex_daemon_server.log"),
            detail: Some("exit status: 2".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/log/trex/trex_daemon_server.log"));
        assert!(msg.contains("exit status: 2"));
    }

    #[test]
    fn path_safety_lists_allowed_roots() {
        let err = SupervisorError::PathSafety {
            path: PathBuf::from("/etc/trex"),
            allowed: vec![PathBuf::from("/tmp"), PathBuf::from("/home/user")],
        };
        assert_eq!(
            err.to_string(),
            "Only allowed to use path under /tmp or /home/user: /etc/trex"
        );
    }
}
