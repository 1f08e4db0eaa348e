//! Process-wide configuration.
//!
//! Built once at process entry from the command line (plus the optional TOML
//! override file and environment) and then shared read-only by every
//! component.

use crate::clienv;
use crate::error::{Result, SupervisorError};
use crate::paths;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_MASTER_PORT: u16 = 8091;
pub const DEFAULT_TREX_DAEMON_PORT: u16 = 8090;
pub const DEFAULT_STL_RPC_PROXY_PORT: u16 = 8095;

const STL_RPC_PROXY_SUBDIR: &str = "automation/trex_control_plane/stl/examples";

/// One of the three supervised roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonRole {
    Supervisor,
    Worker,
    Proxy,
}

impl DaemonRole {
    pub const ALL: [DaemonRole; 3] = [Self::Supervisor, Self::Worker, Self::Proxy];

    /// Name accepted by `--type` and used as the registry tag stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "master_daemon",
            Self::Worker => "trex_daemon_server",
            Self::Proxy => "stl_rpc_proxy",
        }
    }
}

impl fmt::Display for DaemonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonRole {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|r| r.as_str()).collect();
                SupervisorError::Configuration(format!(
                    "unknown daemon type '{}', should be one of: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// External command used to launch the worker or the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DaemonCommand {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Relative paths resolve against the installation directory.
    pub working_dir: Option<PathBuf>,
}

impl DaemonCommand {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Contents of the optional `--config` TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonOverrides {
    pub worker: Option<DaemonCommand>,
    pub proxy: Option<DaemonCommand>,
}

impl DaemonOverrides {
    pub fn load(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading daemon overrides");
        let content = fs::read_to_string(path).map_err(|e| {
            SupervisorError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            SupervisorError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub master_port: u16,
    pub trex_daemon_port: u16,
    pub stl_rpc_proxy_port: u16,
    /// Absolute, normalised installation directory.
    pub trex_dir: PathBuf,
    pub allow_update: bool,
    /// Working directory captured at process entry.
    pub launch_dir: PathBuf,
    pub log_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub temp_root: PathBuf,
    pub config_file: Option<PathBuf>,
    /// Binary re-executed for the internal `serve` and `hold` modes.
    pub launcher: PathBuf,
    pub worker: DaemonCommand,
    pub proxy: DaemonCommand,
}

impl SupervisorConfig {
    /// Defaults for everything but the installation directory, which is
    /// resolved against `launch_dir`.
    pub fn new(trex_dir: &Path, launch_dir: &Path) -> Result<Self> {
        let launcher = std::env::current_exe()?;
        let trex_dir = paths::normalize(launch_dir, trex_dir);
        Ok(Self {
            master_port: DEFAULT_MASTER_PORT,
            trex_daemon_port: DEFAULT_TREX_DAEMON_PORT,
            stl_rpc_proxy_port: DEFAULT_STL_RPC_PROXY_PORT,
            allow_update: false,
            launch_dir: launch_dir.to_path_buf(),
            log_dir: clienv::log_dir(),
            tmp_dir: clienv::tmp_dir(),
            temp_root: clienv::temp_root(),
            config_file: None,
            launcher,
            worker: default_worker(),
            proxy: default_proxy(),
            trex_dir,
        })
    }

    pub fn with_ports(mut self, master: u16, trex_daemon: u16, stl_rpc_proxy: u16) -> Self {
        self.master_port = master;
        self.trex_daemon_port = trex_daemon;
        self.stl_rpc_proxy_port = stl_rpc_proxy;
        self
    }

    pub fn with_allow_update(mut self, allow: bool) -> Self {
        self.allow_update = allow;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }

    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = dir.into();
        self
    }

    pub fn with_launcher(mut self, exe: impl Into<PathBuf>) -> Self {
        self.launcher = exe.into();
        self
    }

    pub fn with_worker(mut self, command: DaemonCommand) -> Self {
        self.worker = command;
        self
    }

    pub fn with_proxy(mut self, command: DaemonCommand) -> Self {
        self.proxy = command;
        self
    }

    /// Apply daemon definitions from a TOML file and remember it so the
    /// `serve` child sees the same definitions.
    pub fn with_config_file(mut self, path: &Path) -> Result<Self> {
        let path = paths::normalize(&self.launch_dir, path);
        let overrides = DaemonOverrides::load(&path)?;
        if let Some(worker) = overrides.worker {
            self.worker = worker;
        }
        if let Some(proxy) = overrides.proxy {
            self.proxy = proxy;
        }
        self.config_file = Some(path);
        Ok(self)
    }

    pub fn port_for(&self, role: DaemonRole) -> u16 {
        match role {
            DaemonRole::Supervisor => self.master_port,
            DaemonRole::Worker => self.trex_daemon_port,
            DaemonRole::Proxy => self.stl_rpc_proxy_port,
        }
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(clienv::MASTER_LOG_FILE)
    }

    pub fn log_backup_file(&self) -> PathBuf {
        self.log_dir.join(clienv::MASTER_LOG_BACKUP)
    }

    /// Roots the installation directory must live under.
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        vec![self.launch_dir.clone(), self.temp_root.clone()]
    }

    /// Working directory of an external daemon command.
    pub fn resolve_working_dir(&self, command: &DaemonCommand) -> PathBuf {
        match &command.working_dir {
            Some(dir) => paths::normalize(&self.trex_dir, dir),
            None => self.trex_dir.clone(),
        }
    }

    /// Command-line arguments that make a `serve` child rebuild this config.
    pub fn serve_args(&self) -> Vec<String> {
        let mut args = vec![
            "serve".to_string(),
            "--master-port".to_string(),
            self.master_port.to_string(),
            "--trex-daemon-port".to_string(),
            self.trex_daemon_port.to_string(),
            "--stl-rpc-proxy-port".to_string(),
            self.stl_rpc_proxy_port.to_string(),
            "--trex-dir".to_string(),
            self.trex_dir.display().to_string(),
            "--launch-dir".to_string(),
            self.launch_dir.display().to_string(),
            "--log-dir".to_string(),
            self.log_dir.display().to_string(),
            "--tmp-dir".to_string(),
            self.tmp_dir.display().to_string(),
            "--temp-root".to_string(),
            self.temp_root.display().to_string(),
        ];
        if self.allow_update {
            args.push("--allow-update".to_string());
        }
        if let Some(path) = &self.config_file {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

fn default_worker() -> DaemonCommand {
    DaemonCommand::new("TRex daemon server", "python3").args(["trex_daemon_server", "start"])
}

fn default_proxy() -> DaemonCommand {
    DaemonCommand::new("Stateless RPC proxy", "su")
        .args([
            "-s",
            "/bin/bash",
            "-c",
            "python3 rpc_proxy_server.py",
            "nobody",
        ])
        .working_dir(STL_RPC_PROXY_SUBDIR)
}
