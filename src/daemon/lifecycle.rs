use super::launcher::ALREADY_HELD_STATUS;
use super::managed::{ManagedDaemon, StartCommand};
use super::registry;
use crate::error::{Result, SupervisorError};
use std::fs::{self, OpenOptions};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SPAWN_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay before the single retry of a failed top-level action.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Operator-facing action selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonAction {
    Start,
    Stop,
    Show,
    Restart,
}

impl DaemonAction {
    /// Word used in the status line: "<name> is <passive>".
    pub fn passive(&self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Stop => "stopped",
            Self::Show => "running",
            Self::Restart => "restarted",
        }
    }

    /// Whether the daemon should be running after this action.
    pub fn expects_running(&self) -> bool {
        !matches!(self, Self::Stop)
    }
}

/// Start/stop/restart/status for one managed daemon.
#[derive(Debug, Clone)]
pub struct LifecycleController {
    daemon: ManagedDaemon,
    launcher: PathBuf,
    spawn_timeout: Duration,
    stop_timeout: Duration,
}

impl LifecycleController {
    pub fn new(daemon: ManagedDaemon, launcher: impl Into<PathBuf>) -> Self {
        Self {
            daemon,
            launcher: launcher.into(),
            spawn_timeout: SPAWN_TIMEOUT,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, spawn: Duration, stop: Duration) -> Self {
        self.spawn_timeout = spawn;
        self.stop_timeout = stop;
        self
    }

    pub fn daemon(&self) -> &ManagedDaemon {
        &self.daemon
    }

    pub fn name(&self) -> &str {
        &self.daemon.name
    }

    pub fn is_running(&self) -> bool {
        registry::probe(&self.daemon.tag)
    }

    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(SupervisorError::already_running(&self.daemon.name));
        }

        let mut child = self.command()?.spawn()?;
        info!(
            "Spawned {} (launcher PID {:?})",
            self.daemon.name,
            child.id()
        );

        let polls = (self.spawn_timeout.as_millis() / SPAWN_POLL_INTERVAL.as_millis()).max(1);
        let mut detail = None;
        for _ in 0..polls {
            tokio::time::sleep(SPAWN_POLL_INTERVAL).await;
            match child.try_wait()? {
                Some(status) if status.code() == Some(ALREADY_HELD_STATUS) => {
                    info!("{} was started concurrently", self.daemon.name);
                    return Err(SupervisorError::already_running(&self.daemon.name));
                }
                Some(status) if !status.success() => {
                    detail = Some(format!("ended unexpectedly, {}", status));
                    break;
                }
                // The command daemonised itself and exited cleanly.
                Some(_) => break,
                // A racing launcher may hold the tag while ours is still
                // on its way to exiting with ALREADY_HELD_STATUS.
                None if self.is_running() && self.held_by(child.id()) => {
                    info!("{} is running", self.daemon.name);
                    return Ok(());
                }
                None => {}
            }
        }

        if detail.is_none() && self.is_running() {
            if self.held_by(child.id()) {
                return Ok(());
            }
            return Err(SupervisorError::already_running(&self.daemon.name));
        }

        warn!("{} did not come up: {:?}", self.daemon.name, detail);
        Err(SupervisorError::SpawnTimeout {
            name: self.daemon.name.clone(),
            log_path: self.daemon.log_path.clone(),
            detail,
        })
    }

    pub async fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Err(SupervisorError::not_running(&self.daemon.name));
        }

        for signal in [libc::SIGTERM, libc::SIGKILL] {
            let own_pid = std::process::id() as i32;
            let pids: Vec<i32> = registry::holders(&self.daemon.tag)?
                .into_iter()
                .filter(|pid| *pid != own_pid)
                .collect();
            if pids.is_empty() {
                warn!(
                    "{} holds its reservation but no owning process is visible",
                    self.daemon.name
                );
            }
            for pid in pids {
                info!("Sending signal {} to {} (PID {})", signal, self.daemon.name, pid);
                // SAFETY: kill(2) has no memory-safety preconditions.
                unsafe {
                    libc::kill(pid, signal);
                }
            }
            if self.wait_released().await {
                info!("{} stopped", self.daemon.name);
                return Ok(());
            }
            warn!(
                "{} still running after signal {}",
                self.daemon.name, signal
            );
        }

        Err(SupervisorError::StopTimeout {
            name: self.daemon.name.clone(),
        })
    }

    pub async fn restart(&self) -> Result<()> {
        match self.stop().await {
            Ok(()) | Err(SupervisorError::NotRunning { .. }) => {}
            Err(e) => return Err(e),
        }
        self.start().await
    }

    /// Run one operator action. `Show` only reports and never fails.
    pub async fn run(&self, action: DaemonAction) -> Result<()> {
        match action {
            DaemonAction::Start => self.start().await,
            DaemonAction::Stop => self.stop().await,
            DaemonAction::Restart => self.restart().await,
            DaemonAction::Show => Ok(()),
        }
    }

    fn held_by(&self, pid: Option<u32>) -> bool {
        match (pid, registry::holders(&self.daemon.tag)) {
            (Some(pid), Ok(holders)) => holders.contains(&(pid as i32)),
            // Without a pid or a holder list, trust the reservation.
            _ => true,
        }
    }

    async fn wait_released(&self) -> bool {
        let polls = (self.stop_timeout.as_millis() / STOP_POLL_INTERVAL.as_millis()).max(1);
        for _ in 0..polls {
            if !self.is_running() {
                return true;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        !self.is_running()
    }

    fn command(&self) -> Result<Command> {
        if let Some(parent) = self.daemon.output_log.parent() {
            fs::create_dir_all(parent)?;
        }
        let output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.daemon.output_log)?;

        let mut cmd = Command::new(&self.launcher);
        match &self.daemon.start_command {
            StartCommand::Serve { args } => {
                cmd.args(args);
            }
            StartCommand::External { program, args } => {
                cmd.args(["hold", "--tag", &self.daemon.tag, "--", program]);
                cmd.args(args);
            }
        }
        debug!("Launch command for {}: {:?}", self.daemon.name, cmd);

        cmd.current_dir(&self.daemon.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output.try_clone()?))
            .stderr(Stdio::from(output))
            .process_group(0);
        Ok(cmd)
    }
}

/// Run `op`; if it fails, wait `delay` and run it exactly once more.
pub async fn with_retry<T, F, Fut>(delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("Attempt failed ({}), retrying in {:?}", e, delay);
            tokio::time::sleep(delay).await;
            op().await
        }
    }
}
