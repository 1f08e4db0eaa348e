use super::lifecycle::LifecycleController;
use super::managed::ManagedDaemon;
use crate::config::{DaemonRole, SupervisorConfig};
use crate::error::{Result, SupervisorError};
use crate::update::{Updater, DEFAULT_PACKAGE_URL};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Everything the control plane operates on, built once per serve process.
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    worker: LifecycleController,
    proxy: LifecycleController,
    updater: Updater,
}

impl Supervisor {
    pub fn new(config: Arc<SupervisorConfig>) -> Self {
        let controller = |role| {
            LifecycleController::new(
                ManagedDaemon::from_config(&config, role),
                &config.launcher,
            )
        };
        let worker = controller(DaemonRole::Worker);
        let proxy = controller(DaemonRole::Proxy);
        let updater = Updater::from_config(&config);
        Self::from_parts(config, worker, proxy, updater)
    }

    pub fn from_parts(
        config: Arc<SupervisorConfig>,
        worker: LifecycleController,
        proxy: LifecycleController,
        updater: Updater,
    ) -> Self {
        Self {
            config,
            worker,
            proxy,
            updater,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn trex_path(&self) -> &Path {
        self.updater.target_dir()
    }

    /// Controller of a daemon managed through the control plane.
    pub fn controller(&self, role: DaemonRole) -> Result<&LifecycleController> {
        match role {
            DaemonRole::Worker => Ok(&self.worker),
            DaemonRole::Proxy => Ok(&self.proxy),
            DaemonRole::Supervisor => Err(SupervisorError::Configuration(
                "the master daemon is not controlled through its own control plane".to_string(),
            )),
        }
    }

    /// Replace the installation from `package` (the release URL by default).
    /// Refused while the worker daemon is running.
    pub async fn update_trex(&self, package: Option<&str>) -> Result<()> {
        if !self.config.allow_update {
            return Err(SupervisorError::UpdateDisabled);
        }
        if self.worker.is_running() {
            return Err(SupervisorError::UpdateWhileRunning {
                name: self.worker.name().to_string(),
            });
        }
        let source = package.unwrap_or(DEFAULT_PACKAGE_URL);
        info!("Update requested from {}", source);
        self.updater.update(source).await
    }
}
