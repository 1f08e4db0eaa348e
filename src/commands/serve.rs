use super::build_config;
use crate::args::Cli;
use std::sync::Arc;
use trex_master::daemon::launcher::ALREADY_HELD_STATUS;
use trex_master::daemon::run_master_daemon;
use trex_master::SupervisorError;

/// Foreground master daemon. Started by `start`, which has already checked
/// privileges and prepared the directories.
pub(crate) async fn cmd_serve(cli: &Cli) -> anyhow::Result<()> {
    let config = Arc::new(build_config(cli)?);
    let result = run_master_daemon(config).await;
    if let Err(e) = &result {
        if let Some(SupervisorError::AlreadyRunning { .. }) = e.downcast_ref::<SupervisorError>() {
            eprintln!("{}", e);
            std::process::exit(ALREADY_HELD_STATUS);
        }
    }
    result
}
