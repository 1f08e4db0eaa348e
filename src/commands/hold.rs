use crate::args::Cli;
use anyhow::Context;
use trex_master::daemon::launcher::{self, ALREADY_HELD_STATUS};
use trex_master::{logging, SupervisorError};

pub(crate) fn cmd_hold(cli: &Cli) -> anyhow::Result<()> {
    logging::init_cli_logging();
    let tag = cli.tag.as_deref().context("hold requires --tag")?;
    match launcher::hold_and_exec(tag, &cli.command) {
        Err(e @ SupervisorError::AlreadyRunning { .. }) => {
            eprintln!("{}", e);
            std::process::exit(ALREADY_HELD_STATUS);
        }
        result => result
            .with_context(|| format!("Failed to launch {:?} holding '{}'", cli.command, tag)),
    }
}
