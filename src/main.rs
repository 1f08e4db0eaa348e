mod args;
mod commands;

use args::{Action, Cli};
use clap::Parser;
use std::future::Future;
use trex_master::daemon::DaemonAction;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let action = match cli.action {
        // Replaces the process image, so no runtime is started.
        Action::Hold => return commands::hold::cmd_hold(&cli),
        Action::Serve => return block_on(commands::serve::cmd_serve(&cli)),
        Action::Start => DaemonAction::Start,
        Action::Stop => DaemonAction::Stop,
        Action::Show => DaemonAction::Show,
        Action::Restart => DaemonAction::Restart,
    };
    block_on(commands::daemon::cmd_daemon(&cli, action))
}

fn block_on<F: Future<Output = anyhow::Result<()>>>(future: F) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(future)
}
