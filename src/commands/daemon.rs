use super::build_config;
use crate::args::Cli;
use console::style;
use trex_master::config::DaemonRole;
use trex_master::daemon::{with_retry, DaemonAction, LifecycleController, ManagedDaemon, RETRY_DELAY};
use trex_master::setup::{self, InstallDir};
use trex_master::{logging, privilege};

pub(crate) async fn cmd_daemon(cli: &Cli, action: DaemonAction) -> anyhow::Result<()> {
    logging::init_cli_logging();

    let controller = match run(cli, action).await {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("{}", style(e).red());
            std::process::exit(1);
        }
    };

    let name = controller.name();
    if controller.is_running() == action.expects_running() {
        println!("{}", style(format!("{} is {}", name, action.passive())).green());
        Ok(())
    } else {
        println!(
            "{}",
            style(format!("{} is NOT {}", name, action.passive())).red()
        );
        std::process::exit(1);
    }
}

/// Check, prepare, then run `action` with one retry. Returns the controller
/// so the caller can report the resulting state.
async fn run(cli: &Cli, action: DaemonAction) -> trex_master::Result<LifecycleController> {
    // Everything that can refuse the invocation runs before anything changes.
    privilege::ensure_root()?;
    let role: DaemonRole = cli.daemon_type.parse()?;
    let config = build_config(cli)?;
    privilege::pin_to_core_zero()?;

    if let InstallDir::Created = setup::prepare_environment(&config)? {
        println!(
            "Created installation directory {}",
            config.trex_dir.display()
        );
    }

    let controller = LifecycleController::new(
        ManagedDaemon::from_config(&config, role),
        &config.launcher,
    );
    if action != DaemonAction::Show {
        with_retry(RETRY_DELAY, || controller.run(action)).await?;
    }
    Ok(controller)
}
