pub(crate) mod daemon;
pub(crate) mod hold;
pub(crate) mod serve;

use crate::args::Cli;
use trex_master::config::SupervisorConfig;

/// Process-wide configuration from the command line, environment and
/// optional `--config` file.
pub(crate) fn build_config(cli: &Cli) -> trex_master::Result<SupervisorConfig> {
    let launch_dir = match &cli.launch_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let trex_dir = cli.trex_dir.clone().unwrap_or_else(|| launch_dir.clone());

    let mut config = SupervisorConfig::new(&trex_dir, &launch_dir)?
        .with_ports(
            cli.master_port,
            cli.trex_daemon_port,
            cli.stl_rpc_proxy_port,
        )
        .with_allow_update(cli.allow_update);
    if let Some(dir) = &cli.log_dir {
        config = config.with_log_dir(dir);
    }
    if let Some(dir) = &cli.tmp_dir {
        config = config.with_tmp_dir(dir);
    }
    if let Some(dir) = &cli.temp_root {
        config = config.with_temp_root(dir);
    }
    if let Some(path) = &cli.config {
        config = config.with_config_file(path)?;
    }
    Ok(config)
}
