use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use trex_master::config::{
    DEFAULT_MASTER_PORT, DEFAULT_STL_RPC_PROXY_PORT, DEFAULT_TREX_DAEMON_PORT,
};

#[derive(Parser)]
#[command(name = "trex-master")]
#[command(version)]
#[command(
    about = "Runs the master daemon that can start/stop the TRex daemons or update the TRex version",
    long_about = None
)]
pub(crate) struct Cli {
    /// Action applied to the selected daemon
    #[arg(value_enum)]
    pub action: Action,

    /// Daemon to act on: master_daemon, trex_daemon_server or stl_rpc_proxy
    #[arg(
        long = "type",
        visible_alias = "daemon-type",
        alias = "daemon_type",
        value_name = "DAEMON_TYPE",
        default_value = "master_daemon"
    )]
    pub daemon_type: String,

    /// Port of the master daemon control plane
    #[arg(short = 'p', long, default_value_t = DEFAULT_MASTER_PORT)]
    pub master_port: u16,

    /// Port of the TRex daemon server
    #[arg(long, default_value_t = DEFAULT_TREX_DAEMON_PORT)]
    pub trex_daemon_port: u16,

    /// Port of the stateless RPC proxy
    #[arg(long, default_value_t = DEFAULT_STL_RPC_PROXY_PORT)]
    pub stl_rpc_proxy_port: u16,

    /// TRex installation directory (default: current directory)
    #[arg(short = 'd', long)]
    pub trex_dir: Option<PathBuf>,

    /// Allow the control plane to replace the installation
    #[arg(long)]
    pub allow_update: bool,

    /// TOML file overriding the worker/proxy commands
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory the operator launched from (set for the serve child)
    #[arg(long, hide = true)]
    pub launch_dir: Option<PathBuf>,

    #[arg(long, hide = true)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, hide = true)]
    pub tmp_dir: Option<PathBuf>,

    #[arg(long, hide = true)]
    pub temp_root: Option<PathBuf>,

    /// Registry tag reserved by `hold`
    #[arg(long, hide = true)]
    pub tag: Option<String>,

    /// Command `hold` replaces itself with
    #[arg(last = true, hide = true)]
    pub command: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Action {
    Start,
    Stop,
    Show,
    Restart,
    /// Run the master daemon in the foreground
    #[value(hide = true)]
    Serve,
    /// Reserve a tag, then exec the command after `--`
    #[value(hide = true)]
    Hold,
}
