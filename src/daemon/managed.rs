use crate::config::{DaemonCommand, DaemonRole, SupervisorConfig};
use std::path::PathBuf;

/// How a managed daemon is brought up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartCommand {
    /// Re-run the launcher binary in `serve` mode with these arguments.
    Serve { args: Vec<String> },
    /// Launch an external program through the `hold` launcher.
    External { program: String, args: Vec<String> },
}

/// Identity of one supervised process. Holds no runtime state: whether it
/// is running is always asked of the exclusivity registry.
#[derive(Debug, Clone)]
pub struct ManagedDaemon {
    pub role: DaemonRole,
    pub name: String,
    pub tag: String,
    pub port: u16,
    pub start_command: StartCommand,
    pub working_dir: PathBuf,
    /// Receives stdout/stderr of the spawned process.
    pub output_log: PathBuf,
    /// Log file an operator should read when the daemon fails to start.
    pub log_path: PathBuf,
}

impl ManagedDaemon {
    pub fn from_config(config: &SupervisorConfig, role: DaemonRole) -> Self {
        let tag = default_tag(role).to_string();
        let port = config.port_for(role);
        let output_log = config.log_dir.join(format!("{}.log", tag));

        match role {
            DaemonRole::Supervisor => Self {
                role,
                name: "Master daemon".to_string(),
                port,
                start_command: StartCommand::Serve {
                    args: config.serve_args(),
                },
                working_dir: PathBuf::from("/"),
                log_path: config.log_file(),
                output_log,
                tag,
            },
            DaemonRole::Worker | DaemonRole::Proxy => {
                let command = external_command(config, role);
                let mut args = command.args.clone();
                args.push("-p".to_string());
                args.push(port.to_string());
                Self {
                    role,
                    name: command.name.clone(),
                    port,
                    start_command: StartCommand::External {
                        program: command.program.clone(),
                        args,
                    },
                    working_dir: config.resolve_working_dir(command),
                    log_path: output_log.clone(),
                    output_log,
                    tag,
                }
            }
        }
    }

    /// Replace the registry tag, e.g. to run several isolated supervisors.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

fn external_command(config: &SupervisorConfig, role: DaemonRole) -> &DaemonCommand {
    match role {
        DaemonRole::Proxy => &config.proxy,
        _ => &config.worker,
    }
}

fn default_tag(role: DaemonRole) -> &'static str {
    match role {
        DaemonRole::Supervisor => "trex_master_daemon",
        DaemonRole::Worker => "trex_daemon_server",
        DaemonRole::Proxy => "trex_stl_rpc_proxy",
    }
}
