pub mod clienv;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod paths;
pub mod privilege;
pub mod setup;
pub mod update;

pub use config::{DaemonCommand, DaemonRole, SupervisorConfig};
pub use error::{Result, SupervisorError};
pub use update::Updater;
