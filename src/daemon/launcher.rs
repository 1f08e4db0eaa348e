//! `hold` mode: reserve a tag, then become the daemon.
//!
//! The launcher binds the reservation, marks it inheritable and `exec`s the
//! daemon command in place. The daemon process (and anything it forks) then
//! owns the reservation, and the kernel releases it when they are all gone.

use super::registry;
use crate::error::{Result, SupervisorError};
use std::os::unix::process::CommandExt;
use std::process::Command;
use tracing::debug;

/// Exit status of a `hold` or `serve` process that lost the reservation
/// race, so the spawning controller reports `AlreadyRunning`.
pub const ALREADY_HELD_STATUS: i32 = 3;

/// Only returns on failure; on success the process image is replaced.
pub fn hold_and_exec(tag: &str, command: &[String]) -> Result<()> {
    let (program, args) = command.split_first().ok_or_else(|| {
        SupervisorError::Configuration("hold requires a command after '--'".to_string())
    })?;

    let reservation = registry::reserve(tag)?;
    reservation.into_inheritable()?;

    debug!("Executing {} {:?} holding '{}'", program, args, tag);
    let err = Command::new(program).args(args).exec();
    Err(SupervisorError::Io(err))
}
