//! Process privileges required before any daemon is touched.

use crate::error::{Result, SupervisorError};

/// Refuse to continue unless running with effective uid 0.
pub fn ensure_root() -> Result<()> {
    // SAFETY: geteuid(2) cannot fail and touches no memory.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(SupervisorError::Privilege(format!(
            "effective uid is {}",
            euid
        )));
    }
    Ok(())
}

/// Restrict this process (and everything it spawns) to CPU core 0.
pub fn pin_to_core_zero() -> Result<()> {
    // SAFETY: `set` is a zeroed, properly sized cpu_set_t owned by this frame.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(0, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(SupervisorError::Privilege(format!(
            "could not pin to CPU core 0: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}
