//! Exclusivity registry backed by abstract-namespace Unix sockets.
//!
//! A daemon is "running" while some process holds a datagram socket bound to
//! `\0<tag>`. The kernel drops the binding as soon as the last holder exits,
//! so a crashed daemon never leaves a stale reservation behind.

use crate::error::{Result, SupervisorError};
use std::fs;
use std::io;
use std::os::fd::AsRawFd;
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixDatagram};
use tracing::{debug, trace};

/// Live proof that this process holds `tag`.
#[derive(Debug)]
pub struct Reservation {
    tag: String,
    socket: UnixDatagram,
}

impl Reservation {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Keep the socket open across `exec` so the launched program becomes
    /// the holder. Consumes the handle; the descriptor is never closed here.
    pub fn into_inheritable(self) -> io::Result<()> {
        let fd = self.socket.as_raw_fd();
        // SAFETY: fd is a valid descriptor owned by self.socket.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        std::mem::forget(self.socket);
        Ok(())
    }
}

fn bind(tag: &str) -> io::Result<UnixDatagram> {
    let addr = SocketAddr::from_abstract_name(tag.as_bytes())?;
    UnixDatagram::bind_addr(&addr)
}

/// Take the reservation for `tag`.
pub fn reserve(tag: &str) -> Result<Reservation> {
    match bind(tag) {
        Ok(socket) => {
            debug!("Reserved '{}'", tag);
            Ok(Reservation {
                tag: tag.to_string(),
                socket,
            })
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            Err(SupervisorError::already_running(tag))
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether some process holds `tag`. Binds and releases immediately.
pub fn probe(tag: &str) -> bool {
    match bind(tag) {
        Ok(socket) => {
            drop(socket);
            false
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => true,
        Err(e) => {
            debug!("Probe of '{}' failed: {}", tag, e);
            false
        }
    }
}

/// Processes holding the reservation for `tag`.
///
/// Finds the socket inode in `/proc/net/unix`, then every process with a
/// descriptor pointing at it. Processes we may not inspect are skipped.
pub fn holders(tag: &str) -> Result<Vec<i32>> {
    let table = fs::read_to_string("/proc/net/unix")?;
    let Some(inode) = find_inode(&table, tag) else {
        trace!("No socket bound for '{}'", tag);
        return Ok(Vec::new());
    };
    let needle = format!("socket:[{}]", inode);

    let mut pids = Vec::new();
    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<i32>().ok())
        else {
            continue;
        };

        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let holds = fds.flatten().any(|fd| {
            fs::read_link(fd.path())
                .map(|target| target.as_os_str() == needle.as_str())
                .unwrap_or(false)
        });
        if holds {
            pids.push(pid);
        }
    }

    debug!("Holders of '{}': {:?}", tag, pids);
    Ok(pids)
}

/// Inode of the socket bound to abstract name `tag` in a `/proc/net/unix` dump.
fn find_inode(table: &str, tag: &str) -> Option<u64> {
    let wanted = format!("@{}", tag);
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // Num RefCount Protocol Flags Type St Inode Path
        if fields.len() < 8 || fields[7] != wanted {
            return None;
        }
        fields[6].parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unique_tag(stem: &str) -> String {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        format!(
            "trex_master_test_{}_{}_{}",
            stem,
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn reserve_is_exclusive_until_dropped() {
        let tag = unique_tag("exclusive");
        assert!(!probe(&tag));

        let reservation = reserve(&tag).unwrap();
        assert_eq!(reservation.tag(), tag);
        assert!(probe(&tag));

        let err = reserve(&tag).unwrap_err();
        assert_eq!(err.kind(), "AlreadyRunning");

        drop(reservation);
        assert!(!probe(&tag));
        assert!(reserve(&tag).is_ok());
    }

    #[test]
    fn probe_does_not_keep_the_reservation() {
        let tag = unique_tag("probe");
        assert!(!probe(&tag));
        assert!(!probe(&tag));
        assert!(reserve(&tag).is_ok());
    }

    #[test]
    fn holders_finds_current_process() {
        let tag = unique_tag("holders");
        assert!(holders(&tag).unwrap().is_empty());

        let _reservation = reserve(&tag).unwrap();
        let pids = holders(&tag).unwrap();
        assert_eq!(pids, vec![std::process::id() as i32]);
    }

    #[test]
    fn find_inode_parses_proc_table() {
        let table = "\
Num       RefCount Protocol Flags    Type St Inode Path
0000000000000000: 00000002 00000000 00010000 0001 01 18342 /run/systemd/private
0000000000000000: 00000002 00000000 00000000 0002 01 99812 @trex_daemon_server
0000000000000000: 00000003 00000000 00000000 0001 03 11111
";
        assert_eq!(find_inode(table, "trex_daemon_server"), Some(99812));
        assert_eq!(find_inode(table, "trex_master_daemon"), None);
    }
}
