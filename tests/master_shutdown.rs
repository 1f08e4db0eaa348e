//! Master daemon start races and immediate stops.
//!
//! One test function: it holds the default master tag, which must not be
//! shared with another test running at the same time.

use std::path::Path;
use std::sync::Arc;
use trex_master::config::{DaemonRole, SupervisorConfig};
use trex_master::daemon::{LifecycleController, ManagedDaemon};

const LAUNCHER: &str = env!("CARGO_BIN_EXE_trex-master");

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config(dir: &Path) -> SupervisorConfig {
    std::fs::create_dir_all(dir.join("trex")).unwrap();
    SupervisorConfig::new(&dir.join("trex"), dir)
        .unwrap()
        .with_ports(free_port(), free_port(), free_port())
        .with_log_dir(dir.join("logs"))
        .with_tmp_dir(dir.join("tmp"))
        .with_temp_root(dir.join("scratch"))
        .with_launcher(LAUNCHER)
}

fn master(config: &SupervisorConfig) -> LifecycleController {
    LifecycleController::new(
        ManagedDaemon::from_config(config, DaemonRole::Supervisor),
        LAUNCHER,
    )
}

#[tokio::test]
async fn racing_masters_and_immediate_stop() {
    for round in 0..3 {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config(dir.path()));
        let (a, b) = (master(&config), master(&config));

        let (first, second) = tokio::join!(a.start(), b.start());
        match (&first, &second) {
            (Ok(()), Err(e)) | (Err(e), Ok(())) => assert_eq!(e.kind(), "AlreadyRunning"),
            _ => panic!("round {}: {:?} {:?}", round, first, second),
        }
        assert!(a.is_running());

        // Terminate before the daemon has had a chance to bind its port.
        a.stop().await.unwrap();
        assert!(!a.is_running());

        let log = std::fs::read_to_string(config.log_file()).unwrap();
        assert!(
            log.contains("Got signal SIGTERM, exiting."),
            "round {}: {}",
            round,
            log
        );
    }
}
