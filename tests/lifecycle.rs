//! Worker lifecycle through the real `hold` launcher.

use std::path::Path;
use trex_master::config::{DaemonCommand, DaemonRole, SupervisorConfig};
use trex_master::daemon::{registry, DaemonAction, LifecycleController, ManagedDaemon};

const LAUNCHER: &str = env!("CARGO_BIN_EXE_trex-master");

fn config(dir: &Path, worker: DaemonCommand) -> SupervisorConfig {
    std::fs::create_dir_all(dir.join("trex")).unwrap();
    SupervisorConfig::new(&dir.join("trex"), dir)
        .unwrap()
        .with_log_dir(dir.join("logs"))
        .with_tmp_dir(dir.join("tmp"))
        .with_launcher(LAUNCHER)
        .with_worker(worker)
}

/// Ignores the trailing `-p <port>` and sleeps in place of a real worker.
fn sleeper() -> DaemonCommand {
    DaemonCommand::new("Sleeper", "sh").args(["-c", "exec sleep 30", "sh"])
}

fn controller(dir: &Path, worker: DaemonCommand, tag: &str) -> LifecycleController {
    let config = config(dir, worker);
    LifecycleController::new(
        ManagedDaemon::from_config(&config, DaemonRole::Worker).with_tag(tag),
        LAUNCHER,
    )
}

fn unique_tag(name: &str) -> String {
    format!("trex_master_it_{}_{}", name, std::process::id())
}

#[tokio::test]
async fn start_show_stop_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tag = unique_tag("round_trip");
    let controller = controller(dir.path(), sleeper(), &tag);

    assert!(!controller.is_running());
    controller.run(DaemonAction::Start).await.unwrap();
    assert!(controller.is_running());

    let holders = registry::holders(&tag).unwrap();
    assert_eq!(holders.len(), 1, "exactly one holder: {:?}", holders);

    let err = controller.start().await.unwrap_err();
    assert_eq!(err.kind(), "AlreadyRunning");
    assert_eq!(registry::holders(&tag).unwrap(), holders);

    controller.run(DaemonAction::Stop).await.unwrap();
    assert!(!controller.is_running());
    assert!(registry::holders(&tag).unwrap().is_empty());
}

#[tokio::test]
async fn racing_starts_yield_one_daemon_and_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let tag = unique_tag("race");
    let a = controller(dir.path(), sleeper(), &tag);
    let b = controller(dir.path(), sleeper(), &tag);

    let (first, second) = tokio::join!(a.start(), b.start());
    let kinds: Vec<&str> = [&first, &second]
        .iter()
        .filter_map(|r| r.as_ref().err().map(|e| e.kind()))
        .collect();
    assert!(
        first.is_ok() || second.is_ok(),
        "one start must win: {:?} {:?}",
        first,
        second
    );
    assert!(
        kinds.iter().all(|k| *k == "AlreadyRunning"),
        "loser must see AlreadyRunning: {:?}",
        kinds
    );
    assert_eq!(registry::holders(&tag).unwrap().len(), 1);

    a.stop().await.unwrap();
}

#[tokio::test]
async fn restart_replaces_the_holder() {
    let dir = tempfile::tempdir().unwrap();
    let tag = unique_tag("restart");
    let controller = controller(dir.path(), sleeper(), &tag);

    // Restarting an idle daemon simply starts it.
    controller.restart().await.unwrap();
    let first = registry::holders(&tag).unwrap();

    controller.restart().await.unwrap();
    let second = registry::holders(&tag).unwrap();
    assert_eq!(second.len(), 1);
    assert_ne!(first, second);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn broken_command_reports_spawn_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let tag = unique_tag("broken");
    let broken = DaemonCommand::new("Broken worker", "/nonexistent/trex-worker");
    let controller = controller(dir.path(), broken, &tag);

    let err = controller.start().await.unwrap_err();
    assert_eq!(err.kind(), "SpawnTimeout");
    assert!(err.to_string().contains("Broken worker"));
    assert!(!controller.is_running());

    let output = std::fs::read_to_string(&controller.daemon().output_log).unwrap();
    assert!(output.contains("/nonexistent/trex-worker"), "{}", output);
}

#[test]
fn hold_without_command_fails() {
    let status = std::process::Command::new(LAUNCHER)
        .args(["hold", "--tag", &unique_tag("empty")])
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn refused_action_prints_one_error_and_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let output = std::process::Command::new(LAUNCHER)
        .current_dir(dir.path())
        .args(["start", "--type", "bogus_daemon"])
        .env("TREX_MASTER_LOG_DIR", dir.path().join("logs"))
        .env("TREX_MASTER_TMP_DIR", dir.path().join("tmp"))
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 1, "{}", stderr);
    // Refused as non-root, otherwise on the unknown type.
    assert!(
        lines[0].contains("root") || lines[0].contains("bogus_daemon"),
        "{}",
        stderr
    );
    assert!(!dir.path().join("tmp").exists());
}
