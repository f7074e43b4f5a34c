mod common;

use common::{TestEnv, fake_daemon, is_running, wait_for_exit, wait_until};
use daemon_harness::cmd::compile_cmd;
use daemon_harness::plugin::DaemonPlugin;
use daemon_harness::procs::send_signal;
use daemon_harness::runner::DaemonRunner;
use nix::sys::signal::Signal;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

#[test]
fn test_start_stop_round_trip() {
    let env = TestEnv::new();
    let mut runner = env.runner("round_trip");
    assert!(runner.stopped());
    assert!(runner.is_dead());

    runner.start().unwrap();
    assert!(runner.started());
    assert!(!runner.is_dead());
    let pid = env.wait_for_pid("round_trip");
    assert_eq!(runner.pid(), Some(pid));
    assert_eq!(runner.pid_file().pid(), Some(pid));

    runner.stop();
    assert!(runner.stopped());
    assert!(runner.is_dead());
    assert!(!env.pid_path("round_trip").exists());
    assert!(wait_for_exit(pid));
    assert!(
        runner
            .output()
            .unwrap()
            .stdout_lossy()
            .contains(&format!("fake daemon {pid} ready"))
    );
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let env = TestEnv::new();
    let mut runner = env.runner("idempotent");

    runner.start().unwrap();
    let pid = env.wait_for_pid("idempotent");
    runner.start().unwrap();
    assert_eq!(runner.pid(), Some(pid));
    assert_eq!(runner.process().map(|p| p.pid()), Some(pid));

    runner.stop();
    runner.stop();
    assert!(runner.stopped());
    assert!(wait_for_exit(pid));
}

#[test]
fn test_pid_file_outlives_runner() {
    let env = TestEnv::new();
    let mut first = env.runner("survivor");
    first.start().unwrap();
    let pid = env.wait_for_pid("survivor");
    drop(first);

    let mut second = env.runner("survivor");
    assert!(second.started());
    assert!(second.is_dead(), "no process handle in this runner");
    assert_eq!(second.pid(), Some(pid));
    assert!(is_running(pid));

    second.stop();
    assert!(second.stopped());
    assert!(wait_for_exit(pid));
}

#[test]
fn test_stale_pid_file_is_replaced() {
    let env = TestEnv::new();
    std::fs::write(env.pid_path("stale"), "999999999\n").unwrap();

    let mut runner = env.runner("stale");
    assert!(runner.started());
    runner.start().unwrap();
    let pid = env.wait_for_pid("stale");
    assert_ne!(pid, 999999999);
    assert_eq!(runner.process().map(|p| p.pid()), Some(pid));

    runner.stop();
    assert!(wait_for_exit(pid));
}

#[test]
fn test_recursive_stop_kills_children() {
    let env = TestEnv::new();
    let mut runner = env.builder("parent").flag("--spawn-child").build().unwrap();
    runner.start().unwrap();
    let pid = env.wait_for_pid("parent");
    let child = env.wait_for_child_pid("parent");
    assert!(is_running(child));

    runner.stop();
    assert!(wait_for_exit(pid));
    assert!(wait_for_exit(child), "child {child} survived its parent");
}

#[test]
fn test_non_recursive_stop_leaves_children() {
    let env = TestEnv::new();
    let mut runner = env.builder("lonely").flag("--spawn-child").build().unwrap();
    runner.start().unwrap();
    let pid = env.wait_for_pid("lonely");
    let child = env.wait_for_child_pid("lonely");

    runner.stop_with(false);
    assert!(runner.stopped());
    assert!(wait_for_exit(pid));
    assert!(is_running(child));

    send_signal(child, Signal::SIGKILL);
    assert!(wait_for_exit(child));
}

#[test]
fn test_recycled_pid_is_not_escalated() {
    let env = TestEnv::new();
    let mut stranger = std::process::Command::new("sh")
        .args(["-c", "trap '' TERM; while true; do sleep 0.1; done"])
        .spawn()
        .unwrap();
    let pid = stranger.id();
    std::thread::sleep(Duration::from_millis(200));

    // the file predates the process now holding its pid
    let path = env.pid_path("recycled");
    std::fs::write(&path, format!("{pid}\n")).unwrap();
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(3600))
        .unwrap();

    let mut runner = env.runner("recycled");
    assert!(runner.started());
    runner.stop();
    assert!(runner.stopped());
    assert!(!path.exists());
    assert!(is_running(pid));

    stranger.kill().unwrap();
    stranger.wait().unwrap();
}

#[test]
fn test_prefixed_command_runs_through_shell() {
    let env = TestEnv::new();
    let mut runner = env.builder("prefixed").cmd_prefix("exec").build().unwrap();
    let bin = fake_daemon().display().to_string();
    assert!(runner.cmd().starts_with(&format!("exec {bin} --pid-file=")));

    runner.start().unwrap();
    let pid = env.wait_for_pid("prefixed");
    // exec replaces the shell, so the daemon keeps the launched pid
    assert_eq!(runner.process().map(|p| p.pid()), Some(pid));

    runner.stop();
    assert!(wait_for_exit(pid));
}

#[test]
fn test_literal_command_and_env() {
    let mut runner = DaemonRunner::builder("literal", "sh")
        .literal_cmd("echo \"mode=$MODE\"; exec sleep 30")
        .env("MODE", "test")
        .build()
        .unwrap();
    runner.start().unwrap();
    let output = runner.output().unwrap().clone();
    assert!(wait_until(Duration::from_secs(5), || {
        output.stdout_lossy().contains("mode=test")
    }));

    runner.stop();
    assert!(runner.is_dead());
}

#[test]
fn test_compose_cmd() {
    let runner = DaemonRunner::builder("composed", fake_daemon())
        .cmd_prefix("prefix")
        .option("--help", "me")
        .flag("-h")
        .build()
        .unwrap();
    let bin = fake_daemon().display().to_string();
    assert_eq!(runner.cmd(), format!("prefix {bin} --help=me -h"));
    assert_eq!(
        compile_cmd(Some("prefix"), "daemon_bin", runner.options().unwrap()),
        "prefix daemon_bin --help=me -h"
    );
}

#[derive(Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl DaemonPlugin for Events {
    fn before_start(&mut self, daemon: &mut DaemonRunner) {
        self.0
            .lock()
            .unwrap()
            .push(format!("before_start started={}", daemon.started()));
    }

    fn after_start(&mut self, daemon: &mut DaemonRunner) {
        self.0
            .lock()
            .unwrap()
            .push(format!("after_start started={}", daemon.started()));
    }

    fn before_stop(&mut self, daemon: &mut DaemonRunner) {
        self.0
            .lock()
            .unwrap()
            .push(format!("before_stop started={}", daemon.started()));
    }

    fn after_stop(&mut self, daemon: &mut DaemonRunner) {
        self.0
            .lock()
            .unwrap()
            .push(format!("after_stop started={}", daemon.started()));
    }
}

#[test]
fn test_hooks_see_lifecycle_state() {
    let env = TestEnv::new();
    let events = Events::default();
    let log = Arc::clone(&events.0);
    let mut runner = env.builder("hooked").plugin(events).build().unwrap();

    runner.restart().unwrap();
    env.wait_for_pid("hooked");
    runner.stop();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "before_start started=false",
            "after_start started=true",
            "before_stop started=true",
            "after_stop started=false",
        ]
    );
}
