mod common;

use common::{TestEnv, wait_for_exit};
use daemon_harness::management::DaemonManagement;
use daemon_harness::plugin::DaemonPlugin;
use daemon_harness::runner::DaemonRunner;
use daemon_harness::service::{DaemonService, RestartService, RunnerGroup};
use std::sync::{Arc, Mutex};

struct StopOrder(Arc<Mutex<Vec<String>>>);

impl DaemonPlugin for StopOrder {
    fn after_stop(&mut self, daemon: &mut DaemonRunner) {
        self.0.lock().unwrap().push(daemon.name().to_string());
    }
}

#[test]
fn test_runner_group_lifecycle() {
    let env = TestEnv::new();
    let stopped = Arc::new(Mutex::new(Vec::new()));
    let mut group = RunnerGroup::new("backend");
    for name in ["db", "cache", "api"] {
        let runner = env
            .builder(name)
            .plugin(StopOrder(Arc::clone(&stopped)))
            .build()
            .unwrap();
        group.add(runner).unwrap();
    }

    group.start().unwrap();
    let first: Vec<u32> = ["db", "cache", "api"]
        .iter()
        .map(|n| env.wait_for_pid(n))
        .collect();

    group.restart().unwrap();
    assert_eq!(*stopped.lock().unwrap(), vec!["api", "cache", "db"]);
    for pid in &first {
        assert!(wait_for_exit(*pid));
    }
    let db = group.runner("db").unwrap().process().map(|p| p.pid());
    assert!(db.is_some());
    assert_ne!(db, Some(first[0]));

    group.stop().unwrap();
    assert!(group.daemons().iter().all(|d| d.stopped()));
}

#[test]
fn test_services_in_registry() {
    let env = TestEnv::new();
    let mut management = DaemonManagement::new();
    let group = RunnerGroup::new("web")
        .with(env.runner("front"))
        .unwrap()
        .with(env.runner("back"))
        .unwrap();
    management.add_service(group).unwrap();
    assert!(management.add_service(RunnerGroup::new("web")).is_err());

    management.start_services().unwrap();
    let front = env.wait_for_pid("front");
    let status = management.status();
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].name, "web");
    assert_eq!(status[0].daemon.as_deref(), Some("front"));
    assert!(status.iter().all(|s| s.started));

    management.restart_services().unwrap();
    assert!(wait_for_exit(front));
    management.stop_services().unwrap();
    assert!(management.status().iter().all(|s| !s.started));
}
