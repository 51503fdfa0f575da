//! Fleet executor tests: two-phase apply, fail-fast rollback, and the
//! coordinated commit instruction.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use common::{DeviceScript, ScriptedFactory};
use parking_lot::Mutex;
use serial_test::serial;
use tempfile::TempDir;
use ucible::diff::RemovalDirective;
use ucible::fleet::{
    load_fleet, FleetCallbacks, FleetConfig, FleetDevice, FleetExecutor,
};

const WORKERS: usize = 5;

/// A device config whose tree emits eight commands (section + 7 options).
const LAN_CONFIG: &str = "network:\n  interfaces:\n    lan:\n      proto: static\n      ipaddr: 192.168.1.1\n      netmask: 255.255.255.0\n      device: br-lan\n      mtu: 1500\n      ipv6: false\n      delegate: false\n";

/// A config touching network and wireless, for reload selection.
const DUAL_CONFIG: &str = "network:\n  interfaces:\n    lan:\n      proto: static\nwireless:\n  radios:\n    radio0:\n      channel: 36\n";

fn device(target: &str, configs: Vec<String>) -> FleetDevice {
    FleetDevice {
        target: target.to_string(),
        username: None,
        password: None,
        key_file: None,
        timeout: None,
        configs,
        tags: vec![],
    }
}

/// Builds a fleet whose devices all share one config file written to disk.
fn fleet_on_disk(dir: &TempDir, targets: &[&str], config: &str) -> (FleetConfig, PathBuf) {
    fs::write(dir.path().join("device.yaml"), config).unwrap();
    let mut fleet = FleetConfig::default();
    for (i, target) in targets.iter().enumerate() {
        fleet.devices.insert(
            format!("dev{}", i + 1),
            device(target, vec!["device.yaml".to_string()]),
        );
    }
    (fleet, dir.path().join("fleet.yaml"))
}

#[tokio::test]
async fn test_stage_and_coordinated_commit() {
    let dir = TempDir::new().unwrap();
    let (fleet, fleet_path) = fleet_on_disk(&dir, &["10.0.0.1", "10.0.0.2"], DUAL_CONFIG);

    let d1 = DeviceScript::default();
    let d2 = DeviceScript::default();
    let factory = ScriptedFactory::new()
        .device("10.0.0.1", d1.clone())
        .device("10.0.0.2", d2.clone());

    let mut executor = FleetExecutor::new(fleet, &fleet_path, Arc::new(factory));
    let (stage_result, commit_result) = executor
        .apply(None, &[], WORKERS, RemovalDirective::KeepAll, Some(3))
        .await;

    assert!(!stage_result.aborted);
    assert!(stage_result.all_successful());
    assert_eq!(stage_result.total_count(), 2);
    assert!(commit_result.all_successful());

    for script in [&d1, &d2] {
        let executed = script.executed();
        // Mutations staged, no inline commit.
        assert!(executed.iter().any(|c| c.starts_with("uci set network.lan")));
        assert!(!executed.contains(&"uci commit".to_string()));
        // The last instruction is the detached delayed commit with the
        // reloads selected from the mutated packages.
        assert_eq!(
            executed.last().unwrap(),
            "nohup sh -c 'sleep 3 && uci commit && /etc/init.d/network restart && wifi reload' > /dev/null 2>&1 &"
        );
    }
}

#[tokio::test]
async fn test_fail_fast_rollback_leaves_no_commits() {
    let dir = TempDir::new().unwrap();
    let (fleet, fleet_path) =
        fleet_on_disk(&dir, &["10.0.0.1", "10.0.0.2", "10.0.0.3"], LAN_CONFIG);

    let d1 = DeviceScript::default();
    // Device 2 fails after five staged commands.
    let d2 = DeviceScript {
        fail_at: Some(5),
        ..DeviceScript::default()
    };
    let d3 = DeviceScript::default();
    let factory = ScriptedFactory::new()
        .device("10.0.0.1", d1.clone())
        .device("10.0.0.2", d2.clone())
        .device("10.0.0.3", d3.clone());

    let mut executor = FleetExecutor::new(fleet, &fleet_path, Arc::new(factory));
    let (stage_result, commit_result) = executor
        .apply(None, &[], WORKERS, RemovalDirective::KeepAll, None)
        .await;

    assert!(stage_result.aborted);
    assert!(stage_result
        .abort_reason
        .as_deref()
        .unwrap()
        .contains("dev2"));
    assert!(commit_result.aborted);
    assert!(commit_result.devices.is_empty());

    // Every device that received commands was reverted; none committed.
    for script in [&d1, &d2, &d3] {
        let executed = script.executed();
        if !executed.is_empty() {
            assert_eq!(executed.last().unwrap(), "uci revert");
        }
        assert!(!executed.iter().any(|c| c.contains("uci commit")));
    }
    // The failing device definitely got its best-effort revert.
    assert!(d2.executed().contains(&"uci revert".to_string()));
}

#[tokio::test]
async fn test_connect_failure_aborts_stage() {
    let dir = TempDir::new().unwrap();
    let (fleet, fleet_path) = fleet_on_disk(&dir, &["10.0.0.1", "10.0.0.2"], LAN_CONFIG);

    let d1 = DeviceScript::default();
    let d2 = DeviceScript {
        refuse_connect: true,
        ..DeviceScript::default()
    };
    let factory = ScriptedFactory::new()
        .device("10.0.0.1", d1.clone())
        .device("10.0.0.2", d2.clone());

    let mut executor = FleetExecutor::new(fleet, &fleet_path, Arc::new(factory));
    let stage_result = executor
        .stage(None, &[], WORKERS, RemovalDirective::KeepAll)
        .await;

    assert!(stage_result.aborted);
    assert!(!stage_result.devices["dev2"].success);
    // No commit reached any device.
    assert!(!d1.executed().iter().any(|c| c.contains("uci commit")));
}

#[tokio::test]
async fn test_preview_never_mutates() {
    let dir = TempDir::new().unwrap();
    let (fleet, fleet_path) = fleet_on_disk(&dir, &["10.0.0.1"], LAN_CONFIG);

    let script = DeviceScript::with_packages(&[(
        "network",
        "network.lan=interface\nnetwork.lan.proto='static'\n",
    )]);
    let factory = ScriptedFactory::new().device("10.0.0.1", script.clone());

    let executor = FleetExecutor::new(fleet, &fleet_path, Arc::new(factory));
    let result = executor
        .preview(None, &[], WORKERS, RemovalDirective::KeepAll)
        .await;

    assert!(result.all_successful());
    let device_result = &result.devices["dev1"];
    let diff = device_result.diff.as_ref().unwrap();
    assert!(!diff.is_empty());
    assert_eq!(device_result.changes, diff.change_count());
    // Nothing was executed on the device.
    assert!(script.executed().is_empty());
}

#[tokio::test]
async fn test_target_filter_limits_stage() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("device.yaml"), LAN_CONFIG).unwrap();
    let mut fleet = FleetConfig::default();
    fleet.devices.insert(
        "ap-attic".to_string(),
        device("10.0.0.1", vec!["device.yaml".to_string()]),
    );
    fleet.devices.insert(
        "gateway".to_string(),
        device("10.0.0.2", vec!["device.yaml".to_string()]),
    );

    let d1 = DeviceScript::default();
    let d2 = DeviceScript::default();
    let factory = ScriptedFactory::new()
        .device("10.0.0.1", d1.clone())
        .device("10.0.0.2", d2.clone());

    let mut executor =
        FleetExecutor::new(fleet, &dir.path().join("fleet.yaml"), Arc::new(factory));
    let result = executor
        .stage(Some("ap-*"), &[], WORKERS, RemovalDirective::KeepAll)
        .await;

    assert_eq!(result.total_count(), 1);
    assert!(result.devices.contains_key("ap-attic"));
    assert!(d2.executed().is_empty());

    executor.cleanup().await;
}

#[tokio::test]
async fn test_progress_callbacks_fire() {
    let dir = TempDir::new().unwrap();
    let (fleet, fleet_path) = fleet_on_disk(&dir, &["10.0.0.1"], LAN_CONFIG);
    let factory = ScriptedFactory::new().device("10.0.0.1", DeviceScript::default());

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let phase_events = Arc::clone(&events);
    let start_events = Arc::clone(&events);
    let complete_events = Arc::clone(&events);

    let callbacks = FleetCallbacks::new()
        .on_phase_start(move |phase| phase_events.lock().push(format!("phase:{}", phase)))
        .on_device_start(move |name, target| {
            start_events.lock().push(format!("start:{}:{}", name, target))
        })
        .on_device_complete(move |name, result| {
            complete_events
                .lock()
                .push(format!("done:{}:{}", name, result.success))
        });

    let mut executor = FleetExecutor::new(fleet, &fleet_path, Arc::new(factory))
        .with_callbacks(callbacks);
    let (stage_result, _) = executor
        .apply(None, &[], WORKERS, RemovalDirective::KeepAll, Some(1))
        .await;
    assert!(stage_result.all_successful());

    let events = events.lock().clone();
    assert!(events.contains(&"phase:stage".to_string()));
    assert!(events.contains(&"phase:commit".to_string()));
    assert!(events.contains(&"start:dev1:10.0.0.1".to_string()));
    assert!(events.iter().any(|e| e.starts_with("done:dev1:true")));
}

#[test]
#[serial]
fn test_load_fleet_with_interpolation() {
    std::env::set_var("UCIBLE_TEST_FLEET_PW", "s3cret-pw");
    let dir = TempDir::new().unwrap();
    let fleet_path = dir.path().join("fleet.yaml");
    fs::write(
        &fleet_path,
        "defaults:\n  timeout: 5\n  username: admin\n  commit_delay: 3\nconfig_layers:\n  base: configs/base.yaml\ndevices:\n  r1:\n    target: 192.168.1.1\n    password: ${oc.env:UCIBLE_TEST_FLEET_PW}\n    configs:\n      - ${config_layers.base}\n      - configs/r1.yaml\n    tags: [ap, mesh]\n",
    )
    .unwrap();

    let fleet = load_fleet(&fleet_path).unwrap();
    assert_eq!(fleet.defaults.timeout, 5);
    assert_eq!(fleet.defaults.username, "admin");
    assert_eq!(fleet.defaults.commit_delay, 3);

    let r1 = &fleet.devices["r1"];
    assert_eq!(r1.password.as_deref(), Some("s3cret-pw"));
    assert_eq!(
        r1.configs,
        vec!["configs/base.yaml".to_string(), "configs/r1.yaml".to_string()]
    );
    assert_eq!(r1.tags, vec!["ap".to_string(), "mesh".to_string()]);
    std::env::remove_var("UCIBLE_TEST_FLEET_PW");
}
