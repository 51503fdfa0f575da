//! Reconciler tests over a scripted transport: command ordering, deletion
//! collapse, commit/reload behaviour, and failure handling.

mod common;

use common::{DeviceScript, ScriptedTransport};
use ucible::diff::RemovalDirective;
use ucible::error::Error;
use ucible::reconcile::{AbortSignal, ApplyOptions, ApplyPhase, Reconciler};
use ucible::uci::ConfigTree;

fn apply_options(removal: RemovalDirective) -> ApplyOptions {
    ApplyOptions {
        dry_run: false,
        auto_commit: true,
        auto_reload: true,
        removal,
    }
}

#[tokio::test]
async fn test_whole_section_delete_collapses_on_device() {
    // The desired state is empty and the device carries a stale wifi-iface:
    // exactly one section delete is sent, no per-option deletes.
    let script = DeviceScript::with_packages(&[(
        "wireless",
        "wireless.old_wifi=wifi-iface\n\
         wireless.old_wifi.device='radio0'\n\
         wireless.old_wifi.ssid='Old'\n\
         wireless.old_wifi.encryption='psk2'\n",
    )]);
    let transport = ScriptedTransport::new("test-device", script.clone());

    let tree = ConfigTree::new();
    let mut reconciler = Reconciler::new(&transport);
    let report = reconciler
        .apply(&tree, &apply_options(RemovalDirective::RemoveAll), None)
        .await
        .unwrap();

    assert!(report.applied);
    assert_eq!(reconciler.phase(), ApplyPhase::Done);
    assert_eq!(
        script.executed(),
        vec![
            "uci delete wireless.old_wifi".to_string(),
            "uci commit".to_string(),
            "wifi reload".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_command_stream_ordering() {
    // Deletions before additions before modifications, then commit, then
    // the reloads for the mutated packages.
    let script = DeviceScript::with_packages(&[(
        "network",
        "network.lan=interface\n\
         network.lan.proto='static'\n\
         network.lan.ipaddr='192.168.2.1'\n\
         network.lan.gateway='192.168.2.254'\n",
    )]);
    let transport = ScriptedTransport::new("test-device", script.clone());

    let mut tree = ConfigTree::new();
    tree.package_mut("network")
        .add_section("lan", "interface")
        .set("proto", "static")
        .set("ipaddr", "192.168.1.1")
        .set("netmask", "255.255.255.0");

    let mut reconciler = Reconciler::new(&transport);
    reconciler
        .apply(&tree, &apply_options(RemovalDirective::RemoveAll), None)
        .await
        .unwrap();

    assert_eq!(
        script.executed(),
        vec![
            "uci delete network.lan.gateway".to_string(),
            "uci set network.lan.netmask='255.255.255.0'".to_string(),
            "uci set network.lan.ipaddr='192.168.1.1'".to_string(),
            "uci commit".to_string(),
            "/etc/init.d/network restart".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_dry_run_never_touches_the_transport() {
    let script = DeviceScript::with_packages(&[("network", "")]);
    let transport = ScriptedTransport::new("test-device", script.clone());

    let mut tree = ConfigTree::new();
    tree.package_mut("network")
        .add_section("lan", "interface")
        .set("proto", "static");

    let options = ApplyOptions {
        dry_run: true,
        ..apply_options(RemovalDirective::KeepAll)
    };

    let mut reconciler = Reconciler::new(&transport);
    let report = reconciler.apply(&tree, &options, None).await.unwrap();

    assert!(!report.applied);
    assert_eq!(report.commands.len(), 2);
    assert!(script.executed().is_empty());
}

#[tokio::test]
async fn test_no_commit_no_reload() {
    let script = DeviceScript::with_packages(&[("network", "")]);
    let transport = ScriptedTransport::new("test-device", script.clone());

    let mut tree = ConfigTree::new();
    tree.package_mut("network")
        .add_section("lan", "interface")
        .set("proto", "static");

    let options = ApplyOptions {
        dry_run: false,
        auto_commit: false,
        auto_reload: false,
        removal: RemovalDirective::KeepAll,
    };

    let mut reconciler = Reconciler::new(&transport);
    let report = reconciler.apply(&tree, &options, None).await.unwrap();

    let executed = script.executed();
    assert!(!executed.iter().any(|c| c.contains("uci commit")));
    assert!(!executed.iter().any(|c| c.contains("restart")));
    // Reload selection is still reported for later coordinated commits.
    assert_eq!(report.reloads, vec!["/etc/init.d/network restart"]);
}

#[tokio::test]
async fn test_remote_failure_aborts_with_command_context() {
    let script = DeviceScript {
        fail_at: Some(1),
        ..DeviceScript::with_packages(&[("network", "")])
    };
    let transport = ScriptedTransport::new("test-device", script.clone());

    let mut tree = ConfigTree::new();
    tree.package_mut("network")
        .add_section("lan", "interface")
        .set("proto", "static")
        .set("ipaddr", "192.168.1.1");

    let mut reconciler = Reconciler::new(&transport);
    let err = reconciler
        .apply(&tree, &apply_options(RemovalDirective::KeepAll), None)
        .await
        .unwrap_err();

    assert_eq!(reconciler.phase(), ApplyPhase::Failed);
    match err {
        Error::RemoteCommand {
            command,
            exit_code,
            stderr,
            ..
        } => {
            assert_eq!(command, "uci set network.lan.proto='static'");
            assert_eq!(exit_code, 1);
            assert_eq!(stderr, "simulated device failure");
        }
        other => panic!("expected RemoteCommand error, got {:?}", other),
    }

    // Execution stopped at the offending command.
    assert_eq!(script.executed().len(), 2);
}

#[tokio::test]
async fn test_abort_signal_stops_before_exec() {
    let script = DeviceScript::with_packages(&[("network", "")]);
    let transport = ScriptedTransport::new("test-device", script.clone());

    let mut tree = ConfigTree::new();
    tree.package_mut("network")
        .add_section("lan", "interface")
        .set("proto", "static");

    let abort = AbortSignal::new();
    abort.trigger();

    let mut reconciler = Reconciler::new(&transport);
    let err = reconciler
        .apply(&tree, &apply_options(RemovalDirective::KeepAll), Some(&abort))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StageAborted(_)));
    assert!(script.executed().is_empty());
}

#[tokio::test]
async fn test_missing_packages_are_skipped() {
    // Only network is present on the device; the other known packages fail
    // to export and are skipped with a warning.
    let script = DeviceScript::with_packages(&[(
        "network",
        "network.lan=interface\nnetwork.lan.proto='static'\n",
    )]);
    let transport = ScriptedTransport::new("test-device", script.clone());

    let mut tree = ConfigTree::new();
    tree.package_mut("network")
        .add_section("lan", "interface")
        .set("proto", "static");

    let mut reconciler = Reconciler::new(&transport);
    let diff = reconciler
        .diff(&tree, &RemovalDirective::KeepAll)
        .await
        .unwrap();

    assert!(diff.is_empty());
    assert_eq!(diff.common.len(), 2);
}

#[tokio::test]
async fn test_malformed_package_is_skipped() {
    let script = DeviceScript::with_packages(&[
        ("network", "network.lan=interface\n"),
        ("wireless", "config wifi-device\n\tgarbage line here\n"),
    ]);
    let transport = ScriptedTransport::new("test-device", script.clone());

    let tree = ConfigTree::new();
    let mut reconciler = Reconciler::new(&transport);
    let diff = reconciler
        .diff(&tree, &RemovalDirective::KeepAll)
        .await
        .unwrap();

    // The malformed wireless dump contributes nothing; network is intact.
    assert!(diff
        .remote_sections()
        .contains(&("network".to_string(), "lan".to_string())));
    assert!(!diff
        .remote_sections()
        .iter()
        .any(|(pkg, _)| pkg == "wireless"));
}
