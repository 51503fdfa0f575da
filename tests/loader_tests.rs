//! Layered loader tests: deep merge, interpolation, and document lowering.

use std::fs;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;
use ucible::error::Error;
use ucible::loader::{document_from_tree, load_config_tree, tree_from_document};
use ucible::uci::{OptionValue, UciCommand};

fn write_layers(dir: &TempDir, layers: &[(&str, &str)]) -> Vec<PathBuf> {
    layers
        .iter()
        .map(|(name, content)| {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_later_layers_override_earlier() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[
            (
                "base.yaml",
                "network:\n  interfaces:\n    lan:\n      proto: static\n      ipaddr: 192.168.1.1\n",
            ),
            (
                "site.yaml",
                "network:\n  interfaces:\n    lan:\n      ipaddr: 192.168.7.1\n",
            ),
        ],
    );

    let tree = load_config_tree(&layers).unwrap();
    let lan = tree.package("network").unwrap().section("lan").unwrap();
    assert_eq!(
        lan.get("ipaddr"),
        Some(&OptionValue::Scalar("192.168.7.1".to_string()))
    );
    // Untouched options survive the merge.
    assert_eq!(
        lan.get("proto"),
        Some(&OptionValue::Scalar("static".to_string()))
    );
}

#[test]
fn test_sequences_overwrite_entirely() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[
            (
                "base.yaml",
                "network:\n  devices:\n    br_lan:\n      type: bridge\n      ports: [lan1, lan2, lan3]\n",
            ),
            (
                "site.yaml",
                "network:\n  devices:\n    br_lan:\n      ports: [lan1, bat0.10]\n",
            ),
        ],
    );

    let tree = load_config_tree(&layers).unwrap();
    let br_lan = tree.package("network").unwrap().section("br_lan").unwrap();
    assert_eq!(
        br_lan.get("ports"),
        Some(&OptionValue::List(vec![
            "lan1".to_string(),
            "bat0.10".to_string()
        ]))
    );
}

#[test]
fn test_empty_list_clears() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[
            (
                "base.yaml",
                "network:\n  devices:\n    br_lan:\n      ports: [lan1]\n",
            ),
            ("site.yaml", "network:\n  devices:\n    br_lan:\n      ports: []\n"),
        ],
    );

    let tree = load_config_tree(&layers).unwrap();
    let br_lan = tree.package("network").unwrap().section("br_lan").unwrap();
    assert_eq!(br_lan.get("ports"), Some(&OptionValue::List(vec![])));
    // An empty list emits no commands.
    assert_eq!(tree.emit_commands().len(), 1);
}

#[test]
#[serial]
fn test_env_interpolation() {
    std::env::set_var("UCIBLE_TEST_PSK", "hunter2-long");
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[(
            "base.yaml",
            "wireless:\n  interfaces:\n    wifi0:\n      ssid: Home\n      key: ${oc.env:UCIBLE_TEST_PSK}\n",
        )],
    );

    let tree = load_config_tree(&layers).unwrap();
    let wifi0 = tree.package("wireless").unwrap().section("wifi0").unwrap();
    assert_eq!(
        wifi0.get("key"),
        Some(&OptionValue::Scalar("hunter2-long".to_string()))
    );
    std::env::remove_var("UCIBLE_TEST_PSK");
}

#[test]
#[serial]
fn test_env_interpolation_default_and_missing() {
    std::env::remove_var("UCIBLE_TEST_UNSET");
    let dir = TempDir::new().unwrap();

    let layers = write_layers(
        &dir,
        &[(
            "with_default.yaml",
            "network:\n  interfaces:\n    lan:\n      ipaddr: ${oc.env:UCIBLE_TEST_UNSET,10.0.0.1}\n",
        )],
    );
    let tree = load_config_tree(&layers).unwrap();
    assert_eq!(
        tree.package("network").unwrap().section("lan").unwrap().get("ipaddr"),
        Some(&OptionValue::Scalar("10.0.0.1".to_string()))
    );

    let layers = write_layers(
        &dir,
        &[(
            "missing.yaml",
            "network:\n  interfaces:\n    lan:\n      ipaddr: ${oc.env:UCIBLE_TEST_UNSET}\n",
        )],
    );
    let err = load_config_tree(&layers).unwrap_err();
    assert!(matches!(err, Error::UnresolvedReference { .. }));
}

#[test]
fn test_cross_document_reference() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[
            (
                "base.yaml",
                "network:\n  interfaces:\n    lan:\n      ipaddr: 192.168.1.1\n",
            ),
            (
                "dhcp.yaml",
                "dhcp:\n  hosts:\n    nas:\n      ip: ${network.interfaces.lan.ipaddr}\n      mac: 'AA:BB:CC:DD:EE:FF'\n",
            ),
        ],
    );

    let tree = load_config_tree(&layers).unwrap();
    let nas = tree.package("dhcp").unwrap().section("nas").unwrap();
    assert_eq!(
        nas.get("ip"),
        Some(&OptionValue::Scalar("192.168.1.1".to_string()))
    );
}

#[test]
fn test_firewall_zones_and_forwardings() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[(
            "fw.yaml",
            "firewall:\n  zones:\n    lan:\n      input: ACCEPT\n      network: [lan]\n    wan:\n      name: wide\n      input: REJECT\n      masq: true\n  forwardings:\n    - src: lan\n      dest: wan\n",
        )],
    );

    let tree = load_config_tree(&layers).unwrap();
    let commands = tree.emit_commands();
    let strings: Vec<String> = commands.iter().map(|c| c.to_uci_string()).collect();

    // Zones are anonymous and indexed; the document key becomes the name
    // option unless one is set explicitly.
    assert!(strings.contains(&"uci set firewall.@zone[0]='zone'".to_string()));
    assert!(strings.contains(&"uci set firewall.@zone[0].name='lan'".to_string()));
    assert!(strings.contains(&"uci add_list firewall.@zone[0].network='lan'".to_string()));
    assert!(strings.contains(&"uci set firewall.@zone[1].name='wide'".to_string()));
    assert!(strings.contains(&"uci set firewall.@zone[1].masq='1'".to_string()));
    assert!(strings.contains(&"uci set firewall.@forwarding[0]='forwarding'".to_string()));
    assert!(strings.contains(&"uci set firewall.@forwarding[0].src='lan'".to_string()));
}

#[test]
fn test_remote_policy_attaches_to_package() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[(
            "base.yaml",
            "network:\n  interfaces:\n    lan:\n      proto: static\n  remote_policy:\n    whitelist:\n      - interfaces.*.gateway\n",
        )],
    );

    let tree = load_config_tree(&layers).unwrap();
    let policies = tree.policies();
    let policy = policies.get("network").unwrap();
    assert_eq!(policy.whitelist, vec!["interfaces.*.gateway".to_string()]);
}

#[test]
fn test_unknown_package_rejected() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(&dir, &[("bad.yaml", "quantum:\n  things:\n    a:\n      x: 1\n")]);
    let err = load_config_tree(&layers).unwrap_err();
    assert!(matches!(err, Error::Document(_)));
}

#[test]
fn test_unknown_group_rejected() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[("bad.yaml", "network:\n  bridges:\n    br0:\n      type: bridge\n")],
    );
    let err = load_config_tree(&layers).unwrap_err();
    match err {
        Error::Document(message) => assert!(message.contains("bridges")),
        other => panic!("expected document error, got {:?}", other),
    }
}

#[test]
fn test_single_quote_rejected() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[(
            "bad.yaml",
            "wireless:\n  interfaces:\n    wifi0:\n      ssid: \"it's broken\"\n",
        )],
    );
    let err = load_config_tree(&layers).unwrap_err();
    assert!(matches!(err, Error::Document(_)));
}

#[test]
fn test_booleans_and_integers_lower_to_uci_strings() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[(
            "sqm.yaml",
            "sqm:\n  queues:\n    wan:\n      enabled: true\n      qdisc_advanced: false\n      download: 85000\n      interface: eth1\n",
        )],
    );

    let tree = load_config_tree(&layers).unwrap();
    let commands = tree.emit_commands();
    assert!(commands.contains(&UciCommand::set("sqm.wan.enabled", "1")));
    assert!(commands.contains(&UciCommand::set("sqm.wan.qdisc_advanced", "0")));
    assert!(commands.contains(&UciCommand::set("sqm.wan.download", "85000")));
}

#[test]
fn test_document_round_trip_through_tree() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[(
            "base.yaml",
            "network:\n  devices:\n    br_lan:\n      type: bridge\n      ports: [lan1, lan2]\n  interfaces:\n    lan:\n      proto: static\n      ipaddr: 192.168.1.1\ndhcp:\n  sections:\n    lan:\n      interface: lan\n      start: 100\n",
        )],
    );

    let tree = load_config_tree(&layers).unwrap();
    let document = document_from_tree(&tree);
    let rebuilt = tree_from_document(&document).unwrap();

    assert_eq!(rebuilt.emit_commands(), tree.emit_commands());
}

#[test]
fn test_fleet_keys_rejected_in_device_documents() {
    let dir = TempDir::new().unwrap();
    let layers = write_layers(
        &dir,
        &[("fleet.yaml", "devices:\n  router:\n    target: 192.168.1.1\n")],
    );
    let err = load_config_tree(&layers).unwrap_err();
    match err {
        Error::Document(message) => assert!(message.contains("fleet inventory")),
        other => panic!("expected document error, got {:?}", other),
    }
}
