//! Typed section records for programmatic configuration.
//!
//! The document loader covers the file-driven path; this module covers the
//! API-driven one. Each record models one section type as a struct of its
//! well-known options plus an `extras` map for anything the device accepts
//! beyond them, and lowers into a [`ConfigTree`] section via `add_to`.
//!
//! ```rust
//! use ucible::uci::sections::{NetworkDevice, NetworkInterface};
//! use ucible::uci::ConfigTree;
//!
//! let mut tree = ConfigTree::new();
//! NetworkDevice::new("br_lan")
//!     .device_type("bridge")
//!     .port("lan1")
//!     .port("lan2")
//!     .add_to(&mut tree);
//! NetworkInterface::new("lan")
//!     .device("br-lan")
//!     .static_ip("192.168.1.1", "255.255.255.0")
//!     .add_to(&mut tree);
//! ```

use indexmap::IndexMap;

use super::tree::{ConfigTree, OptionValue, SectionConfig};

fn set_scalar(section: &mut SectionConfig, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        section.set(name, value.as_str());
    }
}

fn set_flag(section: &mut SectionConfig, name: &str, value: &Option<bool>) {
    if let Some(value) = value {
        section.set(name, *value);
    }
}

fn set_int(section: &mut SectionConfig, name: &str, value: &Option<i64>) {
    if let Some(value) = value {
        section.set(name, *value);
    }
}

fn set_list(section: &mut SectionConfig, name: &str, values: &[String]) {
    if !values.is_empty() {
        section.set(name, OptionValue::List(values.to_vec()));
    }
}

fn set_extras(section: &mut SectionConfig, extras: &IndexMap<String, OptionValue>) {
    for (name, value) in extras {
        section.set(name.as_str(), value.clone());
    }
}

/// A `network.<name>=device` section (bridges, VLAN devices).
#[derive(Debug, Clone, Default)]
pub struct NetworkDevice {
    name: String,
    device_name: Option<String>,
    device_type: Option<String>,
    ports: Vec<String>,
    ifname: Option<String>,
    vid: Option<i64>,
    extras: IndexMap<String, OptionValue>,
}

impl NetworkDevice {
    /// Creates a device section with the given section name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the on-device interface name (e.g. `br-lan`).
    pub fn device_name(mut self, value: impl Into<String>) -> Self {
        self.device_name = Some(value.into());
        self
    }

    /// Sets the device type (`bridge`, `8021q`, ...).
    pub fn device_type(mut self, value: impl Into<String>) -> Self {
        self.device_type = Some(value.into());
        self
    }

    /// Appends one bridge port.
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }

    /// Replaces the whole port list.
    pub fn ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the parent interface for VLAN devices.
    pub fn ifname(mut self, value: impl Into<String>) -> Self {
        self.ifname = Some(value.into());
        self
    }

    /// Sets the VLAN id.
    pub fn vid(mut self, value: i64) -> Self {
        self.vid = Some(value);
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section = tree.package_mut("network").add_section(self.name, "device");
        set_scalar(section, "name", &self.device_name);
        set_scalar(section, "type", &self.device_type);
        set_list(section, "ports", &self.ports);
        set_scalar(section, "ifname", &self.ifname);
        set_int(section, "vid", &self.vid);
        set_extras(section, &self.extras);
    }
}

/// A `network.<name>=interface` section.
#[derive(Debug, Clone, Default)]
pub struct NetworkInterface {
    name: String,
    device: Option<String>,
    proto: Option<String>,
    ipaddr: Option<String>,
    netmask: Option<String>,
    gateway: Option<String>,
    master: Option<String>,
    mtu: Option<i64>,
    extras: IndexMap<String, OptionValue>,
}

impl NetworkInterface {
    /// Creates an interface section with the given section name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the backing device.
    pub fn device(mut self, value: impl Into<String>) -> Self {
        self.device = Some(value.into());
        self
    }

    /// Sets the protocol (`static`, `dhcp`, `batadv`, ...).
    pub fn proto(mut self, value: impl Into<String>) -> Self {
        self.proto = Some(value.into());
        self
    }

    /// Sets the IP address.
    pub fn ipaddr(mut self, value: impl Into<String>) -> Self {
        self.ipaddr = Some(value.into());
        self
    }

    /// Sets the netmask.
    pub fn netmask(mut self, value: impl Into<String>) -> Self {
        self.netmask = Some(value.into());
        self
    }

    /// Sets the gateway.
    pub fn gateway(mut self, value: impl Into<String>) -> Self {
        self.gateway = Some(value.into());
        self
    }

    /// Sets the master interface (mesh hard-interfaces).
    pub fn master(mut self, value: impl Into<String>) -> Self {
        self.master = Some(value.into());
        self
    }

    /// Sets the MTU.
    pub fn mtu(mut self, value: i64) -> Self {
        self.mtu = Some(value);
        self
    }

    /// Static addressing in one step.
    pub fn static_ip(mut self, ipaddr: impl Into<String>, netmask: impl Into<String>) -> Self {
        self.proto = Some("static".to_string());
        self.ipaddr = Some(ipaddr.into());
        self.netmask = Some(netmask.into());
        self
    }

    /// DHCP addressing in one step.
    pub fn dhcp(mut self) -> Self {
        self.proto = Some("dhcp".to_string());
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section = tree
            .package_mut("network")
            .add_section(self.name, "interface");
        set_scalar(section, "device", &self.device);
        set_scalar(section, "proto", &self.proto);
        set_scalar(section, "ipaddr", &self.ipaddr);
        set_scalar(section, "netmask", &self.netmask);
        set_scalar(section, "gateway", &self.gateway);
        set_scalar(section, "master", &self.master);
        set_int(section, "mtu", &self.mtu);
        set_extras(section, &self.extras);
    }
}

/// A `wireless.<name>=wifi-device` section (a radio).
#[derive(Debug, Clone, Default)]
pub struct WirelessRadio {
    name: String,
    radio_type: Option<String>,
    path: Option<String>,
    band: Option<String>,
    channel: Option<i64>,
    htmode: Option<String>,
    country: Option<String>,
    disabled: Option<bool>,
    extras: IndexMap<String, OptionValue>,
}

impl WirelessRadio {
    /// Creates a radio section with the given section name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the driver type (`mac80211`).
    pub fn radio_type(mut self, value: impl Into<String>) -> Self {
        self.radio_type = Some(value.into());
        self
    }

    /// Sets the device path.
    pub fn path(mut self, value: impl Into<String>) -> Self {
        self.path = Some(value.into());
        self
    }

    /// Sets the band (`2g`, `5g`, `6g`).
    pub fn band(mut self, value: impl Into<String>) -> Self {
        self.band = Some(value.into());
        self
    }

    /// Sets the channel.
    pub fn channel(mut self, value: i64) -> Self {
        self.channel = Some(value);
        self
    }

    /// Sets the HT/VHT/HE mode.
    pub fn htmode(mut self, value: impl Into<String>) -> Self {
        self.htmode = Some(value.into());
        self
    }

    /// Sets the regulatory country code.
    pub fn country(mut self, value: impl Into<String>) -> Self {
        self.country = Some(value.into());
        self
    }

    /// Enables or disables the radio.
    pub fn disabled(mut self, value: bool) -> Self {
        self.disabled = Some(value);
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section = tree
            .package_mut("wireless")
            .add_section(self.name, "wifi-device");
        set_scalar(section, "type", &self.radio_type);
        set_scalar(section, "path", &self.path);
        set_scalar(section, "band", &self.band);
        set_int(section, "channel", &self.channel);
        set_scalar(section, "htmode", &self.htmode);
        set_scalar(section, "country", &self.country);
        set_flag(section, "disabled", &self.disabled);
        set_extras(section, &self.extras);
    }
}

/// A `wireless.<name>=wifi-iface` section (an SSID on a radio).
#[derive(Debug, Clone, Default)]
pub struct WirelessInterface {
    name: String,
    device: Option<String>,
    mode: Option<String>,
    network: Option<String>,
    ssid: Option<String>,
    encryption: Option<String>,
    key: Option<String>,
    hidden: Option<bool>,
    disabled: Option<bool>,
    extras: IndexMap<String, OptionValue>,
}

impl WirelessInterface {
    /// Creates a wifi-iface section with the given section name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the radio this interface runs on.
    pub fn device(mut self, value: impl Into<String>) -> Self {
        self.device = Some(value.into());
        self
    }

    /// Sets the mode (`ap`, `sta`, `mesh`).
    pub fn mode(mut self, value: impl Into<String>) -> Self {
        self.mode = Some(value.into());
        self
    }

    /// Sets the attached network interface.
    pub fn network(mut self, value: impl Into<String>) -> Self {
        self.network = Some(value.into());
        self
    }

    /// Sets the SSID.
    pub fn ssid(mut self, value: impl Into<String>) -> Self {
        self.ssid = Some(value.into());
        self
    }

    /// Sets the encryption scheme (`psk2`, `sae`, ...).
    pub fn encryption(mut self, value: impl Into<String>) -> Self {
        self.encryption = Some(value.into());
        self
    }

    /// Sets the pre-shared key. Stored verbatim; rendering masks it.
    pub fn key(mut self, value: impl Into<String>) -> Self {
        self.key = Some(value.into());
        self
    }

    /// Hides the SSID from beacons.
    pub fn hidden(mut self, value: bool) -> Self {
        self.hidden = Some(value);
        self
    }

    /// Enables or disables the interface.
    pub fn disabled(mut self, value: bool) -> Self {
        self.disabled = Some(value);
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section = tree
            .package_mut("wireless")
            .add_section(self.name, "wifi-iface");
        set_scalar(section, "device", &self.device);
        set_scalar(section, "mode", &self.mode);
        set_scalar(section, "network", &self.network);
        set_scalar(section, "ssid", &self.ssid);
        set_scalar(section, "encryption", &self.encryption);
        set_scalar(section, "key", &self.key);
        set_flag(section, "hidden", &self.hidden);
        set_flag(section, "disabled", &self.disabled);
        set_extras(section, &self.extras);
    }
}

/// A `dhcp.<name>=dhcp` section (an address pool).
#[derive(Debug, Clone, Default)]
pub struct DhcpPool {
    name: String,
    interface: Option<String>,
    start: Option<i64>,
    limit: Option<i64>,
    leasetime: Option<String>,
    ignore: Option<bool>,
    extras: IndexMap<String, OptionValue>,
}

impl DhcpPool {
    /// Creates a pool section with the given section name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the served interface.
    pub fn interface(mut self, value: impl Into<String>) -> Self {
        self.interface = Some(value.into());
        self
    }

    /// Address range and lease time in one step.
    pub fn range(mut self, start: i64, limit: i64, leasetime: impl Into<String>) -> Self {
        self.start = Some(start);
        self.limit = Some(limit);
        self.leasetime = Some(leasetime.into());
        self
    }

    /// Disables serving on this interface.
    pub fn ignore(mut self, value: bool) -> Self {
        self.ignore = Some(value);
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section = tree.package_mut("dhcp").add_section(self.name, "dhcp");
        set_scalar(section, "interface", &self.interface);
        set_int(section, "start", &self.start);
        set_int(section, "limit", &self.limit);
        set_scalar(section, "leasetime", &self.leasetime);
        set_flag(section, "ignore", &self.ignore);
        set_extras(section, &self.extras);
    }
}

/// A `dhcp.<name>=host` section (a static lease).
#[derive(Debug, Clone, Default)]
pub struct DhcpHost {
    name: String,
    mac: Option<String>,
    ip: Option<String>,
    hostname: Option<String>,
    extras: IndexMap<String, OptionValue>,
}

impl DhcpHost {
    /// Creates a host section with the given section name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the MAC address.
    pub fn mac(mut self, value: impl Into<String>) -> Self {
        self.mac = Some(value.into());
        self
    }

    /// Sets the leased IP.
    pub fn ip(mut self, value: impl Into<String>) -> Self {
        self.ip = Some(value.into());
        self
    }

    /// Sets the published hostname.
    pub fn hostname(mut self, value: impl Into<String>) -> Self {
        self.hostname = Some(value.into());
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section = tree.package_mut("dhcp").add_section(self.name, "host");
        set_scalar(section, "mac", &self.mac);
        set_scalar(section, "ip", &self.ip);
        set_scalar(section, "name", &self.hostname);
        set_extras(section, &self.extras);
    }
}

/// A `firewall.@zone[i]=zone` section.
#[derive(Debug, Clone, Default)]
pub struct FirewallZone {
    index: usize,
    name: Option<String>,
    input: Option<String>,
    output: Option<String>,
    forward: Option<String>,
    masq: Option<bool>,
    mtu_fix: Option<bool>,
    networks: Vec<String>,
    extras: IndexMap<String, OptionValue>,
}

impl FirewallZone {
    /// Creates a zone at the given anonymous index.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Sets the zone name.
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = Some(value.into());
        self
    }

    /// Sets the input policy (`ACCEPT`, `REJECT`, `DROP`).
    pub fn input(mut self, value: impl Into<String>) -> Self {
        self.input = Some(value.into());
        self
    }

    /// Sets the output policy.
    pub fn output(mut self, value: impl Into<String>) -> Self {
        self.output = Some(value.into());
        self
    }

    /// Sets the forward policy.
    pub fn forward(mut self, value: impl Into<String>) -> Self {
        self.forward = Some(value.into());
        self
    }

    /// Enables or disables masquerading.
    pub fn masq(mut self, value: bool) -> Self {
        self.masq = Some(value);
        self
    }

    /// Enables or disables the MTU fix.
    pub fn mtu_fix(mut self, value: bool) -> Self {
        self.mtu_fix = Some(value);
        self
    }

    /// Adds a covered network.
    pub fn network(mut self, value: impl Into<String>) -> Self {
        self.networks.push(value.into());
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section_name = format!("@zone[{}]", self.index);
        let section = tree
            .package_mut("firewall")
            .add_section(section_name, "zone");
        set_scalar(section, "name", &self.name);
        set_scalar(section, "input", &self.input);
        set_scalar(section, "output", &self.output);
        set_scalar(section, "forward", &self.forward);
        set_flag(section, "masq", &self.masq);
        set_flag(section, "mtu_fix", &self.mtu_fix);
        set_list(section, "network", &self.networks);
        set_extras(section, &self.extras);
    }
}

/// A `firewall.@forwarding[i]=forwarding` section.
#[derive(Debug, Clone, Default)]
pub struct FirewallForwarding {
    index: usize,
    src: Option<String>,
    dest: Option<String>,
}

impl FirewallForwarding {
    /// Creates a forwarding rule at the given anonymous index.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Sets the source zone.
    pub fn src(mut self, value: impl Into<String>) -> Self {
        self.src = Some(value.into());
        self
    }

    /// Sets the destination zone.
    pub fn dest(mut self, value: impl Into<String>) -> Self {
        self.dest = Some(value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section_name = format!("@forwarding[{}]", self.index);
        let section = tree
            .package_mut("firewall")
            .add_section(section_name, "forwarding");
        set_scalar(section, "src", &self.src);
        set_scalar(section, "dest", &self.dest);
    }
}

/// An `sqm.<name>=queue` section (smart queue management).
#[derive(Debug, Clone, Default)]
pub struct SqmQueue {
    name: String,
    enabled: Option<bool>,
    interface: Option<String>,
    download: Option<i64>,
    upload: Option<i64>,
    qdisc: Option<String>,
    script: Option<String>,
    linklayer: Option<String>,
    overhead: Option<i64>,
    extras: IndexMap<String, OptionValue>,
}

impl SqmQueue {
    /// Creates a queue section with the given section name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Enables or disables the queue.
    pub fn enabled(mut self, value: bool) -> Self {
        self.enabled = Some(value);
        self
    }

    /// Sets the shaped interface.
    pub fn interface(mut self, value: impl Into<String>) -> Self {
        self.interface = Some(value.into());
        self
    }

    /// Sets download and upload rates in kbit/s.
    pub fn speeds(mut self, download: i64, upload: i64) -> Self {
        self.download = Some(download);
        self.upload = Some(upload);
        self
    }

    /// CAKE shaping in one step.
    pub fn cake(mut self, download: i64, upload: i64) -> Self {
        self.qdisc = Some("cake".to_string());
        self.script = Some("piece_of_cake.qos".to_string());
        self.download = Some(download);
        self.upload = Some(upload);
        self
    }

    /// fq_codel shaping in one step.
    pub fn fq_codel(mut self, download: i64, upload: i64) -> Self {
        self.qdisc = Some("fq_codel".to_string());
        self.script = Some("simple.qos".to_string());
        self.download = Some(download);
        self.upload = Some(upload);
        self
    }

    /// Link-layer adaptation.
    pub fn link_layer(mut self, linklayer: impl Into<String>, overhead: i64) -> Self {
        self.linklayer = Some(linklayer.into());
        self.overhead = Some(overhead);
        self
    }

    /// Sets an option outside the well-known set.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Lowers this record into the tree.
    pub fn add_to(self, tree: &mut ConfigTree) {
        let section = tree.package_mut("sqm").add_section(self.name, "queue");
        set_flag(section, "enabled", &self.enabled);
        set_scalar(section, "interface", &self.interface);
        set_int(section, "download", &self.download);
        set_int(section, "upload", &self.upload);
        set_scalar(section, "qdisc", &self.qdisc);
        set_scalar(section, "script", &self.script);
        set_scalar(section, "linklayer", &self.linklayer);
        set_int(section, "overhead", &self.overhead);
        set_extras(section, &self.extras);
    }
}
