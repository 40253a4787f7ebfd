//! Declarative machine network configuration.
//!
//! The document is normally written in KDL and decoded with `knus`:
//!
//! ```kdl
//! network {
//!     hostname "node01.example.org"
//!     nameserver "9.9.9.9"
//!
//!     interface "eth0" {
//!         cidr "192.168.1.200/24"
//!         route network="0.0.0.0/0" gateway="192.168.1.1"
//!         vlan 100 {
//!             dhcp
//!         }
//!     }
//! }
//! ```
//!
//! YAML and JSON renditions of the same structure are accepted as well, the
//! format is picked from the file extension.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Knus(#[from] knus::Error),

    #[error("failed to parse YAML machine config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON machine config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read machine config from {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("unsupported machine config format {0:?}, expected kdl, yaml, yml or json")]
    UnsupportedFormat(String),
}

pub fn parse_config(path: &str, content: &str) -> Result<MachineConfig, Error> {
    Ok(knus::parse(path, content)?)
}

pub fn parse_yaml(content: &str) -> Result<MachineConfig, Error> {
    Ok(serde_yaml::from_str(content)?)
}

pub fn parse_json(content: &str) -> Result<MachineConfig, Error> {
    Ok(serde_json::from_str(content)?)
}

/// Read a machine config file, choosing the decoder from its extension.
pub fn load_file(path: &Path) -> Result<MachineConfig, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    match extension.as_str() {
        "kdl" => parse_config(&path.display().to_string(), &content),
        "yaml" | "yml" => parse_yaml(&content),
        "json" => parse_json(&content),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, knus::Decode, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    #[knus(child, default)]
    pub network: NetworkConfig,
}

impl MachineConfig {
    /// The configured machine hostname, if any. Empty strings count as unset.
    pub fn hostname(&self) -> Option<&str> {
        self.network
            .hostname
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    pub fn nameservers(&self) -> &[String] {
        &self.network.nameservers
    }

    pub fn devices(&self) -> &[Device] {
        &self.network.interfaces
    }

    pub fn set_hostname(&mut self, hostname: &str) {
        self.network.hostname = Some(hostname.to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq, knus::Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetworkConfig {
    #[knus(child, unwrap(argument))]
    pub hostname: Option<String>,

    #[knus(children(name = "nameserver"), unwrap(argument))]
    pub nameservers: Vec<String>,

    #[knus(children(name = "interface"))]
    pub interfaces: Vec<Device>,
}

/// A single interface entry of the machine config.
#[derive(Debug, Clone, Default, PartialEq, knus::Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Device {
    #[knus(argument)]
    pub interface: String,

    #[knus(child, unwrap(argument))]
    pub cidr: Option<String>,

    #[knus(child, unwrap(argument))]
    pub mtu: Option<u32>,

    #[knus(child)]
    pub ignore: bool,

    #[knus(children(name = "route"))]
    pub routes: Vec<Route>,

    #[knus(child)]
    pub bond: Option<Bond>,

    #[knus(children(name = "vlan"))]
    pub vlans: Vec<Vlan>,
}

#[derive(Debug, Clone, Default, PartialEq, knus::Decode, Serialize, Deserialize)]
pub struct Route {
    #[knus(property)]
    pub network: String,

    #[knus(property)]
    pub gateway: String,
}

/// Bonding block of an interface entry.
///
/// Every tunable is optional; leaving one out keeps the bonding driver
/// default.
#[derive(Debug, Clone, Default, PartialEq, knus::Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Bond {
    #[knus(child, unwrap(arguments), default)]
    pub interfaces: Vec<String>,

    #[knus(child, unwrap(arguments), default)]
    pub arp_ip_target: Vec<String>,

    #[knus(child, unwrap(argument))]
    pub mode: Option<String>,

    #[knus(child, unwrap(argument))]
    pub hash_policy: Option<String>,

    #[knus(child, unwrap(argument))]
    pub lacp_rate: Option<String>,

    #[knus(child, unwrap(argument))]
    pub ad_actor_system: Option<String>,

    #[knus(child, unwrap(argument))]
    pub arp_validate: Option<String>,

    #[knus(child, unwrap(argument))]
    pub arp_all_targets: Option<String>,

    #[knus(child, unwrap(argument))]
    pub primary: Option<String>,

    #[knus(child, unwrap(argument))]
    pub primary_reselect: Option<String>,

    #[knus(child, unwrap(argument))]
    pub fail_over_mac: Option<String>,

    #[knus(child, unwrap(argument))]
    pub ad_select: Option<String>,

    #[knus(child, unwrap(argument))]
    pub miimon: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub updelay: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub downdelay: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub arp_interval: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub resend_igmp: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub min_links: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub lp_interval: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub packets_per_slave: Option<u32>,

    #[knus(child, unwrap(argument))]
    pub num_peer_notif: Option<u8>,

    #[knus(child, unwrap(argument))]
    pub tlb_dynamic_lb: Option<u8>,

    #[knus(child, unwrap(argument))]
    pub all_slaves_active: Option<u8>,

    #[knus(child, unwrap(argument))]
    pub use_carrier: Option<bool>,

    #[knus(child, unwrap(argument))]
    pub ad_actor_sys_prio: Option<u16>,

    #[knus(child, unwrap(argument))]
    pub ad_user_port_key: Option<u16>,

    #[knus(child, unwrap(argument))]
    pub peer_notify_delay: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, knus::Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Vlan {
    #[knus(argument)]
    pub id: u16,

    #[knus(property)]
    pub protocol: Option<VlanProtocol>,

    #[knus(child, unwrap(argument))]
    pub cidr: Option<String>,

    #[knus(child)]
    pub dhcp: bool,

    #[knus(children(name = "route"))]
    pub routes: Vec<Route>,
}

#[derive(
    knus::DecodeScalar,
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VlanProtocol {
    #[default]
    Dot1q,
    Dot1ad,
}
