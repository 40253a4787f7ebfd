use miette::Diagnostic;
use thiserror::Error;

use crate::address::AddressError;
use crate::hostname::HostnameError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("bond configuration for {interface} is invalid: {reason}")]
    #[diagnostic(code(networkd::bond))]
    Bond { interface: String, reason: String },

    #[error("duplicate VLAN id {id} on {interface}")]
    DuplicateVlan { interface: String, id: u16 },

    #[error("VLAN id not found: {id} on {interface}")]
    VlanNotFound { interface: String, id: u16 },

    #[error("addressing for VLAN {id} on {interface} is already set")]
    VlanAddressingSet { interface: String, id: u16 },

    #[error("invalid CIDR {cidr:?} on {interface}: {reason}")]
    #[diagnostic(help("addresses are written as ADDRESS/PREFIX, e.g. 192.168.1.10/24"))]
    InvalidCidr {
        interface: String,
        cidr: String,
        reason: String,
    },

    #[error("invalid route {route:?} on {interface}: {reason}")]
    InvalidRoute {
        interface: String,
        route: String,
        reason: String,
    },

    #[error("invalid ip= kernel parameter, field {field}: {reason}")]
    #[diagnostic(help(
        "expected client-ip:server-ip:gw-ip:netmask:hostname:device:autoconf:dns0:dns1"
    ))]
    InvalidCmdline { field: usize, reason: String },

    #[error("no interface available for the ip= kernel parameter")]
    NoKernelInterface,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Hostname(#[from] HostnameError),

    #[error("link {name}: {reason}")]
    Link { name: String, reason: String },

    #[error("DHCP on {interface} failed: {reason}")]
    Dhcp { interface: String, reason: String },

    #[error("interface configuration was cancelled")]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    MachineConfig(#[from] machineconfig::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Settings(#[from] config::ConfigError),
}
