//! Addressing strategies for an interface or VLAN.
//!
//! An interface is either configured statically or through DHCP. Both report
//! the same facts (address, routes, resolvers, hostname hint, MTU); a DHCP
//! method reports [`AddressError::Pending`] until a lease has been recorded.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;

pub mod dhcp;
pub mod static_addr;

pub use dhcp::{Ack, Dhcp, DhcpClient};
pub use static_addr::Static;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address not yet available")]
    Pending,

    #[error("lease offered an unusable address {0}")]
    Unusable(IpAddr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: IpNetwork,
    pub gateway: IpAddr,
}

impl Route {
    /// Default route through `gateway`, in the gateway's address family.
    pub fn default_via(gateway: IpAddr) -> Option<Self> {
        let unspecified = match gateway {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        IpNetwork::new(unspecified, 0)
            .ok()
            .map(|destination| Route {
                destination,
                gateway,
            })
    }
}

/// Naming facts an addressing method can contribute to the hostname decision.
///
/// `hostname` may itself be fully qualified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameHint {
    pub hostname: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Addressing {
    Static(Static),
    Dhcp(Dhcp),
}

impl Addressing {
    pub fn address(&self) -> std::result::Result<IpNetwork, AddressError> {
        match self {
            Addressing::Static(s) => Ok(s.cidr()),
            Addressing::Dhcp(d) => d.address(),
        }
    }

    pub fn routes(&self) -> std::result::Result<Vec<Route>, AddressError> {
        match self {
            Addressing::Static(s) => Ok(s.routes().to_vec()),
            Addressing::Dhcp(d) => d.routes(),
        }
    }

    pub fn resolvers(&self) -> std::result::Result<Vec<IpAddr>, AddressError> {
        match self {
            Addressing::Static(s) => Ok(s.nameservers().to_vec()),
            Addressing::Dhcp(d) => d.resolvers(),
        }
    }

    pub fn hostname_hint(&self) -> std::result::Result<HostnameHint, AddressError> {
        match self {
            Addressing::Static(s) => Ok(s.hostname_hint()),
            Addressing::Dhcp(d) => d.hostname_hint(),
        }
    }

    pub fn mtu(&self) -> Option<u32> {
        match self {
            Addressing::Static(s) => s.mtu(),
            Addressing::Dhcp(d) => d.mtu(),
        }
    }

    /// Whether the method currently yields a usable address.
    pub fn is_resolved(&self) -> bool {
        self.address().is_ok()
    }

    /// Acquire whatever the method needs from the outside world.
    ///
    /// Static addressing is a pure function of its configuration and returns
    /// immediately.
    pub async fn resolve(&mut self, interface: &str, client: &dyn DhcpClient) -> Result<()> {
        match self {
            Addressing::Static(_) => Ok(()),
            Addressing::Dhcp(d) => d.resolve(interface, client).await,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Addressing::Static(_) => "static",
            Addressing::Dhcp(_) => "dhcp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pending_dhcp_is_not_resolved() {
        let method = Addressing::Dhcp(Dhcp::new());
        assert!(!method.is_resolved());
        assert_matches!(method.address(), Err(AddressError::Pending));
        assert_matches!(method.resolvers(), Err(AddressError::Pending));
        assert_matches!(method.hostname_hint(), Err(AddressError::Pending));
    }

    #[test]
    fn static_is_always_resolved() {
        let method = Addressing::Static(Static::new("eth0", "10.0.0.2/8").unwrap());
        assert!(method.is_resolved());
        assert_eq!(method.address().unwrap().to_string(), "10.0.0.2/8");
        assert_eq!(method.method_name(), "static");
    }

    #[test]
    fn default_route_follows_gateway_family() {
        let v4 = Route::default_via("10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(v4.destination.to_string(), "0.0.0.0/0");

        let v6 = Route::default_via("fe80::1".parse().unwrap()).unwrap();
        assert_eq!(v6.destination.to_string(), "::/0");
    }
}
