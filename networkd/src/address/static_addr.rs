use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::{HostnameHint, Route};
use crate::error::{Error, Result};

/// Parse an `ADDRESS/PREFIX` string. A bare address is rejected.
pub fn parse_cidr(interface: &str, cidr: &str) -> Result<IpNetwork> {
    let invalid = |reason: String| Error::InvalidCidr {
        interface: interface.to_string(),
        cidr: cidr.to_string(),
        reason,
    };

    if !cidr.contains('/') {
        return Err(invalid("missing prefix length".to_string()));
    }

    cidr.trim().parse().map_err(|e| invalid(format!("{e}")))
}

/// Statically configured addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Static {
    cidr: IpNetwork,
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    mtu: Option<u32>,
    #[serde(default)]
    fqdn: Option<String>,
    #[serde(default)]
    nameservers: Vec<IpAddr>,
}

impl Static {
    pub fn new(interface: &str, cidr: &str) -> Result<Self> {
        parse_cidr(interface, cidr).map(Self::from_network)
    }

    pub fn from_network(cidr: IpNetwork) -> Self {
        Self {
            cidr,
            routes: Vec::new(),
            mtu: None,
            fqdn: None,
            nameservers: Vec::new(),
        }
    }

    pub fn with_routes(mut self, routes: Vec<Route>) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_mtu(mut self, mtu: Option<u32>) -> Self {
        self.mtu = mtu.filter(|m| *m > 0);
        self
    }

    pub fn with_fqdn(mut self, fqdn: Option<String>) -> Self {
        self.fqdn = fqdn.filter(|f| !f.is_empty());
        self
    }

    pub fn with_nameservers(mut self, nameservers: Vec<IpAddr>) -> Self {
        self.nameservers = nameservers;
        self
    }

    pub fn cidr(&self) -> IpNetwork {
        self.cidr
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    pub fn fqdn(&self) -> Option<&str> {
        self.fqdn.as_deref()
    }

    pub fn nameservers(&self) -> &[IpAddr] {
        &self.nameservers
    }

    pub fn hostname_hint(&self) -> HostnameHint {
        HostnameHint {
            hostname: self.fqdn.clone(),
            domain: None,
        }
    }
}
