//! Hostname and domain decision.

use std::net::IpAddr;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::address::Addressing;
use crate::nic::NetworkInterface;

pub const MAX_HOSTNAME_LEN: usize = 63;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum HostnameError {
    #[error("hostname {hostname:?} is {len} characters long, the maximum is 63")]
    TooLong { hostname: String, len: usize },

    #[error("no usable address yet")]
    NoUsableAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub domain: String,
    pub address: IpAddr,
}

impl HostIdentity {
    pub fn fqdn(&self) -> String {
        if self.domain.is_empty() {
            self.hostname.clone()
        } else {
            format!("{}.{}", self.hostname, self.domain)
        }
    }
}

/// `talos-` followed by the address with its separators turned into dashes.
pub fn default_hostname(address: IpAddr) -> String {
    format!("talos-{}", address.to_string().replace(['.', ':'], "-"))
}

/// Pick the identity from the first candidate with a usable address.
///
/// A configured machine hostname beats whatever the addressing method hints.
/// Ignored and loopback interfaces are never candidates.
pub fn decide_hostname<'a>(
    configured: Option<&str>,
    candidates: impl IntoIterator<Item = &'a NetworkInterface>,
) -> Result<HostIdentity, HostnameError> {
    for iface in candidates {
        if iface.ignore() || iface.is_loopback() {
            continue;
        }

        for method in iface.addressing_methods() {
            if let Ok(network) = method.address() {
                debug!("deciding hostname from {} ({})", iface.name(), network);
                return identity(configured, method, network.ip());
            }
        }
    }

    Err(HostnameError::NoUsableAddress)
}

fn identity(
    configured: Option<&str>,
    method: &Addressing,
    address: IpAddr,
) -> Result<HostIdentity, HostnameError> {
    let fqdn = match configured.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hostname) => hostname.to_string(),
        None => {
            let hint = method.hostname_hint().unwrap_or_default();
            let hostname = hint
                .hostname
                .unwrap_or_else(|| default_hostname(address));
            match hint.domain.filter(|d| !d.is_empty()) {
                Some(domain) => format!("{hostname}.{domain}"),
                None => hostname,
            }
        }
    };

    let (hostname, domain) = match fqdn.split_once('.') {
        Some((hostname, domain)) => (hostname.to_string(), domain.to_string()),
        None => (fqdn, String::new()),
    };

    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(HostnameError::TooLong {
            len: hostname.len(),
            hostname,
        });
    }

    Ok(HostIdentity {
        hostname,
        domain,
        address,
    })
}
