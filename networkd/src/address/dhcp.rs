use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use ipnetwork::{ipv4_mask_to_prefix, IpNetwork, Ipv4Network};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AddressError, HostnameHint, Route};
use crate::error::Result;

pub const OPTION_SUBNET_MASK: u8 = 1;
pub const OPTION_ROUTER: u8 = 3;
pub const OPTION_DOMAIN_NAME_SERVER: u8 = 6;
pub const OPTION_HOST_NAME: u8 = 12;
pub const OPTION_DOMAIN_NAME: u8 = 15;
pub const OPTION_INTERFACE_MTU: u8 = 26;

/// Source of DHCP leases.
///
/// The protocol exchange itself lives behind this trait; the engine only
/// consumes the acknowledged lease.
#[async_trait]
pub trait DhcpClient: Send + Sync {
    async fn lease(&self, interface: &str) -> Result<Ack>;
}

/// The parts of a DHCPACK the engine needs: the offered address and the raw
/// option table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub your_ip: Ipv4Addr,
    #[serde(default)]
    pub options: BTreeMap<u8, Vec<u8>>,
}

impl Ack {
    pub fn new(your_ip: Ipv4Addr) -> Self {
        Self {
            your_ip,
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, code: u8, value: impl Into<Vec<u8>>) -> Self {
        self.options.insert(code, value.into());
        self
    }

    fn option(&self, code: u8) -> Option<&[u8]> {
        self.options.get(&code).map(Vec::as_slice)
    }

    fn addresses(&self, code: u8) -> Vec<Ipv4Addr> {
        self.option(code)
            .map(|raw| {
                raw.chunks_exact(4)
                    .map(|o| Ipv4Addr::new(o[0], o[1], o[2], o[3]))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn text(&self, code: u8) -> Option<String> {
        let raw = self.option(code)?;
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\0').trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        self.addresses(OPTION_SUBNET_MASK).first().copied()
    }

    /// Prefix length from the subnet mask option, /32 when absent or not
    /// contiguous.
    pub fn prefix_len(&self) -> u8 {
        self.subnet_mask()
            .and_then(|mask| ipv4_mask_to_prefix(mask).ok())
            .unwrap_or(32)
    }

    pub fn routers(&self) -> Vec<Ipv4Addr> {
        self.addresses(OPTION_ROUTER)
    }

    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        self.addresses(OPTION_DOMAIN_NAME_SERVER)
    }

    pub fn host_name(&self) -> Option<String> {
        self.text(OPTION_HOST_NAME)
    }

    pub fn domain_name(&self) -> Option<String> {
        self.text(OPTION_DOMAIN_NAME)
    }

    pub fn mtu(&self) -> Option<u32> {
        match self.option(OPTION_INTERFACE_MTU)? {
            [hi, lo] => Some(u16::from_be_bytes([*hi, *lo]) as u32).filter(|m| *m > 0),
            _ => None,
        }
    }
}

/// DHCP addressing. Empty until a lease has been recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dhcp {
    #[serde(default)]
    ack: Option<Ack>,
}

impl Dhcp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ack(ack: Ack) -> Self {
        Self { ack: Some(ack) }
    }

    pub fn ack(&self) -> Option<&Ack> {
        self.ack.as_ref()
    }

    pub fn set_ack(&mut self, ack: Ack) {
        self.ack = Some(ack);
    }

    fn lease(&self) -> std::result::Result<&Ack, AddressError> {
        self.ack.as_ref().ok_or(AddressError::Pending)
    }

    pub fn address(&self) -> std::result::Result<IpNetwork, AddressError> {
        let ack = self.lease()?;
        if ack.your_ip.is_unspecified() {
            return Err(AddressError::Unusable(IpAddr::V4(ack.your_ip)));
        }
        Ipv4Network::new(ack.your_ip, ack.prefix_len())
            .map(IpNetwork::V4)
            .map_err(|_| AddressError::Unusable(IpAddr::V4(ack.your_ip)))
    }

    pub fn routes(&self) -> std::result::Result<Vec<Route>, AddressError> {
        let ack = self.lease()?;
        Ok(ack
            .routers()
            .first()
            .and_then(|gw| Route::default_via(IpAddr::V4(*gw)))
            .into_iter()
            .collect())
    }

    pub fn resolvers(&self) -> std::result::Result<Vec<IpAddr>, AddressError> {
        let ack = self.lease()?;
        Ok(ack.dns_servers().into_iter().map(IpAddr::V4).collect())
    }

    pub fn hostname_hint(&self) -> std::result::Result<HostnameHint, AddressError> {
        let ack = self.lease()?;
        Ok(HostnameHint {
            hostname: ack.host_name(),
            domain: ack.domain_name(),
        })
    }

    pub fn mtu(&self) -> Option<u32> {
        self.ack.as_ref().and_then(Ack::mtu)
    }

    pub async fn resolve(&mut self, interface: &str, client: &dyn DhcpClient) -> Result<()> {
        debug!("requesting DHCP lease for {}", interface);
        let ack = client.lease(interface).await?;
        if ack.your_ip.is_unspecified() {
            warn!("DHCP server offered no address on {}", interface);
        } else {
            info!(
                "leased {}/{} on {}",
                ack.your_ip,
                ack.prefix_len(),
                interface
            );
        }
        self.ack = Some(ack);
        Ok(())
    }
}
