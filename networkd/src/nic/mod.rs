use serde::Serialize;
use tracing::{debug, warn};

use crate::address::{Addressing, DhcpClient};
use crate::error::{Error, Result};

pub mod bond;
pub mod vlan;

pub use bond::BondOptions;
pub use vlan::{Vlan, VlanProtocol};

/// Resolved description of one managed link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    name: String,
    ignore: bool,
    bonded: bool,
    sub_interfaces: Vec<String>,
    addressing: Option<Addressing>,
    bond: Option<BondOptions>,
    vlans: Vec<Vlan>,
    mtu: Option<u32>,
    loopback: bool,
}

impl NetworkInterface {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ignore: false,
            bonded: false,
            sub_interfaces: Vec::new(),
            addressing: None,
            bond: None,
            vlans: Vec::new(),
            mtu: None,
            loopback: false,
        }
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.ignore = ignore;
    }

    pub fn set_addressing(&mut self, addressing: Addressing) {
        self.addressing = Some(addressing);
    }

    /// Zero leaves the link MTU untouched.
    pub fn set_mtu(&mut self, mtu: u32) {
        self.mtu = (mtu > 0).then_some(mtu);
    }

    pub fn set_loopback(&mut self, loopback: bool) {
        self.loopback = loopback;
    }

    pub fn set_bond(&mut self, bond: BondOptions) {
        self.bonded = true;
        self.sub_interfaces = bond.sub_interfaces.clone();
        self.bond = Some(bond);
    }

    pub fn add_vlan(&mut self, id: u16, protocol: VlanProtocol) -> Result<()> {
        if self.vlans.iter().any(|v| v.id == id) {
            return Err(Error::DuplicateVlan {
                interface: self.name.clone(),
                id,
            });
        }

        debug!("{}: adding vlan {} ({})", self.name, id, protocol);
        self.vlans.push(Vlan::new(&self.name, id, protocol));
        Ok(())
    }

    pub fn set_vlan_addressing(&mut self, id: u16, addressing: Addressing) -> Result<()> {
        let interface = self.name.clone();
        let vlan = self
            .vlans
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| Error::VlanNotFound {
                interface: interface.clone(),
                id,
            })?;

        if vlan.addressing.is_some() {
            return Err(Error::VlanAddressingSet { interface, id });
        }

        vlan.addressing = Some(addressing);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ignore(&self) -> bool {
        self.ignore
    }

    pub fn bonded(&self) -> bool {
        self.bonded
    }

    pub fn sub_interfaces(&self) -> &[String] {
        &self.sub_interfaces
    }

    pub fn addressing(&self) -> Option<&Addressing> {
        self.addressing.as_ref()
    }

    pub fn bond(&self) -> Option<&BondOptions> {
        self.bond.as_ref()
    }

    pub fn vlans(&self) -> &[Vlan] {
        &self.vlans
    }

    /// Explicit link MTU, falling back to what the addressing method reports.
    pub fn mtu(&self) -> Option<u32> {
        self.mtu
            .or_else(|| self.addressing.as_ref().and_then(Addressing::mtu))
    }

    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    /// The link's own method first, then each VLAN's in declaration order.
    pub fn addressing_methods(&self) -> impl Iterator<Item = &Addressing> {
        self.addressing
            .iter()
            .chain(self.vlans.iter().filter_map(|v| v.addressing.as_ref()))
    }

    /// Resolve the link's method and every VLAN method.
    ///
    /// Each method is attempted even when an earlier one failed; the first
    /// failure is returned once all have been tried.
    pub async fn resolve(&mut self, client: &dyn DhcpClient) -> Result<()> {
        let mut first_error = None;

        if let Some(addressing) = self.addressing.as_mut() {
            if let Err(e) = addressing.resolve(&self.name, client).await {
                warn!("{}: {}", self.name, e);
                first_error.get_or_insert(e);
            }
        }

        for vlan in self.vlans.iter_mut() {
            let name = vlan.name();
            if let Some(addressing) = vlan.addressing.as_mut() {
                if let Err(e) = addressing.resolve(&name, client).await {
                    warn!("{}: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Dhcp, Static};
    use assert_matches::assert_matches;

    #[test]
    fn duplicate_vlan_leaves_first_untouched() {
        let mut iface = NetworkInterface::new("eth0");
        iface.add_vlan(100, VlanProtocol::Dot1Q).unwrap();
        iface
            .set_vlan_addressing(100, Addressing::Dhcp(Dhcp::new()))
            .unwrap();

        assert_matches!(
            iface.add_vlan(100, VlanProtocol::Dot1AD),
            Err(Error::DuplicateVlan { id: 100, .. })
        );
        assert_eq!(iface.vlans().len(), 1);
        assert_eq!(iface.vlans()[0].protocol, VlanProtocol::Dot1Q);
        assert!(iface.vlans()[0].addressing.is_some());
    }

    #[test]
    fn vlan_addressing_needs_known_id() {
        let mut iface = NetworkInterface::new("eth0");
        assert_matches!(
            iface.set_vlan_addressing(7, Addressing::Dhcp(Dhcp::new())),
            Err(Error::VlanNotFound { id: 7, .. })
        );
    }

    #[test]
    fn vlan_addressing_is_set_once() {
        let mut iface = NetworkInterface::new("eth0");
        iface.add_vlan(7, VlanProtocol::default()).unwrap();
        iface
            .set_vlan_addressing(7, Addressing::Dhcp(Dhcp::new()))
            .unwrap();
        assert_matches!(
            iface.set_vlan_addressing(7, Addressing::Dhcp(Dhcp::new())),
            Err(Error::VlanAddressingSet { id: 7, .. })
        );
    }

    #[test]
    fn methods_list_link_before_vlans() {
        let mut iface = NetworkInterface::new("eth0");
        iface.add_vlan(10, VlanProtocol::default()).unwrap();
        iface.add_vlan(20, VlanProtocol::default()).unwrap();
        iface
            .set_vlan_addressing(
                20,
                Addressing::Static(Static::new("eth0.20", "10.20.0.2/24").unwrap()),
            )
            .unwrap();
        iface.set_addressing(Addressing::Dhcp(Dhcp::new()));

        let methods: Vec<_> = iface.addressing_methods().map(Addressing::method_name).collect();
        assert_eq!(methods, vec!["dhcp", "static"]);
    }

    #[test]
    fn zero_mtu_is_unset() {
        let mut iface = NetworkInterface::new("eth0");
        iface.set_mtu(0);
        assert_eq!(iface.mtu(), None);
        iface.set_mtu(9000);
        assert_eq!(iface.mtu(), Some(9000));
    }
}
