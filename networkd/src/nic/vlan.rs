use serde::Serialize;

use crate::address::Addressing;

pub const IFLA_VLAN_ID: u16 = 1;
pub const IFLA_VLAN_PROTOCOL: u16 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
pub enum VlanProtocol {
    #[default]
    #[strum(serialize = "802.1q")]
    #[serde(rename = "802.1q")]
    Dot1Q,
    #[strum(serialize = "802.1ad")]
    #[serde(rename = "802.1ad")]
    Dot1AD,
}

impl VlanProtocol {
    /// Ethertype the kernel expects for `IFLA_VLAN_PROTOCOL`.
    pub fn ethertype(self) -> u16 {
        match self {
            VlanProtocol::Dot1Q => 0x8100,
            VlanProtocol::Dot1AD => 0x88a8,
        }
    }
}

impl From<machineconfig::VlanProtocol> for VlanProtocol {
    fn from(protocol: machineconfig::VlanProtocol) -> Self {
        match protocol {
            machineconfig::VlanProtocol::Dot1q => VlanProtocol::Dot1Q,
            machineconfig::VlanProtocol::Dot1ad => VlanProtocol::Dot1AD,
        }
    }
}

/// A tagged sub-interface of a parent link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vlan {
    pub id: u16,
    pub parent: String,
    pub protocol: VlanProtocol,
    pub addressing: Option<Addressing>,
}

impl Vlan {
    pub fn new(parent: &str, id: u16, protocol: VlanProtocol) -> Self {
        Self {
            id,
            parent: parent.to_string(),
            protocol,
            addressing: None,
        }
    }

    /// Kernel link name, `<parent>.<id>`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.parent, self.id)
    }

    /// `IFLA_INFO_DATA` attributes for creating the link.
    pub fn link_attributes(&self) -> [(u16, u16); 2] {
        [
            (IFLA_VLAN_ID, self.id),
            (IFLA_VLAN_PROTOCOL, self.protocol.ethertype()),
        ]
    }
}
