//! Bond option builder.
//!
//! Tunables arrive as strings and numbers from the machine config, are parsed
//! into their kernel enumerations here, and are finally rendered as
//! `IFLA_BOND_*` attribute id/value pairs for whatever programs the link.

use std::str::FromStr;

use serde::Serialize;
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
pub enum BondMode {
    #[strum(serialize = "balance-rr")]
    #[serde(rename = "balance-rr")]
    BalanceRr = 0,
    #[strum(serialize = "active-backup")]
    #[serde(rename = "active-backup")]
    ActiveBackup = 1,
    #[strum(serialize = "balance-xor")]
    #[serde(rename = "balance-xor")]
    BalanceXor = 2,
    #[strum(serialize = "broadcast")]
    #[serde(rename = "broadcast")]
    Broadcast = 3,
    #[strum(serialize = "802.3ad")]
    #[serde(rename = "802.3ad")]
    Lacp = 4,
    #[strum(serialize = "balance-tlb")]
    #[serde(rename = "balance-tlb")]
    BalanceTlb = 5,
    #[strum(serialize = "balance-alb")]
    #[serde(rename = "balance-alb")]
    BalanceAlb = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
pub enum HashPolicy {
    #[strum(serialize = "layer2")]
    #[serde(rename = "layer2")]
    Layer2 = 0,
    #[strum(serialize = "layer3+4")]
    #[serde(rename = "layer3+4")]
    Layer34 = 1,
    #[strum(serialize = "layer2+3")]
    #[serde(rename = "layer2+3")]
    Layer23 = 2,
    #[strum(serialize = "encap2+3")]
    #[serde(rename = "encap2+3")]
    Encap23 = 3,
    #[strum(serialize = "encap3+4")]
    #[serde(rename = "encap3+4")]
    Encap34 = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LacpRate {
    Slow = 0,
    Fast = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArpValidate {
    None = 0,
    Active = 1,
    Backup = 2,
    All = 3,
    Filter = 4,
    FilterActive = 5,
    FilterBackup = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArpAllTargets {
    Any = 0,
    All = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PrimaryReselect {
    Always = 0,
    Better = 1,
    Failure = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FailOverMac {
    None = 0,
    Active = 1,
    Follow = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AdSelect {
    Stable = 0,
    Bandwidth = 1,
    Count = 2,
}

/// `IFLA_BOND_*` attribute ids from `linux/if_link.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[repr(u16)]
pub enum BondAttr {
    Mode = 1,
    Miimon = 3,
    Updelay = 4,
    Downdelay = 5,
    UseCarrier = 6,
    ArpInterval = 7,
    ArpValidate = 9,
    ArpAllTargets = 10,
    Primary = 11,
    PrimaryReselect = 12,
    FailOverMac = 13,
    XmitHashPolicy = 14,
    ResendIgmp = 15,
    NumPeerNotif = 16,
    AllSlavesActive = 17,
    MinLinks = 18,
    LpInterval = 19,
    PacketsPerSlave = 20,
    AdLacpRate = 21,
    AdSelect = 22,
    AdActorSysPrio = 24,
    AdUserPortKey = 25,
    TlbDynamicLb = 27,
    PeerNotifDelay = 28,
}

impl BondAttr {
    pub fn id(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    U8(u8),
    U16(u16),
    U32(u32),
    /// Link referenced by name; the setter resolves it to an index.
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BondAttribute {
    pub kind: BondAttr,
    pub value: AttrValue,
}

/// Fully parsed bonding setup of one master link.
///
/// `None` means "keep the driver default" and produces no attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BondOptions {
    pub sub_interfaces: Vec<String>,
    pub mode: Option<BondMode>,
    pub hash_policy: Option<HashPolicy>,
    pub lacp_rate: Option<LacpRate>,
    pub arp_validate: Option<ArpValidate>,
    pub arp_all_targets: Option<ArpAllTargets>,
    pub primary: Option<String>,
    pub primary_reselect: Option<PrimaryReselect>,
    pub fail_over_mac: Option<FailOverMac>,
    pub ad_select: Option<AdSelect>,
    pub miimon: Option<u32>,
    pub updelay: Option<u32>,
    pub downdelay: Option<u32>,
    pub arp_interval: Option<u32>,
    pub resend_igmp: Option<u32>,
    pub min_links: Option<u32>,
    pub lp_interval: Option<u32>,
    pub packets_per_slave: Option<u32>,
    pub peer_notify_delay: Option<u32>,
    pub num_peer_notif: Option<u8>,
    pub tlb_dynamic_lb: Option<u8>,
    pub all_slaves_active: Option<u8>,
    pub use_carrier: Option<bool>,
    pub ad_actor_sys_prio: Option<u16>,
    pub ad_user_port_key: Option<u16>,
}

fn set<T: Copy + Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

fn parse_named<T>(interface: &str, option: &str, value: &Option<String>) -> Result<Option<T>>
where
    T: FromStr,
{
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| Error::Bond {
            interface: interface.to_string(),
            reason: format!("unknown {option} {v:?}"),
        }),
    }
}

impl BondOptions {
    pub fn from_config(interface: &str, bond: &machineconfig::Bond) -> Result<Self> {
        if bond.interfaces.is_empty() {
            return Err(Error::Bond {
                interface: interface.to_string(),
                reason: "no sub interfaces were specified".to_string(),
            });
        }

        if !bond.arp_ip_target.is_empty() {
            debug!(
                "{}: arp-ip-target is recognized but not applied: {:?}",
                interface, bond.arp_ip_target
            );
        }
        if let Some(system) = bond.ad_actor_system.as_deref().filter(|s| !s.is_empty()) {
            debug!(
                "{}: ad-actor-system is recognized but not applied: {}",
                interface, system
            );
        }

        Ok(Self {
            sub_interfaces: bond.interfaces.clone(),
            mode: parse_named(interface, "mode", &bond.mode)?,
            hash_policy: parse_named(interface, "hash-policy", &bond.hash_policy)?,
            lacp_rate: parse_named(interface, "lacp-rate", &bond.lacp_rate)?,
            arp_validate: parse_named(interface, "arp-validate", &bond.arp_validate)?,
            arp_all_targets: parse_named(interface, "arp-all-targets", &bond.arp_all_targets)?,
            primary: bond.primary.clone().filter(|p| !p.is_empty()),
            primary_reselect: parse_named(interface, "primary-reselect", &bond.primary_reselect)?,
            fail_over_mac: parse_named(interface, "fail-over-mac", &bond.fail_over_mac)?,
            ad_select: parse_named(interface, "ad-select", &bond.ad_select)?,
            miimon: set(bond.miimon),
            updelay: set(bond.updelay),
            downdelay: set(bond.downdelay),
            arp_interval: set(bond.arp_interval),
            resend_igmp: set(bond.resend_igmp),
            min_links: set(bond.min_links),
            lp_interval: set(bond.lp_interval),
            packets_per_slave: set(bond.packets_per_slave),
            peer_notify_delay: set(bond.peer_notify_delay),
            num_peer_notif: set(bond.num_peer_notif),
            tlb_dynamic_lb: set(bond.tlb_dynamic_lb),
            all_slaves_active: set(bond.all_slaves_active),
            use_carrier: bond.use_carrier,
            ad_actor_sys_prio: set(bond.ad_actor_sys_prio),
            ad_user_port_key: set(bond.ad_user_port_key),
        })
    }

    /// Attributes for every tunable that was set, in attribute id order.
    pub fn attributes(&self) -> Vec<BondAttribute> {
        let mut attrs = Vec::new();
        let mut push = |kind: BondAttr, value: Option<AttrValue>| {
            if let Some(value) = value {
                attrs.push(BondAttribute { kind, value });
            }
        };

        push(BondAttr::Mode, self.mode.map(|m| AttrValue::U8(m as u8)));
        push(BondAttr::Miimon, self.miimon.map(AttrValue::U32));
        push(BondAttr::Updelay, self.updelay.map(AttrValue::U32));
        push(BondAttr::Downdelay, self.downdelay.map(AttrValue::U32));
        push(
            BondAttr::UseCarrier,
            self.use_carrier.map(|c| AttrValue::U8(c as u8)),
        );
        push(BondAttr::ArpInterval, self.arp_interval.map(AttrValue::U32));
        push(
            BondAttr::ArpValidate,
            self.arp_validate.map(|v| AttrValue::U32(v as u32)),
        );
        push(
            BondAttr::ArpAllTargets,
            self.arp_all_targets.map(|v| AttrValue::U32(v as u32)),
        );
        push(BondAttr::Primary, self.primary.clone().map(AttrValue::Link));
        push(
            BondAttr::PrimaryReselect,
            self.primary_reselect.map(|v| AttrValue::U8(v as u8)),
        );
        push(
            BondAttr::FailOverMac,
            self.fail_over_mac.map(|v| AttrValue::U8(v as u8)),
        );
        push(
            BondAttr::XmitHashPolicy,
            self.hash_policy.map(|v| AttrValue::U8(v as u8)),
        );
        push(BondAttr::ResendIgmp, self.resend_igmp.map(AttrValue::U32));
        push(BondAttr::NumPeerNotif, self.num_peer_notif.map(AttrValue::U8));
        push(
            BondAttr::AllSlavesActive,
            self.all_slaves_active.map(AttrValue::U8),
        );
        push(BondAttr::MinLinks, self.min_links.map(AttrValue::U32));
        push(BondAttr::LpInterval, self.lp_interval.map(AttrValue::U32));
        push(
            BondAttr::PacketsPerSlave,
            self.packets_per_slave.map(AttrValue::U32),
        );
        push(
            BondAttr::AdLacpRate,
            self.lacp_rate.map(|v| AttrValue::U8(v as u8)),
        );
        push(
            BondAttr::AdSelect,
            self.ad_select.map(|v| AttrValue::U8(v as u8)),
        );
        push(
            BondAttr::AdActorSysPrio,
            self.ad_actor_sys_prio.map(AttrValue::U16),
        );
        push(
            BondAttr::AdUserPortKey,
            self.ad_user_port_key.map(AttrValue::U16),
        );
        push(BondAttr::TlbDynamicLb, self.tlb_dynamic_lb.map(AttrValue::U8));
        push(
            BondAttr::PeerNotifDelay,
            self.peer_notify_delay.map(AttrValue::U32),
        );

        attrs
    }
}
