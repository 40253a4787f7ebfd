//! Translation of configuration sources into interface descriptors.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use machineconfig::Device;
use tracing::{debug, info};

use crate::address::static_addr::parse_cidr;
use crate::address::{Addressing, Dhcp, Route, Static};
use crate::cmdline::{Cmdline, IpParam};
use crate::error::{Error, Result};
use crate::hostname::default_hostname;
use crate::link::LinkState;
use crate::nic::{BondOptions, NetworkInterface};

/// Build the descriptor for one machine config entry.
///
/// `hostname` is the machine hostname, which replaces the generated name of a
/// statically addressed link.
pub fn build_options(
    device: &Device,
    hostname: Option<&str>,
    cmdline: &Cmdline,
) -> Result<NetworkInterface> {
    let name = device.interface.as_str();
    let mut iface = NetworkInterface::new(name);

    if device.ignore || cmdline.is_ignored(name) {
        info!("ignoring interface {}", name);
        iface.set_ignore(true);
        return Ok(iface);
    }

    if let Some(mtu) = device.mtu {
        iface.set_mtu(mtu);
    }

    match device.cidr.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(cidr) => {
            let network = parse_cidr(name, cidr)?;
            let fqdn = hostname
                .map(str::to_string)
                .unwrap_or_else(|| default_hostname(network.ip()));
            let addressing = Static::from_network(network)
                .with_routes(parse_routes(name, &device.routes)?)
                .with_mtu(device.mtu)
                .with_fqdn(Some(fqdn));
            iface.set_addressing(Addressing::Static(addressing));
        }
        None => iface.set_addressing(Addressing::Dhcp(Dhcp::new())),
    }

    for vlan in &device.vlans {
        iface.add_vlan(vlan.id, vlan.protocol.unwrap_or_default().into())?;

        let vlan_name = format!("{}.{}", name, vlan.id);
        let cidr = vlan.cidr.as_deref().map(str::trim).filter(|c| !c.is_empty());
        if let Some(cidr) = cidr {
            let addressing =
                Static::new(&vlan_name, cidr)?.with_routes(parse_routes(&vlan_name, &vlan.routes)?);
            iface.set_vlan_addressing(vlan.id, Addressing::Static(addressing))?;
        }
        // Both a CIDR and dhcp is a conflict reported by the descriptor
        if vlan.dhcp {
            iface.set_vlan_addressing(vlan.id, Addressing::Dhcp(Dhcp::new()))?;
        }
        if cidr.is_none() && !vlan.dhcp {
            debug!("{}: no addressing configured", vlan_name);
        }
    }

    if let Some(bond) = &device.bond {
        iface.set_bond(BondOptions::from_config(name, bond)?);
    }

    Ok(iface)
}

/// Build the descriptor described by a kernel `ip=` parameter.
///
/// The named device is used when it exists, otherwise the first non-loopback
/// link. A link on the kernel ignore list gets an ignored descriptor.
pub fn build_kernel_options(
    param: &IpParam,
    links: &[LinkState],
    cmdline: &Cmdline,
) -> Result<NetworkInterface> {
    let link = param
        .device
        .as_deref()
        .and_then(|device| links.iter().find(|l| l.name() == device))
        .or_else(|| links.iter().find(|l| !l.is_loopback()))
        .ok_or(Error::NoKernelInterface)?;

    let mut iface = NetworkInterface::new(link.name());
    if cmdline.is_ignored(link.name()) {
        info!("ignoring ip= for {}, the interface is ignored", link.name());
        iface.set_ignore(true);
        return Ok(iface);
    }

    info!("configuring {} from the kernel ip= parameter", link.name());

    let routes = param
        .gateway
        .and_then(Route::default_via)
        .into_iter()
        .collect();

    let addressing = Static::from_network(IpNetwork::V4(param.cidr))
        .with_routes(routes)
        .with_fqdn(param.hostname.clone())
        .with_nameservers(param.nameservers.clone());

    iface.set_addressing(Addressing::Static(addressing));
    Ok(iface)
}

/// Descriptor for a discovered link nobody configured: DHCP, or the usual
/// loopback address for a loopback link.
pub fn default_options(link: &LinkState, cmdline: &Cmdline) -> NetworkInterface {
    let mut iface = NetworkInterface::new(link.name());

    if cmdline.is_ignored(link.name()) {
        iface.set_ignore(true);
        return iface;
    }

    if link.is_loopback() {
        iface.set_loopback(true);
        if let Ok(network) = IpNetwork::new(IpAddr::from([127, 0, 0, 1]), 8) {
            iface.set_addressing(Addressing::Static(Static::from_network(network)));
        }
    } else {
        iface.set_addressing(Addressing::Dhcp(Dhcp::new()));
    }

    iface
}

pub fn parse_routes(interface: &str, routes: &[machineconfig::Route]) -> Result<Vec<Route>> {
    routes
        .iter()
        .map(|route| {
            let invalid = |reason: String| Error::InvalidRoute {
                interface: interface.to_string(),
                route: format!("{} via {}", route.network, route.gateway),
                reason,
            };

            let destination = parse_cidr(interface, &route.network)
                .map_err(|e| invalid(e.to_string()))?;
            let gateway: IpAddr = route
                .gateway
                .trim()
                .parse()
                .map_err(|e| invalid(format!("gateway: {e}")))?;

            Ok(Route {
                destination,
                gateway,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{Link, LinkFlags};
    use crate::nic::VlanProtocol;
    use assert_matches::assert_matches;

    fn device(name: &str) -> Device {
        Device {
            interface: name.to_string(),
            ..Default::default()
        }
    }

    fn link(name: &str, index: u32) -> LinkState {
        LinkState {
            link: Link {
                name: name.to_string(),
                index,
            },
            flags: LinkFlags {
                up: true,
                running: true,
                loopback: name == "lo",
            },
        }
    }

    #[test]
    fn cidr_means_static_with_generated_name() {
        let mut dev = device("eth0");
        dev.cidr = Some("192.168.0.10/24".into());
        dev.routes = vec![machineconfig::Route {
            network: "0.0.0.0/0".into(),
            gateway: "192.168.0.1".into(),
        }];

        let iface = build_options(&dev, None, &Cmdline::default()).unwrap();
        let Some(Addressing::Static(s)) = iface.addressing() else {
            panic!("expected static addressing");
        };
        assert_eq!(s.fqdn(), Some("talos-192-168-0-10"));
        assert_eq!(s.routes().len(), 1);

        let named = build_options(&dev, Some("myhostname"), &Cmdline::default()).unwrap();
        let Some(Addressing::Static(s)) = named.addressing() else {
            panic!("expected static addressing");
        };
        assert_eq!(s.fqdn(), Some("myhostname"));
    }

    #[test]
    fn no_cidr_means_dhcp() {
        let iface = build_options(&device("eth0"), None, &Cmdline::default()).unwrap();
        assert_matches!(iface.addressing(), Some(Addressing::Dhcp(_)));
    }

    #[test]
    fn ignore_short_circuits() {
        let mut dev = device("eth0");
        dev.cidr = Some("not a cidr".into());
        dev.ignore = true;

        let iface = build_options(&dev, None, &Cmdline::default()).unwrap();
        assert!(iface.ignore());
        assert!(iface.addressing().is_none());

        let cmdline = Cmdline::parse("talos.network.interface.ignore=eth1");
        let iface = build_options(&device("eth1"), None, &cmdline).unwrap();
        assert!(iface.ignore());
    }

    #[test]
    fn vlans_in_declaration_order() {
        let mut dev = device("eth0");
        dev.vlans = vec![
            machineconfig::Vlan {
                id: 100,
                cidr: Some("10.100.0.2/24".into()),
                ..Default::default()
            },
            machineconfig::Vlan {
                id: 200,
                protocol: Some(machineconfig::VlanProtocol::Dot1ad),
                dhcp: true,
                ..Default::default()
            },
            machineconfig::Vlan {
                id: 300,
                ..Default::default()
            },
        ];

        let iface = build_options(&dev, None, &Cmdline::default()).unwrap();
        let vlans = iface.vlans();
        assert_eq!(vlans.len(), 3);
        assert_matches!(vlans[0].addressing, Some(Addressing::Static(_)));
        assert_matches!(vlans[1].addressing, Some(Addressing::Dhcp(_)));
        assert_eq!(vlans[1].protocol, VlanProtocol::Dot1AD);
        assert!(vlans[2].addressing.is_none());
    }

    #[test]
    fn duplicate_vlan_fails_the_entry() {
        let mut dev = device("eth0");
        dev.vlans = vec![
            machineconfig::Vlan {
                id: 5,
                ..Default::default()
            },
            machineconfig::Vlan {
                id: 5,
                ..Default::default()
            },
        ];
        assert_matches!(
            build_options(&dev, None, &Cmdline::default()),
            Err(Error::DuplicateVlan { id: 5, .. })
        );
    }

    #[test]
    fn vlan_with_cidr_and_dhcp_conflicts() {
        let mut dev = device("eth0");
        dev.vlans = vec![machineconfig::Vlan {
            id: 9,
            cidr: Some("10.9.0.2/24".into()),
            dhcp: true,
            ..Default::default()
        }];
        assert_matches!(
            build_options(&dev, None, &Cmdline::default()),
            Err(Error::VlanAddressingSet { id: 9, .. })
        );
    }

    #[test]
    fn bad_route_is_reported() {
        let mut dev = device("eth0");
        dev.cidr = Some("10.0.0.2/8".into());
        dev.routes = vec![machineconfig::Route {
            network: "0.0.0.0/0".into(),
            gateway: "nowhere".into(),
        }];
        assert_matches!(
            build_options(&dev, None, &Cmdline::default()),
            Err(Error::InvalidRoute { .. })
        );
    }

    #[test]
    fn kernel_options_pick_named_device() {
        let links = vec![link("lo", 1), link("eth0", 2), link("eth1", 3)];
        let param = IpParam::parse("10.0.0.5::10.0.0.1:255.255.255.0:kernelhost:eth1:off:9.9.9.9")
            .unwrap()
            .unwrap();

        let iface = build_kernel_options(&param, &links, &Cmdline::default()).unwrap();
        assert_eq!(iface.name(), "eth1");

        let Some(Addressing::Static(s)) = iface.addressing() else {
            panic!("expected static addressing");
        };
        assert_eq!(s.cidr().to_string(), "10.0.0.5/24");
        assert_eq!(s.routes()[0].gateway.to_string(), "10.0.0.1");
        assert_eq!(s.fqdn(), Some("kernelhost"));
        assert_eq!(s.nameservers().len(), 1);
    }

    #[test]
    fn kernel_options_fall_back_to_first_non_loopback() {
        let links = vec![link("lo", 1), link("eth0", 2)];
        let param = IpParam::parse("10.0.0.5:::255.0.0.0::eth9").unwrap().unwrap();
        let iface = build_kernel_options(&param, &links, &Cmdline::default()).unwrap();
        assert_eq!(iface.name(), "eth0");

        assert_matches!(
            build_kernel_options(&param, &[link("lo", 1)], &Cmdline::default()),
            Err(Error::NoKernelInterface)
        );
    }

    #[test]
    fn kernel_options_respect_ignore_list() {
        let links = vec![link("lo", 1), link("eth0", 2), link("eth1", 3)];
        let param = IpParam::parse("10.0.0.5::10.0.0.1:255.255.255.0::eth1")
            .unwrap()
            .unwrap();
        let cmdline = Cmdline::parse("talos.network.interface.ignore=eth1");

        let iface = build_kernel_options(&param, &links, &cmdline).unwrap();
        assert_eq!(iface.name(), "eth1");
        assert!(iface.ignore());
        assert!(iface.addressing().is_none());
    }

    #[test]
    fn defaults_for_discovered_links() {
        let lo = default_options(&link("lo", 1), &Cmdline::default());
        assert!(lo.is_loopback());
        assert_eq!(
            lo.addressing().unwrap().address().unwrap().to_string(),
            "127.0.0.1/8"
        );

        let eth0 = default_options(&link("eth0", 2), &Cmdline::default());
        assert_matches!(eth0.addressing(), Some(Addressing::Dhcp(_)));

        let cmdline = Cmdline::parse("talos.network.interface.ignore=eth0");
        assert!(default_options(&link("eth0", 2), &cmdline).ignore());
    }
}
