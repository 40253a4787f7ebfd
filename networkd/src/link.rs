//! Link discovery and the managed-link filter.

use async_trait::async_trait;
use nix::net::if_::InterfaceFlags;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Name prefixes of links this daemon manages.
pub const MANAGED_PREFIXES: [&str; 4] = ["en", "eth", "lo", "bond"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub name: String,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkFlags {
    pub up: bool,
    pub running: bool,
    pub loopback: bool,
}

impl From<InterfaceFlags> for LinkFlags {
    fn from(flags: InterfaceFlags) -> Self {
        Self {
            up: flags.contains(InterfaceFlags::IFF_UP),
            running: flags.contains(InterfaceFlags::IFF_RUNNING),
            loopback: flags.contains(InterfaceFlags::IFF_LOOPBACK),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkState {
    pub link: Link,
    pub flags: LinkFlags,
}

impl LinkState {
    pub fn name(&self) -> &str {
        &self.link.name
    }

    pub fn is_loopback(&self) -> bool {
        self.flags.loopback
    }
}

/// Read-only view of the kernel's links.
#[async_trait]
pub trait LinkSource: Send + Sync {
    async fn list_interfaces(&self) -> Result<Vec<Link>>;
    async fn link_flags(&self, index: u32) -> Result<LinkFlags>;
}

/// Collect every link with its flags. A link whose flags cannot be read is
/// logged and left out.
pub async fn enumerate(source: &dyn LinkSource) -> Result<Vec<LinkState>> {
    let links = source.list_interfaces().await?;
    let mut states = Vec::with_capacity(links.len());

    for link in links {
        match source.link_flags(link.index).await {
            Ok(flags) => states.push(LinkState { link, flags }),
            Err(e) => warn!("error getting link {:?}: {}", link.name, e),
        }
    }

    Ok(states)
}

/// Reduce discovered links to the ones worth configuring.
///
/// Only names with a managed prefix survive, and of those a link that is
/// administratively up without carrier is dropped. Order is preserved.
pub fn filter_interfaces(links: Vec<LinkState>) -> Vec<LinkState> {
    links
        .into_iter()
        .filter(|state| {
            MANAGED_PREFIXES
                .iter()
                .any(|prefix| state.name().starts_with(prefix))
        })
        .filter(|state| {
            if state.flags.up && !state.flags.running {
                info!("no carrier for link {:?}", state.name());
                false
            } else {
                debug!("link {:?} has carrier signal", state.name());
                true
            }
        })
        .collect()
}

/// Link source backed by `if_nameindex(3)` and `getifaddrs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixLinkSource;

impl NixLinkSource {
    pub fn new() -> Self {
        Self
    }

    fn name_of(index: u32) -> Result<String> {
        let interfaces = nix::net::if_::if_nameindex().map_err(|e| Error::Link {
            name: format!("#{index}"),
            reason: e.to_string(),
        })?;

        interfaces
            .iter()
            .find(|i| i.index() == index)
            .map(|i| i.name().to_string_lossy().into_owned())
            .ok_or_else(|| Error::Link {
                name: format!("#{index}"),
                reason: "no such link".to_string(),
            })
    }
}

#[async_trait]
impl LinkSource for NixLinkSource {
    async fn list_interfaces(&self) -> Result<Vec<Link>> {
        let interfaces = nix::net::if_::if_nameindex().map_err(|e| Error::Link {
            name: "*".to_string(),
            reason: e.to_string(),
        })?;

        Ok(interfaces
            .iter()
            .map(|i| Link {
                name: i.name().to_string_lossy().into_owned(),
                index: i.index(),
            })
            .collect())
    }

    async fn link_flags(&self, index: u32) -> Result<LinkFlags> {
        let name = Self::name_of(index)?;
        let addrs = nix::ifaddrs::getifaddrs().map_err(|e| Error::Link {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        addrs
            .into_iter()
            .find(|ifaddr| ifaddr.interface_name == name)
            .map(|ifaddr| LinkFlags::from(ifaddr.flags))
            .ok_or_else(|| Error::Link {
                name,
                reason: "link has no interface entry".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn state(name: &str, index: u32, up: bool, running: bool) -> LinkState {
        LinkState {
            link: Link {
                name: name.to_string(),
                index,
            },
            flags: LinkFlags {
                up,
                running,
                loopback: name == "lo",
            },
        }
    }

    struct FakeLinks {
        links: Vec<Link>,
        flags: BTreeMap<u32, LinkFlags>,
    }

    #[async_trait]
    impl LinkSource for FakeLinks {
        async fn list_interfaces(&self) -> Result<Vec<Link>> {
            Ok(self.links.clone())
        }

        async fn link_flags(&self, index: u32) -> Result<LinkFlags> {
            self.flags.get(&index).copied().ok_or(Error::Link {
                name: format!("#{index}"),
                reason: "gone".to_string(),
            })
        }
    }

    #[test]
    fn keeps_managed_prefixes_in_order() {
        let filtered = filter_interfaces(vec![
            state("lo", 1, true, true),
            state("wlan0", 2, true, true),
            state("eth0", 3, false, false),
            state("docker0", 4, true, true),
            state("enp3s0", 5, true, true),
            state("bond0", 6, false, false),
        ]);

        let names: Vec<_> = filtered.iter().map(LinkState::name).collect();
        assert_eq!(names, vec!["lo", "eth0", "enp3s0", "bond0"]);
    }

    #[test]
    fn drops_up_links_without_carrier() {
        let filtered = filter_interfaces(vec![
            state("eth0", 1, true, false),
            state("eth1", 2, true, true),
        ]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name(), "eth1");
    }

    #[tokio::test]
    async fn enumerate_skips_failed_lookups() {
        let source = FakeLinks {
            links: vec![
                Link {
                    name: "eth0".into(),
                    index: 2,
                },
                Link {
                    name: "eth1".into(),
                    index: 3,
                },
            ],
            flags: BTreeMap::from([(3, LinkFlags::default())]),
        };

        let states = enumerate(&source).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].name(), "eth1");
    }
}
