//! Kernel command line parameters consumed by the resolver.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use ipnetwork::{ipv4_mask_to_prefix, Ipv4Network};
use tracing::debug;

use crate::error::{Error, Result};

pub const KERNEL_PARAM_IP: &str = "ip";
pub const KERNEL_PARAM_INTERFACE_IGNORE: &str = "talos.network.interface.ignore";

/// Parsed kernel command line, in boot order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmdline {
    params: Vec<(String, Option<String>)>,
}

impl Cmdline {
    pub fn parse(line: &str) -> Self {
        let params = split_words(line)
            .into_iter()
            .map(|word| match word.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (word, None),
            })
            .collect();

        Self { params }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let line = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&line))
    }

    /// Every value given for `key`, in order.
    pub fn get(&self, key: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(k, _)| k == key)
            .filter_map(|(_, v)| v.as_deref())
            .collect()
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).into_iter().next()
    }

    pub fn ip(&self) -> Option<&str> {
        self.first(KERNEL_PARAM_IP)
    }

    /// Interfaces named by the ignore parameter. The parameter may repeat and
    /// each value may hold a comma separated list.
    pub fn ignored_interfaces(&self) -> Vec<&str> {
        self.get(KERNEL_PARAM_INTERFACE_IGNORE)
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn is_ignored(&self, interface: &str) -> bool {
        self.ignored_interfaces().contains(&interface)
    }
}

fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Static configuration carried by the kernel `ip=` parameter.
///
/// Layout: `client-ip:server-ip:gw-ip:netmask:hostname:device:autoconf:dns0:dns1:ntp0`.
/// The server, autoconf and NTP fields are not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpParam {
    pub cidr: Ipv4Network,
    pub gateway: Option<IpAddr>,
    pub hostname: Option<String>,
    pub device: Option<String>,
    pub nameservers: Vec<IpAddr>,
}

impl IpParam {
    /// Returns `Ok(None)` when the value asks for ordinary discovery: a bare
    /// `dhcp`, or fewer than four fields.
    pub fn parse(value: &str) -> Result<Option<Self>> {
        let fields: Vec<&str> = value.split(':').collect();

        if fields.len() == 1 && fields[0] == "dhcp" {
            debug!("ip=dhcp leaves interfaces to discovery");
            return Ok(None);
        }
        if fields.len() < 4 {
            debug!("ip={} has too few fields, ignoring", value);
            return Ok(None);
        }

        let address: Ipv4Addr = fields[0].parse().map_err(|e| Error::InvalidCmdline {
            field: 0,
            reason: format!("client address {:?}: {e}", fields[0]),
        })?;

        let netmask: Ipv4Addr = fields[3].parse().map_err(|e| Error::InvalidCmdline {
            field: 3,
            reason: format!("netmask {:?}: {e}", fields[3]),
        })?;
        let prefix = ipv4_mask_to_prefix(netmask).map_err(|e| Error::InvalidCmdline {
            field: 3,
            reason: format!("netmask {netmask}: {e}"),
        })?;
        let cidr = Ipv4Network::new(address, prefix).map_err(|e| Error::InvalidCmdline {
            field: 3,
            reason: e.to_string(),
        })?;

        let gateway = match fields[2] {
            "" => None,
            gw => Some(gw.parse().map_err(|e| Error::InvalidCmdline {
                field: 2,
                reason: format!("gateway {gw:?}: {e}"),
            })?),
        };

        let text = |idx: usize| {
            fields
                .get(idx)
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(str::to_string)
        };

        let nameservers = fields
            .iter()
            .skip(7)
            .take(2)
            .filter_map(|f| f.parse::<IpAddr>().ok())
            .collect();

        Ok(Some(Self {
            cidr,
            gateway,
            hostname: text(4),
            device: text(5),
            nameservers,
        }))
    }
}
