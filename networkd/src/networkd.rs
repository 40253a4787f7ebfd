//! Interface bring-up orchestration.
//!
//! [`Networkd`] owns the merged descriptor map. Construction is pure apart
//! from link enumeration; [`Networkd::configure`] resolves every interface in
//! parallel and decides the host identity as soon as the first one yields a
//! usable address.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use machineconfig::MachineConfig;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::address::DhcpClient;
use crate::cmdline::{Cmdline, IpParam};
use crate::error::{Error, Result};
use crate::files::RenderedFiles;
use crate::hostname::{self, HostIdentity, HostnameError};
use crate::link::{self, LinkSource, LinkState};
use crate::merger::{InterfaceMerger, SourcePriority};
use crate::netconf::{build_kernel_options, build_options, default_options};
use crate::nic::NetworkInterface;

pub struct Networkd {
    interfaces: BTreeMap<String, NetworkInterface>,
    hostname: Option<String>,
    nameservers: Vec<IpAddr>,
    identity: watch::Sender<Option<HostIdentity>>,
}

impl Networkd {
    /// Enumerate links from `source` and build the descriptor map.
    pub async fn new(
        config: Option<&MachineConfig>,
        cmdline: &Cmdline,
        source: &dyn LinkSource,
    ) -> Result<Self> {
        let links = link::enumerate(source).await?;
        Ok(Self::from_links(config, cmdline, &links))
    }

    /// Build the descriptor map from already enumerated links.
    ///
    /// Machine config entries beat the kernel `ip=` parameter, which beats
    /// defaults for discovered links. An entry that fails to build is logged
    /// and its interface left unconfigured.
    pub fn from_links(
        config: Option<&MachineConfig>,
        cmdline: &Cmdline,
        links: &[LinkState],
    ) -> Self {
        let mut merger = InterfaceMerger::new();

        for link in link::filter_interfaces(links.to_vec()) {
            merger.add(SourcePriority::Discovered, default_options(&link, cmdline));
        }

        if let Some(value) = cmdline.ip() {
            let kernel = IpParam::parse(value).and_then(|param| {
                param
                    .map(|p| build_kernel_options(&p, links, cmdline))
                    .transpose()
            });
            match kernel {
                Ok(Some(iface)) => merger.add(SourcePriority::KernelCmdline, iface),
                Ok(None) => {}
                Err(e) => warn!("ignoring ip={}: {}", value, e),
            }
        }

        let hostname = config.and_then(MachineConfig::hostname);
        for device in config.map(MachineConfig::devices).unwrap_or_default() {
            match build_options(device, hostname, cmdline) {
                Ok(iface) => merger.add(SourcePriority::MachineConfig, iface),
                Err(e) => {
                    warn!("skipping interface {}: {}", device.interface, e);
                    merger.reject(&device.interface);
                }
            }
        }

        let nameservers = config
            .map(MachineConfig::nameservers)
            .unwrap_or_default()
            .iter()
            .filter_map(|ns| match ns.trim().parse::<IpAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!("ignoring nameserver {:?}: {}", ns, e);
                    None
                }
            })
            .collect();

        let interfaces = merger.merge();
        info!(
            "managing {} interfaces: {:?}",
            interfaces.len(),
            interfaces.keys().collect::<Vec<_>>()
        );

        Self {
            interfaces,
            hostname: hostname.map(str::to_string),
            nameservers,
            identity: watch::Sender::new(None),
        }
    }

    pub fn interfaces(&self) -> &BTreeMap<String, NetworkInterface> {
        &self.interfaces
    }

    pub fn interfaces_mut(&mut self) -> &mut BTreeMap<String, NetworkInterface> {
        &mut self.interfaces
    }

    /// Identity from the current state of every interface, in name order.
    pub fn decide_hostname(&self) -> Result<HostIdentity> {
        Ok(hostname::decide_hostname(
            self.hostname.as_deref(),
            self.interfaces.values(),
        )?)
    }

    /// Name servers for `resolv.conf`. Configured machine name servers win,
    /// otherwise those reported by resolved interfaces, without duplicates.
    pub fn resolvers(&self) -> Vec<IpAddr> {
        if !self.nameservers.is_empty() {
            return self.nameservers.clone();
        }

        let mut resolvers = Vec::new();
        for iface in self.interfaces.values() {
            for resolver in iface
                .addressing_methods()
                .filter_map(|m| m.resolvers().ok())
                .flatten()
            {
                if !resolvers.contains(&resolver) {
                    resolvers.push(resolver);
                }
            }
        }
        resolvers
    }

    /// Render the system files for the identity `configure` published, or
    /// the one decided from the current state before `configure` has run.
    pub fn render(&self) -> Result<RenderedFiles> {
        let published = self.identity.borrow().clone();
        let identity = match published {
            Some(identity) => identity,
            None => self.decide_hostname()?,
        };
        Ok(RenderedFiles::render(&identity, &self.resolvers()))
    }

    /// Watch the host identity; `None` until the first usable address.
    pub fn subscribe(&self) -> watch::Receiver<Option<HostIdentity>> {
        self.identity.subscribe()
    }

    /// Resolve every interface concurrently.
    ///
    /// Returns the identity decided from the first interface to come up with
    /// a usable address; the remaining interfaces are still awaited. A
    /// shutdown signal aborts everything still in flight.
    pub async fn configure(
        &mut self,
        dhcp: Arc<dyn DhcpClient>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<HostIdentity> {
        let mut tasks = JoinSet::new();

        for (name, iface) in &self.interfaces {
            let name = name.clone();
            let mut iface = iface.clone();
            let dhcp = Arc::clone(&dhcp);
            let mut shutdown = shutdown.clone();

            tasks.spawn(async move {
                debug!("bringing up {}", name);
                let result = tokio::select! {
                    result = iface.resolve(dhcp.as_ref()) => result,
                    _ = cancelled(&mut shutdown) => Err(Error::Cancelled),
                };
                (name, iface, result)
            });
        }

        let mut identity: Option<HostIdentity> = None;
        let mut hostname_error: Option<HostnameError> = None;

        while let Some(joined) = tasks.join_next().await {
            let (name, iface, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!("interface task failed: {}", e);
                    continue;
                }
            };

            match result {
                Ok(()) => debug!("{} resolved", name),
                Err(Error::Cancelled) => {
                    info!("shutdown requested, aborting interface bring-up");
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                Err(e) => warn!("failed to configure {}: {}", name, e),
            }

            if identity.is_none() {
                match hostname::decide_hostname(self.hostname.as_deref(), [&iface]) {
                    Ok(decided) => {
                        info!(
                            "hostname {} domain {:?} from {} ({})",
                            decided.hostname, decided.domain, name, decided.address
                        );
                        self.identity.send_replace(Some(decided.clone()));
                        identity = Some(decided);
                    }
                    Err(HostnameError::NoUsableAddress) => {}
                    Err(e) => {
                        error!("cannot use {} for the hostname: {}", name, e);
                        hostname_error.get_or_insert(e);
                    }
                }
            }

            self.interfaces.insert(name, iface);
        }

        match identity {
            Some(identity) => Ok(identity),
            None => Err(hostname_error
                .unwrap_or(HostnameError::NoUsableAddress)
                .into()),
        }
    }
}

/// Completes once shutdown is requested. A dropped sender never cancels.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
