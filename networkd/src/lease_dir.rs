//! DHCP leases handed over through a directory.
//!
//! An external DHCP client writes each acknowledged lease as
//! `<lease_dir>/<interface>.json`, serialized as an [`Ack`]. The engine waits
//! for the file to appear.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::address::{Ack, DhcpClient};
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct LeaseDirClient {
    dir: PathBuf,
    timeout: Duration,
}

impl LeaseDirClient {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    pub fn lease_path(&self, interface: &str) -> PathBuf {
        self.dir.join(format!("{interface}.json"))
    }

    async fn wait_for_lease(&self, interface: &str) -> Result<Ack> {
        let path = self.lease_path(interface);
        loop {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    debug!("found lease {}", path.display());
                    return serde_json::from_str(&content).map_err(|e| Error::Dhcp {
                        interface: interface.to_string(),
                        reason: format!("malformed lease {}: {e}", path.display()),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    trace!("no lease for {} yet", interface);
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl DhcpClient for LeaseDirClient {
    async fn lease(&self, interface: &str) -> Result<Ack> {
        tokio::time::timeout(self.timeout, self.wait_for_lease(interface))
            .await
            .map_err(|_| Error::Dhcp {
                interface: interface.to_string(),
                reason: format!("no lease within {}s", self.timeout.as_secs()),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn reads_lease_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = LeaseDirClient::new(dir.path(), Duration::from_secs(1));
        let ack = Ack::new(Ipv4Addr::new(10, 0, 0, 7)).with_option(1, [255, 0, 0, 0]);
        std::fs::write(
            client.lease_path("eth0"),
            serde_json::to_string(&ack).unwrap(),
        )
        .unwrap();

        assert_eq!(client.lease("eth0").await.unwrap(), ack);
    }

    #[tokio::test]
    async fn times_out_without_lease() {
        let dir = tempfile::tempdir().unwrap();
        let client = LeaseDirClient::new(dir.path(), Duration::from_millis(50));
        assert_matches!(
            client.lease("eth0").await,
            Err(Error::Dhcp { interface, .. }) if interface == "eth0"
        );
    }

    #[tokio::test]
    async fn malformed_lease_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = LeaseDirClient::new(dir.path(), Duration::from_secs(1));
        std::fs::write(client.lease_path("eth1"), "{").unwrap();
        assert_matches!(client.lease("eth1").await, Err(Error::Dhcp { .. }));
    }
}
