//! Contents of `/etc/resolv.conf` and `/etc/hosts`.

use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::hostname::HostIdentity;

/// The resolver library only consults this many `nameserver` lines.
pub const MAX_NAMESERVERS: usize = 3;

/// Destination for rendered system files.
#[async_trait]
pub trait SystemFiles: Send + Sync {
    async fn write(&self, path: &Path, contents: &str) -> Result<()>;
}

/// Writes straight to the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFiles;

#[async_trait]
impl SystemFiles for FsFiles {
    async fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}

pub fn render_resolv_conf(resolvers: &[IpAddr], domain: &str) -> String {
    let mut lines: Vec<String> = resolvers
        .iter()
        .take(MAX_NAMESERVERS)
        .map(|resolver| format!("nameserver {resolver}\n"))
        .collect();
    if !domain.is_empty() {
        lines.push(format!("search {domain}\n"));
    }
    lines.concat()
}

/// Hosts file mapping `address` to `fqdn` and its short alias.
pub fn render_hosts(fqdn: &str, address: IpAddr) -> String {
    let alias = fqdn.split('.').next().unwrap_or(fqdn);
    let names = if alias == fqdn {
        fqdn.to_string()
    } else {
        format!("{fqdn} {alias}")
    };

    format!(
        "127.0.0.1       localhost\n\
         {address}       {names}\n\
         ::1             localhost ip6-localhost ip6-loopback\n\
         ff02::1         ip6-allnodes\n\
         ff02::2         ip6-allrouters\n"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedFiles {
    pub resolv_conf: String,
    pub hosts: String,
}

impl RenderedFiles {
    pub fn render(identity: &HostIdentity, resolvers: &[IpAddr]) -> Self {
        Self {
            resolv_conf: render_resolv_conf(resolvers, &identity.domain),
            hosts: render_hosts(&identity.fqdn(), identity.address),
        }
    }

    pub async fn persist(
        &self,
        files: &dyn SystemFiles,
        resolv_conf: &Path,
        hosts: &Path,
    ) -> Result<()> {
        info!("writing {}", resolv_conf.display());
        files.write(resolv_conf, &self.resolv_conf).await?;
        info!("writing {}", hosts.display());
        files.write(hosts, &self.hosts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn resolvers(n: u8) -> Vec<IpAddr> {
        (1..=n).map(|i| IpAddr::from([10, 0, 0, i])).collect()
    }

    #[test]
    fn at_most_three_nameservers() {
        let out = render_resolv_conf(&resolvers(5), "");
        assert_eq!(
            out,
            "nameserver 10.0.0.1\nnameserver 10.0.0.2\nnameserver 10.0.0.3\n"
        );
    }

    #[test]
    fn search_line_with_domain() {
        let out = render_resolv_conf(&resolvers(1), "example.org");
        assert_eq!(out, "nameserver 10.0.0.1\nsearch example.org\n");
    }

    #[test]
    fn hosts_alias_only_when_different() {
        let addr: IpAddr = "192.168.0.10".parse().unwrap();

        let short = render_hosts("talos-192-168-0-10", addr);
        assert!(short.contains("192.168.0.10       talos-192-168-0-10\n"));

        let long = render_hosts("node.example.org", addr);
        assert!(long.contains("192.168.0.10       node.example.org node\n"));
        assert!(long.starts_with("127.0.0.1       localhost\n"));
        assert!(long.ends_with("ff02::2         ip6-allrouters\n"));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl SystemFiles for Recorder {
        async fn write(&self, path: &Path, contents: &str) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((path.display().to_string(), contents.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn persist_writes_both_files() {
        let identity = HostIdentity {
            hostname: "node".into(),
            domain: "example.org".into(),
            address: "10.0.0.2".parse().unwrap(),
        };
        let rendered = RenderedFiles::render(&identity, &resolvers(2));
        let recorder = Recorder::default();

        rendered
            .persist(&recorder, Path::new("/r"), Path::new("/h"))
            .await
            .unwrap();

        let written = recorder.0.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0, "/r");
        assert!(written[0].1.ends_with("search example.org\n"));
        assert!(written[1].1.contains("node.example.org node"));
    }

    #[tokio::test]
    async fn fs_files_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join("hosts");
        FsFiles.write(&path, "x\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x\n");
    }
}
