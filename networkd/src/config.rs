use std::path::{Path, PathBuf};

use config::{Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Runtime settings of the daemon.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkdConfig {
    /// Machine config document, KDL, YAML or JSON
    pub machine_config: Option<PathBuf>,
    pub cmdline: PathBuf,
    pub resolv_conf: PathBuf,
    pub hosts: PathBuf,
    /// Directory the DHCP client drops `<interface>.json` leases into
    pub lease_dir: PathBuf,
    pub lease_timeout_secs: u64,
}

/// Load settings from `/etc/networkd.*` (or `path`), then `NETWORKD_*`
/// environment variables, on top of the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<NetworkdConfig> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        // Baked into the image under /etc, optional for local debugging
        None => File::with_name("/etc/networkd").required(false),
    };

    let cfg = config::Config::builder()
        .set_default("cmdline", "/proc/cmdline")?
        .set_default("resolv_conf", "/etc/resolv.conf")?
        .set_default("hosts", "/etc/hosts")?
        .set_default("lease_dir", "/run/networkd/leases")?
        .set_default("lease_timeout_secs", 30)?
        .add_source(file)
        .add_source(Environment::with_prefix("NETWORKD"))
        .build()?;

    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "machine_config = \"/etc/machine.kdl\"\nlease_timeout_secs = 5"
        )
        .unwrap();

        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.machine_config, Some(PathBuf::from("/etc/machine.kdl")));
        assert_eq!(cfg.lease_timeout_secs, 5);
        assert_eq!(cfg.cmdline, PathBuf::from("/proc/cmdline"));
        assert_eq!(cfg.resolv_conf, PathBuf::from("/etc/resolv.conf"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/networkd.toml"))).is_err());
    }
}
