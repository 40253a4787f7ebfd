pub mod address;
pub mod cmdline;
pub mod config;
pub mod error;
pub mod files;
pub mod hostname;
pub mod lease_dir;
pub mod link;
pub mod merger;
pub mod netconf;
pub mod networkd;
pub mod nic;

pub use crate::config::NetworkdConfig;
pub use crate::error::{Error, Result};
pub use crate::networkd::Networkd;
