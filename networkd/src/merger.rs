use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::nic::NetworkInterface;

/// Where an interface descriptor came from. Lower values take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourcePriority {
    MachineConfig = 1,
    KernelCmdline = 10,
    Discovered = 20,
}

/// Interface merger that combines descriptors from several sources
pub struct InterfaceMerger {
    /// Descriptors stored by source priority
    layers: BTreeMap<SourcePriority, BTreeMap<String, NetworkInterface>>,
    /// Names whose highest priority entry failed to build
    rejected: BTreeSet<String>,
}

impl InterfaceMerger {
    /// Create a new interface merger
    pub fn new() -> Self {
        Self {
            layers: BTreeMap::new(),
            rejected: BTreeSet::new(),
        }
    }

    /// Add a descriptor for a specific source
    pub fn add(&mut self, priority: SourcePriority, iface: NetworkInterface) {
        debug!(
            "Adding {} from {:?} (priority {})",
            iface.name(),
            priority,
            priority as u32
        );
        self.layers
            .entry(priority)
            .or_default()
            .insert(iface.name().to_string(), iface);
    }

    /// Drop `name` from the merged result regardless of other sources
    pub fn reject(&mut self, name: &str) {
        debug!("Rejecting {}", name);
        self.rejected.insert(name.to_string());
    }

    /// Merge all descriptors based on priority
    ///
    /// Ignored and rejected interfaces are left out.
    pub fn merge(&self) -> BTreeMap<String, NetworkInterface> {
        let mut result = BTreeMap::new();

        // Highest priority number first so lower numbers override
        for (priority, layer) in self.layers.iter().rev() {
            trace!("Merging {} descriptors from {:?}", layer.len(), priority);
            for (name, iface) in layer {
                result.insert(name.clone(), iface.clone());
            }
        }

        result.retain(|name, iface: &mut NetworkInterface| {
            if self.rejected.contains(name) {
                return false;
            }
            if iface.ignore() {
                debug!("Ignoring {}", name);
                return false;
            }
            true
        });

        result
    }

    /// Get the number of descriptors stored
    pub fn len(&self) -> usize {
        self.layers.values().map(BTreeMap::len).sum()
    }

    /// Check if the merger has any descriptors
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InterfaceMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Addressing, Dhcp, Static};

    fn dhcp(name: &str) -> NetworkInterface {
        let mut iface = NetworkInterface::new(name);
        iface.set_addressing(Addressing::Dhcp(Dhcp::new()));
        iface
    }

    fn fixed(name: &str, cidr: &str) -> NetworkInterface {
        let mut iface = NetworkInterface::new(name);
        iface.set_addressing(Addressing::Static(Static::new(name, cidr).unwrap()));
        iface
    }

    #[test]
    fn test_priority_override() {
        let mut merger = InterfaceMerger::new();

        merger.add(SourcePriority::Discovered, dhcp("eth0"));
        merger.add(SourcePriority::KernelCmdline, fixed("eth0", "10.0.0.2/8"));
        merger.add(SourcePriority::MachineConfig, fixed("eth0", "192.168.0.10/24"));

        let merged = merger.merge();

        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged["eth0"].addressing().unwrap().address().unwrap().to_string(),
            "192.168.0.10/24"
        );
        assert_eq!(merger.len(), 3);
    }

    #[test]
    fn test_interface_merge() {
        let mut merger = InterfaceMerger::new();

        merger.add(SourcePriority::Discovered, dhcp("eth0"));
        merger.add(SourcePriority::Discovered, dhcp("eth1"));
        merger.add(SourcePriority::MachineConfig, fixed("bond0", "10.0.0.2/8"));

        let merged = merger.merge();
        let names: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(names, vec!["bond0", "eth0", "eth1"]);
    }

    #[test]
    fn test_ignored_wins_and_is_dropped() {
        let mut merger = InterfaceMerger::new();

        let mut ignored = NetworkInterface::new("eth1");
        ignored.set_ignore(true);

        merger.add(SourcePriority::Discovered, dhcp("eth1"));
        merger.add(SourcePriority::MachineConfig, ignored);

        assert!(merger.merge().is_empty());
    }

    #[test]
    fn test_rejected_blocks_fallbacks() {
        let mut merger = InterfaceMerger::new();

        merger.add(SourcePriority::Discovered, dhcp("eth0"));
        merger.add(SourcePriority::Discovered, dhcp("eth1"));
        merger.reject("eth0");

        let merged = merger.merge();
        assert!(!merged.contains_key("eth0"));
        assert!(merged.contains_key("eth1"));
    }

    #[test]
    fn test_empty() {
        let merger = InterfaceMerger::default();
        assert!(merger.is_empty());
        assert!(merger.merge().is_empty());
    }
}
