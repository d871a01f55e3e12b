//! Device registry
//!
//! In-memory table of currently-attached devices, keyed by device-node path.
//! Invariant: a key is present exactly while the device is attached. All
//! mutation happens on the monitor thread; the watcher takes filtered
//! snapshots for the `list_devices` query surface.

use std::collections::HashMap;

use common::{DeviceEntry, DeviceFilter, DeviceRecord};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: HashMap<String, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Overwriting a live key is a legal idempotent
    /// refresh, though kernel event ordering should not produce one.
    pub fn add(&mut self, key: impl Into<String>, entry: DeviceEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Remove and return the prior entry, so the caller can build the
    /// removal notification from the last-known record instead of
    /// re-querying the already-vanished device node.
    pub fn remove(&mut self, key: &str) -> Option<DeviceEntry> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of the current records, filtered by exact
    /// vendor/product ID where the filter specifies them.
    pub fn snapshot(&self, filter: &DeviceFilter) -> Vec<DeviceRecord> {
        self.entries
            .values()
            .filter(|entry| filter.matches(&entry.record))
            .map(|entry| entry.record.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::mock_entry;

    #[test]
    fn test_add_and_contains() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        registry.add("/dev/sdb1", mock_entry(0x1d6b, 0x0002, "/dev/sdb1"));

        assert!(registry.contains("/dev/sdb1"));
        assert!(!registry.contains("/dev/sdc1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_returns_prior_entry() {
        let mut registry = DeviceRegistry::new();
        registry.add("/dev/sdb1", mock_entry(0x1d6b, 0x0002, "/dev/sdb1"));

        let entry = registry.remove("/dev/sdb1").expect("entry expected");
        assert_eq!(entry.record.vendor_id, 0x1d6b);
        assert!(!registry.contains("/dev/sdb1"));

        assert!(registry.remove("/dev/sdb1").is_none());
    }

    #[test]
    fn test_overwrite_is_refresh() {
        let mut registry = DeviceRegistry::new();
        registry.add("/dev/sdb1", mock_entry(0x1d6b, 0x0002, "/dev/sdb1"));
        registry.add("/dev/sdb1", mock_entry(0x0781, 0x5581, "/dev/sdb1"));

        assert_eq!(registry.len(), 1);
        let entry = registry.remove("/dev/sdb1").expect("entry expected");
        assert_eq!(entry.record.vendor_id, 0x0781);
    }

    #[test]
    fn test_snapshot_filtering() {
        let mut registry = DeviceRegistry::new();
        registry.add("/dev/sdb1", mock_entry(0x1d6b, 0x0002, "/dev/sdb1"));
        registry.add("/dev/sdc1", mock_entry(0x0781, 0x5581, "/dev/sdc1"));

        let all = registry.snapshot(&DeviceFilter::any());
        assert_eq!(all.len(), 2);

        let filtered = registry.snapshot(&DeviceFilter {
            vendor_id: Some(0x1d6b),
            product_id: None,
        });
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].dev_node, "/dev/sdb1");
    }
}
