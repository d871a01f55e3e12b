//! Device registry integration tests
//!
//! Drives the registry through simulated attach/detach sequences and checks
//! the core invariant: the key set always equals the set of currently
//! attached device nodes, with no leaks and no phantom entries.

use common::test_utils::{mock_entry, mock_mounted_record};
use common::{DeviceEntry, DeviceFilter};
use std::collections::HashSet;
use watcher::detect::registry::DeviceRegistry;

#[derive(Clone, Copy)]
enum SimEvent {
    Attach(&'static str),
    Detach(&'static str),
}

use SimEvent::{Attach, Detach};

/// Replay a simulated event stream and return the set of nodes the stream
/// leaves attached.
fn replay(registry: &mut DeviceRegistry, events: &[SimEvent]) -> HashSet<String> {
    let mut attached = HashSet::new();
    for event in events {
        match event {
            Attach(node) => {
                registry.add(*node, mock_entry(0x0781, 0x5581, node));
                attached.insert(node.to_string());
            }
            Detach(node) => {
                registry.remove(node);
                attached.remove(*node);
            }
        }
    }
    attached
}

fn registry_keys(registry: &DeviceRegistry) -> HashSet<String> {
    registry
        .snapshot(&DeviceFilter::any())
        .into_iter()
        .map(|record| record.dev_node)
        .collect()
}

#[test]
fn test_key_set_tracks_attached_set() {
    let sequences: &[&[SimEvent]] = &[
        &[Attach("/dev/sdb1")],
        &[Attach("/dev/sdb1"), Detach("/dev/sdb1")],
        &[
            Attach("/dev/sdb1"),
            Attach("/dev/sdc1"),
            Detach("/dev/sdb1"),
            Attach("/dev/sdd1"),
        ],
        &[
            Attach("/dev/sdb1"),
            Detach("/dev/sdb1"),
            Attach("/dev/sdb1"),
        ],
        // Detach of a never-seen node must not create phantom state.
        &[Detach("/dev/sdz1"), Attach("/dev/sdb1")],
        &[],
    ];

    for events in sequences {
        let mut registry = DeviceRegistry::new();
        let attached = replay(&mut registry, events);

        assert_eq!(registry_keys(&registry), attached);
        assert_eq!(registry.len(), attached.len());
    }
}

#[test]
fn test_detach_returns_record_with_mount_path() {
    let mut registry = DeviceRegistry::new();

    let record = mock_mounted_record(0x0781, 0x5581, "/dev/sdb1", "/media/usb");
    registry.add("/dev/sdb1", DeviceEntry::connected(record));

    let entry = registry.remove("/dev/sdb1").expect("stored entry expected");
    assert_eq!(entry.record.mount_path, "/media/usb");
    assert_eq!(entry.record.dev_node, "/dev/sdb1");
    assert!(!registry.contains("/dev/sdb1"));
}

#[test]
fn test_filtered_listing_after_mixed_attaches() {
    let mut registry = DeviceRegistry::new();
    registry.add("/dev/sdb1", mock_entry(0x1d6b, 0x0002, "/dev/sdb1"));
    registry.add("/dev/sdc1", mock_entry(0x0781, 0x5581, "/dev/sdc1"));

    let matching = registry.snapshot(&DeviceFilter {
        vendor_id: Some(0x1d6b),
        product_id: None,
    });

    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].dev_node, "/dev/sdb1");
}
