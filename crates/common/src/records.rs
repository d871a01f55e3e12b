//! Device record and event types
//!
//! These are the value types that flow through the system: the snapshot of a
//! detected device, its registry entry, and the notification payload handed
//! across the thread boundary.

use serde::{Deserialize, Serialize};

/// Snapshot of a detected USB mass-storage device
///
/// Built once when the device is first seen. `mount_path` is the only field
/// filled in after construction, since mount resolution happens after the
/// kernel event that produced the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// USB vendor ID, parsed from the `idVendor` sysfs attribute
    pub vendor_id: u16,
    /// USB product ID, parsed from the `idProduct` sysfs attribute
    pub product_id: u16,
    /// Product string descriptor (if the device reports one)
    pub device_name: String,
    /// Manufacturer string descriptor (if the device reports one)
    pub manufacturer: String,
    /// Serial number string descriptor (if the device reports one)
    pub serial_number: String,
    /// Always 0 — bus-topology resolution is not performed
    pub device_address: u32,
    /// Always 0, same reason as `device_address`
    pub location_id: u32,
    /// Block device node path, e.g. `/dev/sdb1`
    pub dev_node: String,
    /// Mount directory, empty until (and unless) resolved
    pub mount_path: String,
}

/// Attachment state of a tracked device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Connected,
    Disconnected,
}

/// Registry entry: state plus the last-known record
///
/// Owned exclusively by the registry from insert until removal; removal hands
/// the entry back to the caller so the final notification can carry the
/// last-known record instead of re-querying a vanished device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub state: DeviceState,
    pub record: DeviceRecord,
}

impl DeviceEntry {
    pub fn connected(record: DeviceRecord) -> Self {
        Self {
            state: DeviceState::Connected,
            record,
        }
    }
}

/// Vendor/product filter for device listing
///
/// `None` fields match everything; present fields require an exact ID match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    /// Filter that matches every device
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a filter from textual hex IDs ("1d6b" or "0x1d6b")
    pub fn from_hex(
        vendor: Option<&str>,
        product: Option<&str>,
    ) -> Result<Self, crate::Error> {
        Ok(Self {
            vendor_id: vendor.map(parse_hex_id).transpose()?,
            product_id: product.map(parse_hex_id).transpose()?,
        })
    }

    pub fn matches(&self, record: &DeviceRecord) -> bool {
        if let Some(vendor) = self.vendor_id
            && record.vendor_id != vendor
        {
            return false;
        }
        if let Some(product) = self.product_id
            && record.product_id != product
        {
            return false;
        }
        true
    }
}

fn parse_hex_id(raw: &str) -> Result<u16, crate::Error> {
    u16::from_str_radix(raw.trim().trim_start_matches("0x"), 16)
        .map_err(|_| crate::Error::Config(format!("invalid hex device ID: {raw:?}")))
}

/// The single in-flight notification
///
/// At most one of these exists at any time; it moves through the bridge by
/// ownership transfer and is dropped by the consumer after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// Device attached; the record carries the resolved mount path (possibly
    /// empty if resolution missed)
    Added(DeviceRecord),
    /// Device detached; the record is the last-known state
    Removed(DeviceRecord),
}

impl StorageEvent {
    pub fn record(&self) -> &DeviceRecord {
        match self {
            StorageEvent::Added(record) | StorageEvent::Removed(record) => record,
        }
    }
}
