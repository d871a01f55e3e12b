//! USB descriptor attribute extraction
//!
//! Walks a raw kernel device's ancestry to the owning USB device and its
//! block child, and turns the USB ancestor's sysfs attributes into a
//! [`DeviceRecord`]. The textual attribute capture is split from the parse
//! so the parse stays pure.

use std::ffi::OsStr;

use common::DeviceRecord;
use tracing::debug;

/// Raw textual descriptor attributes read from a USB device's sysfs entry
#[derive(Debug, Clone, Default)]
pub struct UsbAttributes {
    pub id_vendor: Option<String>,
    pub id_product: Option<String>,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
    pub serial: Option<String>,
}

impl UsbAttributes {
    pub fn from_device(usb: &udev::Device) -> Self {
        Self {
            id_vendor: attribute(usb, "idVendor"),
            id_product: attribute(usb, "idProduct"),
            product: attribute(usb, "product"),
            manufacturer: attribute(usb, "manufacturer"),
            serial: attribute(usb, "serial"),
        }
    }

    /// Build the record for a device at `dev_node`.
    ///
    /// Vendor and product IDs are base-16 text in sysfs; a missing or
    /// malformed ID stays at the zero default rather than failing.
    /// `device_address` and `location_id` are fixed at 0 — bus-topology
    /// resolution is not performed.
    pub fn into_record(self, dev_node: String) -> DeviceRecord {
        DeviceRecord {
            vendor_id: self.id_vendor.as_deref().map_or(0, parse_hex_id),
            product_id: self.id_product.as_deref().map_or(0, parse_hex_id),
            device_name: self.product.unwrap_or_default(),
            manufacturer: self.manufacturer.unwrap_or_default(),
            serial_number: self.serial.unwrap_or_default(),
            device_address: 0,
            location_id: 0,
            dev_node,
            mount_path: String::new(),
        }
    }
}

fn parse_hex_id(raw: &str) -> u16 {
    u16::from_str_radix(raw.trim(), 16).unwrap_or(0)
}

fn attribute(device: &udev::Device, name: &str) -> Option<String> {
    device
        .attribute_value(name)
        .and_then(OsStr::to_str)
        .map(|value| value.trim().to_string())
}

fn property(device: &udev::Device, name: &str) -> Option<String> {
    device
        .property_value(name)
        .and_then(OsStr::to_str)
        .map(str::to_string)
}

/// Nearest ancestor in the `usb` subsystem with devtype `usb_device` — the
/// physical USB device a storage chain descends from.
pub fn usb_ancestor(device: &udev::Device) -> Option<udev::Device> {
    match device.parent_with_subsystem_devtype("usb", "usb_device") {
        Ok(parent) => parent,
        Err(e) => {
            debug!("usb ancestor walk failed for {:?}: {}", device.syspath(), e);
            None
        }
    }
}

/// First device of `subsystem` in the subtree rooted at `device` (the root
/// itself included, which is how a partition event resolves to itself as its
/// own block node).
pub fn child_in_subsystem(device: &udev::Device, subsystem: &str) -> Option<udev::Device> {
    let scan = || -> std::io::Result<Option<udev::Device>> {
        let mut enumerator = udev::Enumerator::new()?;
        enumerator.match_parent(device)?;
        enumerator.match_subsystem(subsystem)?;
        Ok(enumerator.scan_devices()?.next())
    };

    match scan() {
        Ok(child) => child,
        Err(e) => {
            debug!(
                "{} child lookup failed for {:?}: {}",
                subsystem,
                device.syspath(),
                e
            );
            None
        }
    }
}

/// Best-effort record for a device that was never tracked, rebuilt from the
/// udev properties of the raw event device instead of a USB ancestor.
pub fn fallback_record(device: &udev::Device, dev_node: &str) -> DeviceRecord {
    DeviceRecord {
        vendor_id: attribute(device, "idVendor").as_deref().map_or(0, parse_hex_id),
        product_id: attribute(device, "idProduct").as_deref().map_or(0, parse_hex_id),
        device_name: property(device, "ID_MODEL").unwrap_or_default(),
        manufacturer: property(device, "ID_VENDOR").unwrap_or_default(),
        serial_number: property(device, "ID_SERIAL_SHORT").unwrap_or_default(),
        device_address: 0,
        location_id: 0,
        dev_node: dev_node.to_string(),
        mount_path: String::new(),
    }
}
