//! Test utilities for usb-storage-watch
//!
//! Mock record constructors and helpers shared by the test suites.

use std::future::Future;
use std::time::Duration;

use crate::{DeviceEntry, DeviceRecord};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock DeviceRecord for testing
pub fn mock_record(vendor_id: u16, product_id: u16, dev_node: &str) -> DeviceRecord {
    DeviceRecord {
        vendor_id,
        product_id,
        device_name: format!("Test Device {vendor_id:04x}:{product_id:04x}"),
        manufacturer: "Test Manufacturer".to_string(),
        serial_number: format!("SN-{vendor_id:04x}{product_id:04x}"),
        device_address: 0,
        location_id: 0,
        dev_node: dev_node.to_string(),
        mount_path: String::new(),
    }
}

/// Create a mock DeviceRecord with a resolved mount path
pub fn mock_mounted_record(
    vendor_id: u16,
    product_id: u16,
    dev_node: &str,
    mount_path: &str,
) -> DeviceRecord {
    DeviceRecord {
        mount_path: mount_path.to_string(),
        ..mock_record(vendor_id, product_id, dev_node)
    }
}

/// Create a connected registry entry for testing
pub fn mock_entry(vendor_id: u16, product_id: u16, dev_node: &str) -> DeviceEntry {
    DeviceEntry::connected(mock_record(vendor_id, product_id, dev_node))
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
