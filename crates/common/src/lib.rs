//! Common plumbing for usb-storage-watch
//!
//! This crate provides the pieces shared between the detection library and
//! the daemon: device record types, the single-slot notification bridge
//! between the monitor thread and the Tokio runtime, error handling, and
//! logging setup.

pub mod bridge;
pub mod error;
pub mod logging;
pub mod records;
pub mod test_utils;

pub use bridge::{EventConsumer, EventPublisher, event_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use records::{DeviceEntry, DeviceFilter, DeviceRecord, DeviceState, StorageEvent};
