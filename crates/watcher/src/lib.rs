//! USB mass-storage detection for Linux
//!
//! Watches the kernel device tree for USB mass-storage attach/detach,
//! resolves mount paths, and delivers ordered notifications to a consumer
//! sink across the monitor-thread / Tokio boundary. See [`UsbWatcher`] for
//! the lifecycle surface.

pub mod config;
pub mod detect;

pub use detect::{DetectorConfig, DeviceEvents, EngineState, UsbWatcher};
