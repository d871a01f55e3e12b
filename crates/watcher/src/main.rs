//! usb-storage-watch daemon
//!
//! Headless daemon that watches USB mass-storage hotplug events and logs
//! attach/detach notifications with their resolved mount paths. Also
//! supports a one-shot `--list-devices` mode.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::{DeviceFilter, DeviceRecord, setup_logging};
use tokio::signal;
use tracing::info;
use watcher::config::DaemonConfig;
use watcher::{DeviceEvents, UsbWatcher};

#[derive(Parser, Debug)]
#[command(name = "usb-storage-watchd")]
#[command(
    author,
    version,
    about = "Watch USB mass-storage attach/detach and mount points"
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// List currently attached devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Vendor ID filter for --list-devices (hex, e.g. 1d6b)
    #[arg(long, value_name = "VID")]
    vendor: Option<String>,

    /// Product ID filter for --list-devices (hex)
    #[arg(long, value_name = "PID")]
    product: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// Sink that logs every notification
struct LogSink;

impl DeviceEvents for LogSink {
    fn device_added(&self, record: DeviceRecord) {
        if record.mount_path.is_empty() {
            info!(
                "added {} ({:04x}:{:04x}) {}, no mount path",
                record.dev_node, record.vendor_id, record.product_id, record.device_name
            );
        } else {
            info!(
                "added {} ({:04x}:{:04x}) {} mounted at {}",
                record.dev_node,
                record.vendor_id,
                record.product_id,
                record.device_name,
                record.mount_path
            );
        }
    }

    fn device_removed(&self, record: DeviceRecord) {
        info!(
            "removed {} ({:04x}:{:04x}) {}",
            record.dev_node, record.vendor_id, record.product_id, record.device_name
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DaemonConfig::default();
        let path = DaemonConfig::default_path();
        config.save(&path).context("failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match args.config {
        Some(ref path) => DaemonConfig::load(path).context("failed to load configuration")?,
        None => DaemonConfig::load_or_default(),
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    setup_logging(log_level).context("failed to setup logging")?;

    info!("usb-storage-watchd v{}", env!("CARGO_PKG_VERSION"));

    let filter = DeviceFilter::from_hex(args.vendor.as_deref(), args.product.as_deref())
        .context("invalid device filter")?;

    let watcher = UsbWatcher::new(config.detector_config());
    watcher
        .start(Arc::new(LogSink))
        .context("failed to start detection")?;

    if args.list_devices {
        for record in watcher.list_devices(&filter) {
            let mount_path = if record.mount_path.is_empty() {
                "-"
            } else {
                record.mount_path.as_str()
            };
            println!(
                "{:04x}:{:04x}  {:<12}  {:<20}  {} {}",
                record.vendor_id,
                record.product_id,
                record.dev_node,
                mount_path,
                record.manufacturer,
                record.device_name
            );
        }
        watcher.stop();
        return Ok(());
    }

    signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("shutdown signal received");
    watcher.stop();

    Ok(())
}
