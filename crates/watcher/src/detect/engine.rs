//! Detection engine
//!
//! Runs on the dedicated `usb-monitor` thread: opens the udev netlink
//! monitor, enumerates already-attached mass-storage chains into the
//! registry, then loops on monitor readiness classifying partition
//! add/remove events. Each event is handed to the consumer through the
//! bridge, gated by the handled acknowledgement so at most one notification
//! is ever in flight.

use std::ffi::OsStr;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use common::{DeviceEntry, DeviceRecord, Error, EventPublisher, StorageEvent};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, info, warn};
use udev::{EventType, MonitorBuilder, MonitorSocket};

use super::attributes::{self, UsbAttributes};
use super::mount::{MatchMode, MountResolver};
use super::registry::DeviceRegistry;

pub(crate) struct DetectionEngine {
    pub registry: Arc<Mutex<DeviceRegistry>>,
    pub publisher: EventPublisher,
    pub running: Arc<AtomicBool>,
    pub mounts: MountResolver,
    pub poll_interval: Duration,
}

impl DetectionEngine {
    /// Thread entry point.
    ///
    /// Reports startup success or failure once through `ready`; a monitor
    /// that cannot be opened is fatal to the engine (the thread exits) but
    /// never to the host process. After a successful start the loop runs
    /// until the running flag clears or the bridge closes.
    pub fn run(self, ready: mpsc::Sender<common::Result<()>>) {
        let socket = match open_monitor() {
            Ok(socket) => socket,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        if let Err(e) = self.enumerate_existing() {
            warn!("initial device enumeration failed: {}", e);
        }
        let _ = ready.send(Ok(()));

        info!("usb monitor thread started");
        while self.running.load(Ordering::SeqCst) {
            match wait_readable(&socket, self.poll_interval) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("monitor poll failed: {}", e);
                    continue;
                }
            }

            for event in socket.iter() {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                self.handle_event(&event);
            }
        }
        info!("usb monitor thread stopped");
    }

    /// Populate the registry with the USB mass-storage chains already
    /// attached at startup: every scsi_device with a block child, a
    /// scsi_disk child and a USB ancestor.
    fn enumerate_existing(&self) -> common::Result<()> {
        let mut enumerator = udev::Enumerator::new()?;
        enumerator.match_subsystem("scsi")?;
        enumerator.match_property("DEVTYPE", "scsi_device")?;

        for scsi in enumerator.scan_devices()? {
            let Some(block) = attributes::child_in_subsystem(&scsi, "block") else {
                continue;
            };
            if attributes::child_in_subsystem(&scsi, "scsi_disk").is_none() {
                continue;
            }
            let Some(usb) = attributes::usb_ancestor(&scsi) else {
                continue;
            };
            let Some(node) = devnode_string(&block) else {
                continue;
            };

            let mut record = UsbAttributes::from_device(&usb).into_record(node.clone());
            // udev hands us the whole-disk node here, so match by prefix to
            // still find the mounted partition.
            record.mount_path = self.mounts.resolve(&node, MatchMode::Prefix);

            debug!("already attached: {}", node);
            self.registry
                .lock()
                .unwrap()
                .add(node, DeviceEntry::connected(record));
        }

        Ok(())
    }

    fn handle_event(&self, event: &udev::Event) {
        let device = event.device();

        // Only the partition event yields a stable device node plus USB
        // ancestry; the other events of the same physical attach are noise.
        if device.devtype().and_then(OsStr::to_str) != Some("partition") {
            return;
        }

        match event.event_type() {
            EventType::Add => self.handle_add(&device),
            EventType::Remove => self.handle_remove(&device),
            _ => {}
        }
    }

    fn handle_add(&self, device: &udev::Device) {
        let Some(block) = attributes::child_in_subsystem(device, "block") else {
            debug!("add event without block child: {:?}", device.syspath());
            return;
        };
        let Some(usb) = attributes::usb_ancestor(device) else {
            debug!("add event without usb ancestor: {:?}", device.syspath());
            return;
        };
        let Some(node) = devnode_string(&block) else {
            debug!("block child without device node: {:?}", block.syspath());
            return;
        };

        let mut record = UsbAttributes::from_device(&usb).into_record(node.clone());
        record.mount_path = self.mounts.resolve(&node, MatchMode::Exact);

        // Backpressure: the consumer must have drained the previous event
        // before we touch the registry for this one.
        if self.publisher.wait_until_handled().is_err() {
            return;
        }
        self.registry
            .lock()
            .unwrap()
            .add(node, DeviceEntry::connected(record.clone()));

        info!(
            "device attached: {} ({:04x}:{:04x})",
            record.dev_node, record.vendor_id, record.product_id
        );
        if self.publisher.publish(StorageEvent::Added(record)).is_err() {
            debug!("bridge closed before add notification");
        }
    }

    fn handle_remove(&self, device: &udev::Device) {
        let Some(node) = devnode_string(device) else {
            return;
        };

        if self.publisher.wait_until_handled().is_err() {
            return;
        }
        let stored = self.registry.lock().unwrap().remove(&node);
        let record = removal_record(stored, || attributes::fallback_record(device, &node));

        info!("device detached: {}", record.dev_node);
        if self.publisher.publish(StorageEvent::Removed(record)).is_err() {
            debug!("bridge closed before remove notification");
        }
    }
}

/// The removal notification carries the last-known record when the device
/// was tracked, and a best-effort reconstruction otherwise.
fn removal_record(
    stored: Option<DeviceEntry>,
    fallback: impl FnOnce() -> DeviceRecord,
) -> DeviceRecord {
    match stored {
        Some(entry) => entry.record,
        None => fallback(),
    }
}

fn devnode_string(device: &udev::Device) -> Option<String> {
    device
        .devnode()
        .and_then(|path| path.to_str())
        .map(str::to_owned)
}

fn open_monitor() -> common::Result<MonitorSocket> {
    MonitorBuilder::new()
        .and_then(|builder| builder.match_subsystem("block"))
        .and_then(|builder| builder.match_subsystem_devtype("usb", "usb_device"))
        .and_then(|builder| builder.listen())
        .map_err(|e| Error::Monitor(e.to_string()))
}

/// Block until the monitor socket is readable or the interval elapses.
///
/// A bounded interval rather than an unbounded block, so the loop observes
/// the stop flag without needing a second wake descriptor.
fn wait_readable(socket: &MonitorSocket, interval: Duration) -> common::Result<bool> {
    let millis = u16::try_from(interval.as_millis()).unwrap_or(u16::MAX);

    // The socket outlives this stack frame, so borrowing its fd is sound.
    let fd = unsafe { BorrowedFd::borrow_raw(socket.as_raw_fd()) };
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];

    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) => Ok(false),
        Ok(_) => Ok(fds[0]
            .revents()
            .is_some_and(|revents| revents.contains(PollFlags::POLLIN))),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(Error::Io(e.into())),
    }
}
