//! USB mass-storage detection
//!
//! [`UsbWatcher`] owns the whole detection lifecycle: the `usb-monitor`
//! thread running the detection engine, the Tokio consumer task draining the
//! notification bridge, and the shared device registry. Create it, `start`
//! it with a [`DeviceEvents`] sink, query it with `list_devices`, `stop` it
//! (or let `Drop` do that).

pub mod attributes;
mod engine;
pub mod mount;
pub mod registry;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use common::{
    DeviceFilter, DeviceRecord, EventConsumer, EventPublisher, StorageEvent, event_bridge,
};
use tracing::{error, info};

use engine::DetectionEngine;
use mount::{DEFAULT_MOUNT_TABLE, MountResolver};
use registry::DeviceRegistry;

/// Consumer-side notification sink
///
/// Both callbacks run on the Tokio consumer task, one notification at a
/// time, in the exact order the engine observed the kernel events.
pub trait DeviceEvents: Send + Sync + 'static {
    /// Called once per successful attach, after the mount-path resolution
    /// attempt (which may have missed, leaving `mount_path` empty).
    fn device_added(&self, record: DeviceRecord);

    /// Called once per detach, with the last-known record for tracked
    /// devices or a best-effort reconstruction otherwise.
    fn device_removed(&self, record: DeviceRecord);
}

/// Detection engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(EngineState::Stopped as u8))
    }

    fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> EngineState {
        match self.0.load(Ordering::SeqCst) {
            s if s == EngineState::Starting as u8 => EngineState::Starting,
            s if s == EngineState::Running as u8 => EngineState::Running,
            s if s == EngineState::Stopping as u8 => EngineState::Stopping,
            _ => EngineState::Stopped,
        }
    }
}

/// Runtime knobs for the detection engine
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Mount table to scan, normally `/proc/mounts`
    pub mount_table: PathBuf,
    /// Fixed wait before each mount-table scan, letting the kernel finish
    /// mounting after the hotplug event
    pub mount_grace: Duration,
    /// Upper bound on how long the monitor readiness wait blocks before
    /// re-checking the stop flag
    pub poll_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            mount_grace: Duration::from_secs(1),
            poll_interval: Duration::from_millis(250),
        }
    }
}

struct ActiveTasks {
    engine: thread::JoinHandle<()>,
    consumer: tokio::task::JoinHandle<()>,
    publisher: EventPublisher,
}

/// USB mass-storage watcher
pub struct UsbWatcher {
    config: DetectorConfig,
    registry: Arc<Mutex<DeviceRegistry>>,
    running: Arc<AtomicBool>,
    state: StateCell,
    active: Mutex<Option<ActiveTasks>>,
}

impl UsbWatcher {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(DeviceRegistry::new())),
            running: Arc::new(AtomicBool::new(false)),
            state: StateCell::new(),
            active: Mutex::new(None),
        }
    }

    /// Start detection: spawn the monitor thread and the consumer task.
    ///
    /// Blocks until the engine finished its startup (monitor open plus
    /// initial enumeration) and reports the result; a monitor that cannot be
    /// opened leaves the watcher `Stopped` with no tasks running. Calling
    /// `start` on a running watcher is a no-op. Must be called from within a
    /// Tokio runtime.
    pub fn start(&self, sink: Arc<dyn DeviceEvents>) -> common::Result<()> {
        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            return Ok(());
        }

        self.state.set(EngineState::Starting);
        self.running.store(true, Ordering::SeqCst);

        let (publisher, consumer) = event_bridge();
        let consumer_task = spawn_consumer(consumer, sink, Arc::clone(&self.running));

        let detection = DetectionEngine {
            registry: Arc::clone(&self.registry),
            publisher: publisher.clone(),
            running: Arc::clone(&self.running),
            mounts: MountResolver::new(&self.config.mount_table, self.config.mount_grace),
            poll_interval: self.config.poll_interval,
        };

        let (ready_tx, ready_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("usb-monitor".to_string())
            .spawn(move || detection.run(ready_tx));

        let engine_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                publisher.close();
                consumer_task.abort();
                self.state.set(EngineState::Stopped);
                return Err(common::Error::Other(format!(
                    "failed to spawn monitor thread: {e}"
                )));
            }
        };

        let startup = ready_rx.recv().unwrap_or_else(|_| {
            Err(common::Error::Monitor(
                "monitor thread exited during startup".to_string(),
            ))
        });

        match startup {
            Ok(()) => {
                self.state.set(EngineState::Running);
                info!("usb watcher running");
                *active = Some(ActiveTasks {
                    engine: engine_thread,
                    consumer: consumer_task,
                    publisher,
                });
                Ok(())
            }
            Err(e) => {
                error!("usb detection failed to start: {}", e);
                self.running.store(false, Ordering::SeqCst);
                publisher.close();
                let _ = engine_thread.join();
                consumer_task.abort();
                self.state.set(EngineState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop detection and tear both tasks down. Idempotent; safe on a
    /// watcher that never started.
    pub fn stop(&self) {
        let mut active = self.active.lock().unwrap();
        let Some(tasks) = active.take() else {
            return;
        };

        self.state.set(EngineState::Stopping);
        self.running.store(false, Ordering::SeqCst);

        // Closing the bridge wakes a blocked backpressure wait on the engine
        // side and a blocked receive on the consumer side.
        tasks.publisher.close();

        if tasks.engine.join().is_err() {
            error!("usb monitor thread panicked");
        }
        tasks.consumer.abort();

        self.state.set(EngineState::Stopped);
        info!("usb watcher stopped");
    }

    /// Point-in-time snapshot of the currently attached devices, optionally
    /// filtered by exact vendor/product ID.
    pub fn list_devices(&self, filter: &DeviceFilter) -> Vec<DeviceRecord> {
        self.registry.lock().unwrap().snapshot(filter)
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }
}

impl Drop for UsbWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The perpetual consumer loop: wait for the next event, dispatch it to the
/// sink, acknowledge, repeat. Exits without dispatching once the watcher has
/// stopped, even if an event was still sitting in the slot.
fn spawn_consumer(
    consumer: EventConsumer,
    sink: Arc<dyn DeviceEvents>,
    running: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(event) = consumer.next_event().await else {
                break;
            };
            if !running.load(Ordering::SeqCst) {
                break;
            }

            match event {
                StorageEvent::Added(record) => sink.device_added(record),
                StorageEvent::Removed(record) => sink.device_removed(record),
            }

            if consumer.mark_handled().await.is_err() {
                break;
            }
        }
    })
}
