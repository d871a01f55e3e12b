//! Single-slot notification bridge between the monitor thread and Tokio
//!
//! The monitor thread publishes at most one [`StorageEvent`] at a time; the
//! consumer task drains it, invokes the sink callback, and acknowledges. The
//! handshake is two capacity-1 channels: an event slot, and an ack slot that
//! starts primed so the bridge begins in the "previous event handled" state.
//!
//! Backpressure contract: the publisher must claim the ack token with
//! [`EventPublisher::wait_until_handled`] before each publish. `publish`
//! itself does not re-enforce this, but the capacity-1 event slot bounds the
//! channel to one unconsumed event regardless.

use async_channel::{Receiver, Sender, bounded};

use crate::StorageEvent;

/// Publisher half, held by the monitor thread (blocking)
#[derive(Clone)]
pub struct EventPublisher {
    event_tx: Sender<StorageEvent>,
    ack_rx: Receiver<()>,
}

impl EventPublisher {
    /// Block until the consumer has finished with the previous event, then
    /// claim the right to publish the next one.
    ///
    /// Runs before any registry or record mutation for the new event, which
    /// guarantees the consumer fully drained the prior notification first.
    /// Errors only when the bridge has been closed for shutdown.
    pub fn wait_until_handled(&self) -> crate::Result<()> {
        self.ack_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Hand the event to the consumer.
    ///
    /// Must only be called after `wait_until_handled` returned `Ok`; the
    /// event slot is then guaranteed empty and the send does not block in
    /// practice. Errors only on shutdown.
    pub fn publish(&self, event: StorageEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Tear the bridge down, waking every blocked side with a disconnect.
    pub fn close(&self) {
        self.event_tx.close();
        self.ack_rx.close();
    }
}

/// Consumer half, held by the notification task (async)
pub struct EventConsumer {
    event_rx: Receiver<StorageEvent>,
    ack_tx: Sender<()>,
}

impl EventConsumer {
    /// Wait for the next published event.
    ///
    /// Returns `None` once the bridge is closed and drained.
    pub async fn next_event(&self) -> Option<StorageEvent> {
        self.event_rx.recv().await.ok()
    }

    /// Signal that the current event has been fully handled, releasing the
    /// publisher to process the next kernel event.
    pub async fn mark_handled(&self) -> crate::Result<()> {
        self.ack_tx
            .send(())
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the bridge.
///
/// Returns (publisher for the monitor thread, consumer for the Tokio task).
pub fn event_bridge() -> (EventPublisher, EventConsumer) {
    let (event_tx, event_rx) = bounded(1);
    let (ack_tx, ack_rx) = bounded(1);

    // Prime the ack slot: the channel starts empty and ready.
    ack_tx
        .try_send(())
        .expect("fresh ack slot cannot be full or closed");

    (
        EventPublisher { event_tx, ack_rx },
        EventConsumer { event_rx, ack_tx },
    )
}
