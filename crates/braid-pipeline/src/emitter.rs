//! Broadcast-based emitter for canonical stream-part batches.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::parts::StreamPart;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-based stream-part emitter.
///
/// Non-blocking: `emit` never awaits. Slow receivers will be dropped
/// (lagged) rather than blocking the sender. Dropping a receiver
/// unsubscribes it; one misbehaving subscriber cannot affect the rest.
pub struct PartEmitter {
    tx: broadcast::Sender<Vec<StreamPart>>,
    emit_count: AtomicU64,
}

impl PartEmitter {
    /// Create a new emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit a batch of parts to all subscribers. Non-blocking.
    ///
    /// Returns the number of receivers that received the batch.
    /// Returns 0 if there are no active subscribers.
    pub fn emit(&self, parts: Vec<StreamPart>) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(parts).unwrap_or(0)
    }

    /// Subscribe to part batches. Returns a receiver that will receive
    /// all batches emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<StreamPart>> {
        self.tx.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the total number of batches emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for PartEmitter {
    fn default() -> Self {
        Self::new()
    }
}
