//! Coordinated shutdown signalling.
//!
//! Connection handlers register themselves and select on the shutdown
//! receiver so they can flush a close frame before the server stops
//! accepting. The RAII guard keeps an accurate live-connection count
//! without relying on handlers remembering to deregister.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
    active: Arc<AtomicUsize>,
}

/// Decrements the active-connection count on drop.
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.active.fetch_sub(1, Ordering::Release);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register a connection handler. Returns the guard that tracks its
    /// lifetime and a receiver that flips to `true` on shutdown.
    pub fn register(&self) -> (ConnectionGuard, watch::Receiver<bool>) {
        let _ = self.active.fetch_add(1, Ordering::AcqRel);
        (
            ConnectionGuard {
                active: Arc::clone(&self.active),
            },
            self.tx.subscribe(),
        )
    }

    /// Observe the shutdown signal without counting as a connection.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Signal every registered handler to wind down. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}
