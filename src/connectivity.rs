//! Connectivity state machine for the gateway link.
//!
//! Deliberately small: the domain has one real failure mode (gateway
//! unreachable) and one recovery path, so the states only have to separate
//! the two read paths -- "serve real data" and "serve fallback data" -- with
//! `Disconnected` covering the stale-cache middle ground.
//!
//! Transitions are driven only by adapter outcomes. The monitor publishes
//! them on a watch channel; the broadcaster consumes transitions
//! synchronously from there rather than through ad-hoc callbacks.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::gateway::GatewayEvent;

/// Where the current fleet view originates.
///
/// - `Connected`: real gateway data (fresh or within TTL).
/// - `Disconnected`: the gateway is failing but stale cached real data is
///   still being served.
/// - `Mock`: nothing real to serve; the synthetic fallback fleet is active.
///   Sticky until a fetch actually succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Connected,
    Disconnected,
    Mock,
}

/// Outcome-driven monitor publishing [`ConnectivityState`] transitions.
///
/// Entry policy is immediate on both edges: the first failure with an empty
/// cache activates `Mock` in the same call (no grace window), and any
/// successful fetch restores `Connected` immediately. Whether `Mock` should
/// instead wait for confirmed reconnects is a product question; this is the
/// canonical behavior for now.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// Start in `Disconnected`: nothing has resolved yet.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectivityState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Subscribe to transitions. Receivers are only woken on real changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    /// A fetch (or probe) succeeded.
    pub fn mark_connected(&self) {
        self.transition(ConnectivityState::Connected);
    }

    /// A fetch failed. `stale_available` says whether the read path could
    /// still serve cached real data; without it the fallback fleet is
    /// active, which is what `Mock` means. Once in `Mock`, stay there until
    /// a success -- cached data cannot reappear without one.
    pub fn mark_degraded(&self, stale_available: bool) {
        let next = if !stale_available || self.state() == ConnectivityState::Mock {
            ConnectivityState::Mock
        } else {
            ConnectivityState::Disconnected
        };
        self.transition(next);
    }

    fn transition(&self, next: ConnectivityState) {
        let _ = self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            tracing::info!(from = ?*state, to = ?next, "connectivity transition");
            *state = next;
            true
        });
    }

    /// Consume the adapter's edge-triggered liveness events.
    ///
    /// Only `Connected` edges change state here: a recovery observed by the
    /// startup probe (or a mutating call) must flip the read path back to
    /// real data even if no poll is in flight. `Disconnected` edges are
    /// deferred to the next read, which knows whether stale data exists and
    /// can pick `Disconnected` vs `Mock` correctly.
    ///
    /// The task exits when `shutdown` flips true or the event channel
    /// closes.
    pub fn watch_gateway(
        &self,
        mut events: broadcast::Receiver<GatewayEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let monitor = self.clone();
        let _ = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(GatewayEvent::Connected) => monitor.mark_connected(),
                        Ok(GatewayEvent::Disconnected) => {
                            tracing::debug!("gateway edge: disconnected (classified on next read)");
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }
}
