//! Realtime fan-out to dashboard clients.
//!
//! The broadcaster is the only owner and only writer of the live connection
//! set. Each attached client gets a bounded mpsc queue: envelopes pushed to
//! one connection preserve push order, and a dead or saturated client is
//! detached without disturbing delivery to the others. Serialization
//! happens once per push; the queues carry the shared wire bytes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::FleetView;
use crate::clock::now_millis;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::protocol::{ClientMessage, Envelope};

/// Per-connection outbound queue depth. A client that cannot drain this many
/// envelopes is considered dead and is detached.
const CLIENT_QUEUE_CAPACITY: usize = 64;

/// One attached dashboard client.
pub struct ClientConnection {
    pub id: u64,
    /// Identity from the verified credential presented at attach.
    pub identity: String,
    pub attached_at: u64,
    tx: mpsc::Sender<Bytes>,
}

/// Fan-out hub for the realtime channel.
///
/// Cloning shares the connection set, the fleet view, and the tick
/// cancellation token.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

struct Inner {
    view: Arc<FleetView>,
    monitor: ConnectivityMonitor,
    clients: RwLock<HashMap<u64, ClientConnection>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl Broadcaster {
    pub fn new(view: Arc<FleetView>, monitor: ConnectivityMonitor) -> Self {
        Self {
            inner: Arc::new(Inner {
                view,
                monitor,
                clients: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register an authenticated connection.
    ///
    /// The returned receiver yields the connection's outbound wire bytes.
    /// A `welcome` envelope and one full `session-status` snapshot are
    /// queued before the connection joins the fan-out set, so every new
    /// client sees state without waiting for the next poll tick.
    pub async fn attach(&self, identity: &str) -> (u64, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        enqueue(&tx, id, &Envelope::welcome(identity));
        let sessions = self.inner.view.sessions().await;
        enqueue(&tx, id, &Envelope::session_status(&sessions));

        let connection = ClientConnection {
            id,
            identity: identity.to_string(),
            attached_at: now_millis(),
            tx,
        };
        self.inner.clients.write().insert(id, connection);
        tracing::debug!(client = id, identity, "client attached");
        (id, rx)
    }

    /// Remove a connection from the fan-out set. Idempotent -- safe to call
    /// on an already-removed id.
    pub fn detach(&self, id: u64) {
        if self.inner.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "client detached");
        }
    }

    /// Number of currently attached clients.
    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Serialize once and deliver to every attached connection.
    ///
    /// A failed delivery detaches that one connection; it never blocks or
    /// aborts delivery to the rest.
    pub fn push(&self, envelope: &Envelope) {
        let payload = match envelope.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize envelope, dropping");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let clients = self.inner.clients.read();
            for (id, connection) in clients.iter() {
                match connection.tx.try_send(payload.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(client = *id, "outbound queue full, detaching slow client");
                        dead.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }
        for id in dead {
            self.detach(id);
        }
    }

    /// Fetch the current fleet view and push a `session-status` snapshot.
    ///
    /// Called by the poll tick, and directly by agent mutation handlers so a
    /// spawn or kill is reflected without waiting for the next tick.
    pub async fn push_snapshot(&self) {
        let sessions = self.inner.view.sessions().await;
        self.push(&Envelope::session_status(&sessions));
    }

    /// Mutation hook: immediate `task-update` delivery.
    pub fn push_task_update(&self, data: serde_json::Value) {
        self.push(&Envelope::task_update(data));
    }

    /// Mutation hook: immediate `activity` delivery.
    pub fn push_activity(&self, data: serde_json::Value) {
        self.push(&Envelope::activity(data));
    }

    /// Handle one inbound client message.
    ///
    /// `ping` is answered with `pong` on that connection only; `subscribe`
    /// is acknowledged without enforcing any filtering. Malformed input is
    /// logged and dropped -- the connection stays open.
    pub fn handle_client_message(&self, id: u64, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping) => self.send_to(id, &Envelope::pong()),
            Ok(ClientMessage::Subscribe { payload }) => {
                self.send_to(id, &Envelope::subscribed(payload.channels));
            }
            Err(e) => {
                tracing::warn!(client = id, error = %e, "malformed client message dropped");
            }
        }
    }

    /// Deliver one envelope to a single connection.
    fn send_to(&self, id: u64, envelope: &Envelope) {
        let delivered = {
            let clients = self.inner.clients.read();
            match clients.get(&id) {
                Some(connection) => match envelope.to_bytes() {
                    Ok(payload) => connection.tx.try_send(payload).is_ok(),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize envelope, dropping");
                        return;
                    }
                },
                None => return,
            }
        };
        if !delivered {
            self.detach(id);
        }
    }

    /// Start the background poll loop.
    ///
    /// Every `interval` the current fleet view is pushed to all clients,
    /// whether or not anything changed. Connectivity transitions interleave
    /// out-of-band: degradations push an informational `error` envelope
    /// first, and every transition is followed by a fresh snapshot.
    /// [`shutdown`](Broadcaster::shutdown) stops the loop.
    pub fn spawn_tick(&self, interval: Duration) {
        let broadcaster = self.clone();
        let cancel = self.inner.cancel.clone();
        let _ = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip the immediate first tick; attach already snapshots.
            let mut transitions = broadcaster.inner.monitor.subscribe();
            transitions.mark_unchanged();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        broadcaster.push_snapshot().await;
                    }
                    changed = transitions.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let state = *transitions.borrow_and_update();
                        if state != ConnectivityState::Connected {
                            broadcaster.push(&Envelope::degraded(state));
                        }
                        broadcaster.push_snapshot().await;
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    /// Stop the poll loop. Attached connections are closed separately by
    /// the transport's shutdown signal.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

/// Queue an envelope on a connection's channel before it joins the set.
fn enqueue(tx: &mpsc::Sender<Bytes>, id: u64, envelope: &Envelope) {
    match envelope.to_bytes() {
        Ok(payload) => {
            if tx.try_send(payload).is_err() {
                tracing::warn!(client = id, "attach-time envelope dropped");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize envelope, dropping"),
    }
}
