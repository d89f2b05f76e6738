//! Short-TTL session cache and the never-failing fleet read path.
//!
//! [`SessionCache`] absorbs transient gateway errors and bounds the request
//! rate under many concurrently-polling dashboard clients. [`FleetView`]
//! composes the cache with the fallback generator and the connectivity
//! monitor: a read always produces *a* list -- real, stale, or synthetic, in
//! that preference order.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::now_millis;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::fallback;
use crate::gateway::{GatewayClient, GatewayError};
use crate::session::{AgentSession, SpawnRequest, TranscriptMessage};

/// Default freshness window for the cached session list.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Last known session list with its fetch time.
///
/// Replaced wholesale on every successful fetch, never partially mutated.
/// `fetched_at` is cleared by invalidation while `populated` stays set, so
/// an expired entry can still be served as stale data on fetch failure.
struct CacheEntry {
    sessions: Vec<AgentSession>,
    fetched_at: Option<Instant>,
    populated: bool,
}

/// TTL'd holder for the last fetched session list.
pub struct SessionCache {
    ttl: Duration,
    entry: Mutex<CacheEntry>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(CacheEntry {
                sessions: Vec::new(),
                fetched_at: None,
                populated: false,
            }),
        }
    }

    /// Return the cached list if it is still within the TTL.
    pub fn fresh(&self) -> Option<Vec<AgentSession>> {
        let entry = self.entry.lock();
        match entry.fetched_at {
            Some(at) if at.elapsed() < self.ttl => Some(entry.sessions.clone()),
            _ => None,
        }
    }

    /// Return the cached list regardless of age, if one was ever stored.
    pub fn stale(&self) -> Option<Vec<AgentSession>> {
        let entry = self.entry.lock();
        entry.populated.then(|| entry.sessions.clone())
    }

    /// Replace the entry with a freshly fetched list.
    pub fn store(&self, sessions: Vec<AgentSession>) {
        let mut entry = self.entry.lock();
        entry.sessions = sessions;
        entry.fetched_at = Some(Instant::now());
        entry.populated = true;
    }

    /// Force the next read to fetch, keeping the old list around for
    /// stale-on-error serving. Called after every mutating gateway call.
    pub fn invalidate(&self) {
        self.entry.lock().fetched_at = None;
    }
}

/// The fleet read path: cache, then gateway, then stale, then fallback.
///
/// Every adapter outcome observed here drives the connectivity monitor, so
/// state transitions and the data actually served can never disagree.
pub struct FleetView {
    gateway: GatewayClient,
    cache: SessionCache,
    monitor: ConnectivityMonitor,
}

impl FleetView {
    pub fn new(gateway: GatewayClient, cache: SessionCache, monitor: ConnectivityMonitor) -> Self {
        Self {
            gateway,
            cache,
            monitor,
        }
    }

    /// The underlying gateway client, for calls with no cache interaction.
    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Current session list. Never fails.
    ///
    /// Within the TTL the cached list is returned without touching the
    /// gateway. Otherwise a fetch is attempted: success replaces the cache,
    /// failure falls back to the stale list if one exists, and only an empty
    /// cache activates the synthetic fleet.
    pub async fn sessions(&self) -> Vec<AgentSession> {
        if let Some(sessions) = self.cache.fresh() {
            return sessions;
        }

        match self.gateway.list_sessions().await {
            Ok(sessions) => {
                self.cache.store(sessions.clone());
                self.monitor.mark_connected();
                sessions
            }
            Err(e) => match self.cache.stale() {
                Some(sessions) => {
                    tracing::warn!(error = %e, "session fetch failed, serving stale cache");
                    self.monitor.mark_degraded(true);
                    sessions
                }
                None => {
                    tracing::warn!(error = %e, "session fetch failed with empty cache, serving fallback fleet");
                    self.monitor.mark_degraded(false);
                    fallback::fleet(now_millis())
                }
            },
        }
    }

    /// Find one session in the current view. Follows the same preference
    /// order as [`sessions`](FleetView::sessions).
    pub async fn session(&self, id: &str) -> Option<AgentSession> {
        self.sessions().await.into_iter().find(|s| s.id == id)
    }

    /// Spawn a session, then invalidate the cache so the next read reflects
    /// the mutation even inside the TTL window.
    pub async fn spawn(&self, req: &SpawnRequest) -> Result<AgentSession, GatewayError> {
        let result = self.gateway.spawn_session(req).await;
        self.cache.invalidate();
        result
    }

    /// Kill a session, then invalidate the cache.
    pub async fn kill(&self, id: &str) -> Result<(), GatewayError> {
        let result = self.gateway.kill_session(id).await;
        self.cache.invalidate();
        result
    }

    /// Fetch a session transcript, serving the synthetic transcript when
    /// the fallback fleet is active.
    pub async fn transcript(&self, id: &str) -> Result<Vec<TranscriptMessage>, GatewayError> {
        match self.gateway.transcript(id).await {
            Ok(messages) => Ok(messages),
            Err(e @ GatewayError::Unavailable(_))
                if self.monitor.state() == ConnectivityState::Mock =>
            {
                tracing::debug!(error = %e, session = id, "serving fallback transcript");
                Ok(fallback::transcript(id, now_millis()))
            }
            Err(e) => Err(e),
        }
    }
}
