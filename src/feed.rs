//! Activity feed mutation hook.
//!
//! CRUD handlers call [`log_activity`] after a write: the entry is appended
//! to the store and pushed to every attached realtime client in the same
//! call, outside the poll cadence. Recording is best-effort -- a store
//! failure is logged and the triggering request still succeeds, matching
//! the feed's informational role.

use crate::broadcast::Broadcaster;
use crate::store::{Activity, NewActivity, Store};

/// Record an activity entry and broadcast it immediately.
///
/// Returns the stored entry, or `None` if persistence failed.
pub fn log_activity(
    store: &Store,
    broadcaster: &Broadcaster,
    entry: NewActivity,
) -> Option<Activity> {
    match store.append_activity(entry) {
        Ok(activity) => {
            match serde_json::to_value(&activity) {
                Ok(data) => broadcaster.push_activity(data),
                Err(e) => tracing::error!(error = %e, "failed to serialize activity"),
            }
            Some(activity)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to record activity");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::cache::{FleetView, SessionCache};
    use crate::connectivity::ConnectivityMonitor;
    use crate::gateway::{GatewayClient, GatewayConfig};
    use crate::protocol::{Envelope, EnvelopeKind};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_broadcaster() -> Broadcaster {
        let gateway = GatewayClient::spawn(GatewayConfig {
            base_url: "http://127.0.0.1:1".into(),
            probe_interval: Duration::from_secs(3600),
            ..Default::default()
        });
        let monitor = ConnectivityMonitor::new();
        let view = Arc::new(FleetView::new(
            gateway,
            SessionCache::new(Duration::from_secs(5)),
            monitor.clone(),
        ));
        Broadcaster::new(view, monitor)
    }

    #[tokio::test]
    async fn logs_and_broadcasts_in_one_call() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let broadcaster = test_broadcaster();
        let (_id, mut rx) = broadcaster.attach("admin").await;
        // Drain welcome + snapshot.
        let _ = rx.recv().await.unwrap();
        let _ = rx.recv().await.unwrap();

        let activity = log_activity(
            &store,
            &broadcaster,
            NewActivity {
                kind: "task".into(),
                actor: "admin".into(),
                action: "created".into(),
                target_type: Some("task".into()),
                target_id: Some("t1".into()),
                metadata: Value::Null,
            },
        )
        .expect("activity recorded");

        assert_eq!(store.list_activity(10, 0, None).len(), 1);

        let payload = rx.recv().await.unwrap();
        let envelope: Envelope = serde_json::from_slice(&payload).unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Activity);
        assert_eq!(envelope.data.unwrap()["id"], Value::String(activity.id));
    }
}
