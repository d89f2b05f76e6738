//! Wire envelopes for the realtime channel.
//!
//! Every server→client message is an [`Envelope`]: a tagged `{type, data,
//! timestamp}` unit serialized as JSON text. Client→server messages are the
//! small [`ClientMessage`] set (`ping`, `subscribe`).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::now_millis;
use crate::connectivity::ConnectivityState;
use crate::session::AgentSession;

/// Tag of a server→client envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    SessionStatus,
    TaskUpdate,
    Activity,
    Error,
    Pong,
    Welcome,
    Subscribed,
}

/// The unit sent over the realtime channel.
///
/// `data` is omitted from the wire when absent (`pong` carries none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: u64,
}

impl Envelope {
    /// Build an envelope of the given kind, stamped with the current clock.
    pub fn new(kind: EnvelopeKind, data: Value) -> Self {
        Self {
            kind,
            data: Some(data),
            timestamp: now_millis(),
        }
    }

    /// Liveness reply. Carries no data, only the timestamp.
    pub fn pong() -> Self {
        Self {
            kind: EnvelopeKind::Pong,
            data: None,
            timestamp: now_millis(),
        }
    }

    /// Greeting sent to a freshly authenticated connection.
    pub fn welcome(identity: &str) -> Self {
        Self::new(EnvelopeKind::Welcome, serde_json::json!({ "user": identity }))
    }

    /// Acknowledgement of a `subscribe` request.
    ///
    /// The requested channels are echoed back verbatim. No per-channel
    /// filtering is enforced -- every attached client receives every
    /// broadcast kind regardless of what it subscribed to.
    pub fn subscribed(channels: Vec<String>) -> Self {
        Self::new(
            EnvelopeKind::Subscribed,
            serde_json::json!({ "channels": channels }),
        )
    }

    /// Full fleet snapshot.
    pub fn session_status(sessions: &[AgentSession]) -> Self {
        Self::new(
            EnvelopeKind::SessionStatus,
            serde_json::to_value(sessions).unwrap_or(Value::Array(vec![])),
        )
    }

    /// Immediate task mutation notification.
    pub fn task_update(data: Value) -> Self {
        Self::new(EnvelopeKind::TaskUpdate, data)
    }

    /// Immediate activity feed notification.
    pub fn activity(data: Value) -> Self {
        Self::new(EnvelopeKind::Activity, data)
    }

    /// Informational notice that the backing data source changed quality
    /// (stale cache or synthetic fallback). Lets the UI indicate degraded
    /// mode without treating it as a request failure.
    pub fn degraded(state: ConnectivityState) -> Self {
        Self::new(
            EnvelopeKind::Error,
            serde_json::json!({
                "code": "backend-degraded",
                "connectivity": state,
            }),
        )
    }

    /// Serialize to the JSON text bytes that go on the wire.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Inbound client→server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Liveness check; answered with a `pong` envelope.
    Ping,
    /// Channel subscription request; acknowledged but not enforced.
    Subscribe {
        #[serde(default)]
        payload: SubscribePayload,
    },
}

/// Payload of a `subscribe` message.
#[derive(Debug, Default, Deserialize)]
pub struct SubscribePayload {
    #[serde(default)]
    pub channels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;

    #[test]
    fn kinds_use_kebab_case() {
        assert_eq!(
            serde_json::to_string(&EnvelopeKind::SessionStatus).unwrap(),
            "\"session-status\""
        );
        assert_eq!(
            serde_json::to_string(&EnvelopeKind::TaskUpdate).unwrap(),
            "\"task-update\""
        );
    }

    #[test]
    fn pong_has_no_data_field() {
        let json = serde_json::to_value(Envelope::pong()).unwrap();
        assert_eq!(json["type"], "pong");
        assert!(json.get("data").is_none());
        assert!(json["timestamp"].is_number());
    }

    #[test]
    fn session_status_carries_session_array() {
        let sessions = vec![AgentSession {
            id: "agent-main-001".into(),
            label: "main".into(),
            status: SessionStatus::Running,
            model: "claude-sonnet-4-5".into(),
            created_at: 1,
            last_activity_at: 2,
        }];
        let json = serde_json::to_value(Envelope::session_status(&sessions)).unwrap();
        assert_eq!(json["type"], "session-status");
        assert_eq!(json["data"][0]["id"], "agent-main-001");
    }

    #[test]
    fn degraded_names_the_connectivity_state() {
        let json = serde_json::to_value(Envelope::degraded(ConnectivityState::Mock)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["code"], "backend-degraded");
        assert_eq!(json["data"]["connectivity"], "mock");
    }

    #[test]
    fn subscribed_echoes_channels() {
        let json =
            serde_json::to_value(Envelope::subscribed(vec!["tasks".into(), "agents".into()]))
                .unwrap();
        assert_eq!(json["data"]["channels"][0], "tasks");
        assert_eq!(json["data"]["channels"][1], "agents");
    }

    #[test]
    fn parse_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn parse_subscribe_with_channels() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","payload":{"channels":["feed"]}}"#)
                .unwrap();
        match msg {
            ClientMessage::Subscribe { payload } => assert_eq!(payload.channels, vec!["feed"]),
            ClientMessage::Ping => panic!("expected subscribe"),
        }
    }

    #[test]
    fn parse_subscribe_without_payload() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"subscribe"}"#).unwrap();
        match msg {
            ClientMessage::Subscribe { payload } => assert!(payload.channels.is_empty()),
            ClientMessage::Ping => panic!("expected subscribe"),
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn envelope_bytes_are_valid_json() {
        let bytes = Envelope::pong().to_bytes().unwrap();
        let back: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.kind, EnvelopeKind::Pong);
    }
}
