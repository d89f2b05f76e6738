use serde::{Deserialize, Serialize};

/// Validate a session label. Labels must be 1-64 chars, alphanumeric/hyphens/underscores/dots.
pub fn validate_label(label: &str) -> Result<(), String> {
    if label.is_empty() {
        return Err("session label must not be empty".into());
    }
    if label.len() > 64 {
        return Err(format!("session label too long ({} chars, max 64)", label.len()));
    }
    if !label
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(format!(
            "session label contains invalid characters: {}",
            &label[..label.len().min(64)]
        ));
    }
    Ok(())
}

/// Lifecycle state the gateway reports for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Idle,
    Blocked,
    Stopped,
}

/// One externally-managed agent session.
///
/// The gateway owns the real state; everything this crate holds is a
/// read-only cached copy. Identity is `id` -- `label` is a display name and
/// is not guaranteed unique upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub id: String,
    pub label: String,
    pub status: SessionStatus,
    pub model: String,
    pub created_at: u64,
    pub last_activity_at: u64,
}

/// One transcript entry from a session's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
    pub timestamp: u64,
}

/// Parameters for spawning a new session via the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub label: String,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
