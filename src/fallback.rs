//! Synthetic fleet served while the gateway is unreachable.
//!
//! The dashboard stays usable in degraded mode by rendering a small,
//! fixed-shape session set with stable ids. Everything here is a pure
//! function of the supplied clock reading -- no hidden counters -- so two
//! calls at the same instant produce identical output.

use crate::session::{AgentSession, SessionStatus, TranscriptMessage};

const MINUTE: u64 = 60_000;
const HOUR: u64 = 3_600_000;

/// Stable id of the first synthetic session, used by health checks and
/// tests as the marker that fallback data is active.
pub const PRIMARY_SESSION_ID: &str = "agent-main-001";

/// Build the synthetic session list for the given clock reading
/// (epoch milliseconds).
pub fn fleet(now: u64) -> Vec<AgentSession> {
    vec![
        AgentSession {
            id: PRIMARY_SESSION_ID.into(),
            label: "main".into(),
            status: SessionStatus::Running,
            model: "claude-sonnet-4-5".into(),
            created_at: now.saturating_sub(HOUR),
            last_activity_at: now.saturating_sub(5 * MINUTE),
        },
        AgentSession {
            id: "agent-research-001".into(),
            label: "research-agent".into(),
            status: SessionStatus::Idle,
            model: "claude-sonnet-4".into(),
            created_at: now.saturating_sub(2 * HOUR),
            last_activity_at: now.saturating_sub(30 * MINUTE),
        },
        AgentSession {
            id: "agent-code-001".into(),
            label: "code-writer".into(),
            status: SessionStatus::Running,
            model: "claude-sonnet-4-5".into(),
            created_at: now.saturating_sub(30 * MINUTE),
            last_activity_at: now.saturating_sub(MINUTE),
        },
    ]
}

/// Look up one synthetic session by id.
pub fn session(id: &str, now: u64) -> Option<AgentSession> {
    fleet(now).into_iter().find(|s| s.id == id)
}

/// Synthetic transcript for a session id. Unknown ids get an empty
/// transcript, mirroring a session with no conversation yet.
pub fn transcript(id: &str, now: u64) -> Vec<TranscriptMessage> {
    match id {
        "agent-main-001" => vec![
            TranscriptMessage {
                role: "user".into(),
                content: "Deploy the operations dashboard".into(),
                timestamp: now.saturating_sub(10 * MINUTE),
            },
            TranscriptMessage {
                role: "assistant".into(),
                content: "Starting deployment process...".into(),
                timestamp: now.saturating_sub(9 * MINUTE),
            },
        ],
        "agent-research-001" => vec![TranscriptMessage {
            role: "user".into(),
            content: "Research best practices for WebSocket scaling".into(),
            timestamp: now.saturating_sub(HOUR),
        }],
        "agent-code-001" => vec![
            TranscriptMessage {
                role: "user".into(),
                content: "Fix the authentication middleware".into(),
                timestamp: now.saturating_sub(2 * MINUTE),
            },
            TranscriptMessage {
                role: "assistant".into(),
                content: "Analyzing the auth middleware...".into(),
                timestamp: now.saturating_sub(MINUTE),
            },
        ],
        _ => vec![],
    }
}
