/// Orchestrator lifecycle states. `Failed` is terminal for the attempt and
/// reachable from `Requesting` or `AwaitingStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Requesting,
    AwaitingStream,
    Streaming,
    Ending,
    Ended,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserEnded,
    TimeLimit,
    StreamDisconnected,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::UserEnded => "user_ended",
            EndReason::TimeLimit => "time_limit",
            EndReason::StreamDisconnected => "stream_disconnected",
        }
    }
}

/// One streaming conversation. Owned exclusively by the orchestrator:
/// written once at creation, mutated only by orchestrator transitions.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Session {
    /// Client-generated, always present.
    pub local_id: String,
    /// Assigned when the provider accepts the connect request; may arrive
    /// before the media stream is ready.
    pub provider_session_id: Option<String>,
    /// Assigned by tracked-session registration with the backend.
    pub backend_session_id: Option<String>,
    pub state: SessionState,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub end_reason: Option<EndReason>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            provider_session_id: None,
            backend_session_id: None,
            state: SessionState::Requesting,
            started_at: chrono::Utc::now(),
            end_reason: None,
        }
    }
}
