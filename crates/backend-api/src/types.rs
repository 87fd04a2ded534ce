use rehearsal_transcript::TranscriptLine;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Credential {
    pub token: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub provider_session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    pub avatar_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StartSessionResponse {
    pub session: StartedSession,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub id: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub session_id: String,
    pub provider_session_id: String,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub should_end: bool,
    #[serde(default)]
    pub remaining_sec: Option<i64>,
    #[serde(default)]
    pub warning_active: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_session_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    #[serde(default)]
    pub remaining_sec: Option<i64>,
    #[serde(default)]
    pub is_expired: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_session_id: Option<String>,
    pub reason: String,
}

/// Contextual session configuration attached to a saved transcript.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfigInfo {
    pub avatar_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub max_duration_sec: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTranscriptRequest {
    /// Client-generated, so the id is known even if the network call fails.
    /// The endpoint must be safely callable twice with the same id.
    pub transcript_id: String,
    pub session_id: String,
    pub avatar_id: String,
    pub messages: Vec<TranscriptLine>,
    pub duration_sec: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    pub session_config: SessionConfigInfo,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTranscriptResponse {
    pub success: bool,
    #[serde(default)]
    pub transcript_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalyzeRequest {
    pub transcript: AnalyzePayload,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalyzePayload {
    pub messages: Vec<TranscriptLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// How a transcript save request should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// First attempt: plain request under the bounded save timeout.
    Normal,
    /// Retry: cache-bypassing headers and a keep-alive delivery hint, for
    /// when the first attempt died to a transient network failure.
    Bypass,
}
