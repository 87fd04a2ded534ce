/// Who produced a piece of speech. Closed set; captions from any other
/// source must be mapped onto one of these before they enter the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Avatar,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "User"),
            Speaker::Avatar => write!(f, "Avatar"),
        }
    }
}

/// Events emitted by the streaming provider.
///
/// Delivery is best-effort and **not** exactly-once: `StreamReady` may never
/// fire even though the stream is up (poll [`AvatarProvider::live_stream`] as
/// a fallback), and speech events may repeat. Consumers must be idempotent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    StreamReady,
    StreamDisconnected { reason: Option<String> },
    SpeechStarted { speaker: Speaker },
    SpeechFragment { speaker: Speaker, text: String },
    SpeechEnded { speaker: Speaker },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectRequest {
    pub credential: String,
    pub persona_id: String,
    /// Optional knowledge/context payload forwarded to the persona.
    pub knowledge: Option<String>,
}

/// Assigned as soon as the provider accepts the connect request, which can
/// be well before the media stream itself is ready.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderSession {
    pub session_id: String,
}

/// Opaque handle to the live media stream, observable by polling.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LiveStream {
    pub stream_id: String,
}
