use std::time::Duration;

/// Per-session configuration supplied by the embedding application.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    pub persona_id: String,
    /// Optional knowledge/context payload forwarded to the persona.
    pub knowledge: Option<String>,
    pub scenario_id: Option<String>,
    pub skill_id: Option<String>,
    pub topic: Option<String>,
    pub instructions: Option<String>,
    pub user_id: Option<String>,
    pub mode: Option<String>,
}

/// Session duration ceiling enforced by the governor, independent of the
/// provider's own limits.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub max_duration_sec: u64,
    pub warning_threshold_sec: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            max_duration_sec: 360,
            warning_threshold_sec: 60,
        }
    }
}

/// Timer and timeout knobs. Tests shrink these; production uses the
/// defaults.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Pause after the best-effort teardown of prior sessions, so the
    /// server-side cleanup can land before we create a new one.
    pub cleanup_delay: Duration,
    pub readiness_timeout: Duration,
    pub readiness_poll_interval: Duration,
    pub readiness_poll_attempts: u32,
    pub keepalive_interval: Duration,
    pub countdown_tick: Duration,
    pub reconcile_interval: Duration,
    pub save_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            cleanup_delay: Duration::from_millis(800),
            readiness_timeout: Duration::from_secs(15),
            readiness_poll_interval: Duration::from_millis(250),
            readiness_poll_attempts: 40,
            keepalive_interval: Duration::from_secs(30),
            countdown_tick: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(5),
            save_timeout: Duration::from_secs(10),
        }
    }
}
