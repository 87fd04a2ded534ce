use std::sync::Mutex;

use crate::types::LiveStream;

/// A provider connection established speculatively, before the user commits
/// to a scenario, to cut perceived latency.
#[derive(Debug, Clone)]
pub struct PrewarmedSession {
    pub persona_id: String,
    pub provider_session_id: String,
    /// Present once the speculative connect has already produced a live
    /// stream. Adoption requires it; a prewarm without a stream is ignored.
    pub live_stream: Option<LiveStream>,
}

/// Holder for at most one pre-warmed session, shared across UI navigations.
///
/// `take` has consume-once semantics: it returns and clears, so no other
/// orchestrator instance can adopt the same prewarmed session.
pub trait PrewarmStore: Send + Sync {
    fn take(&self, persona_id: &str) -> Option<PrewarmedSession>;
    fn put(&self, session: PrewarmedSession);
}

#[derive(Default)]
pub struct InMemoryPrewarmStore {
    slot: Mutex<Option<PrewarmedSession>>,
}

impl InMemoryPrewarmStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrewarmStore for InMemoryPrewarmStore {
    fn take(&self, persona_id: &str) -> Option<PrewarmedSession> {
        let mut slot = self.slot.lock().expect("prewarm slot poisoned");
        match slot.as_ref() {
            Some(s) if s.persona_id == persona_id => slot.take(),
            _ => None,
        }
    }

    fn put(&self, session: PrewarmedSession) {
        let mut slot = self.slot.lock().expect("prewarm slot poisoned");
        *slot = Some(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prewarmed(persona_id: &str) -> PrewarmedSession {
        PrewarmedSession {
            persona_id: persona_id.to_string(),
            provider_session_id: "ps_1".to_string(),
            live_stream: Some(LiveStream {
                stream_id: "stream_1".to_string(),
            }),
        }
    }

    #[test]
    fn take_consumes_the_slot() {
        let store = InMemoryPrewarmStore::new();
        store.put(prewarmed("persona_a"));

        assert!(store.take("persona_a").is_some());
        assert!(store.take("persona_a").is_none());
    }

    #[test]
    fn take_for_other_persona_leaves_slot_intact() {
        let store = InMemoryPrewarmStore::new();
        store.put(prewarmed("persona_a"));

        assert!(store.take("persona_b").is_none());
        assert!(store.take("persona_a").is_some());
    }
}
