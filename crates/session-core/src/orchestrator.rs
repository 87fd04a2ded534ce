//! Session lifecycle orchestration.
//!
//! One orchestrator instance owns at most one session at a time. `start` and
//! `end` are both idempotent-guarded with atomic latches, and every awaited
//! step of a start attempt is stamped with a request sequence number so a
//! concurrent end (or a newer start) invalidates the steps still in flight
//! instead of racing them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use rehearsal_avatar_interface::{
    AvatarProvider, ConnectRequest, EventStream, InMemoryPrewarmStore, PrewarmStore, ProviderEvent,
};
use rehearsal_backend_api::{EndSessionRequest, SessionBackend, StartSessionRequest};
use rehearsal_storage::{FsMirror, SessionStore};
use rehearsal_transcript::{TranscriptAggregator, TranscriptLine};
use tokio::task::JoinHandle;

use crate::config::{GovernanceConfig, SessionConfig, Timings};
use crate::error::Error;
use crate::events::{NullObserver, SessionObserver};
use crate::governance::{Governance, GovernanceHooks, GovernanceIds};
use crate::persistence::{PersistencePipeline, SaveMetadata, SaveReport};
use crate::session::{EndReason, Session, SessionState};

pub struct OrchestratorBuilder {
    provider: Arc<dyn AvatarProvider>,
    backend: Arc<dyn SessionBackend>,
    store: SessionStore,
    prewarm: Arc<dyn PrewarmStore>,
    observer: Arc<dyn SessionObserver>,
    timings: Timings,
    governance: GovernanceConfig,
}

impl OrchestratorBuilder {
    pub fn new(
        provider: Arc<dyn AvatarProvider>,
        backend: Arc<dyn SessionBackend>,
        store: SessionStore,
    ) -> Self {
        Self {
            provider,
            backend,
            store,
            prewarm: Arc::new(InMemoryPrewarmStore::new()),
            observer: Arc::new(NullObserver),
            timings: Timings::default(),
            governance: GovernanceConfig::default(),
        }
    }

    pub fn prewarm(mut self, prewarm: Arc<dyn PrewarmStore>) -> Self {
        self.prewarm = prewarm;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn governance(mut self, governance: GovernanceConfig) -> Self {
        self.governance = governance;
        self
    }

    pub fn build(self) -> SessionOrchestrator {
        let pipeline = PersistencePipeline::new(
            self.backend.clone(),
            self.store.clone(),
            self.timings.save_timeout,
        );
        SessionOrchestrator {
            inner: Arc::new(Inner {
                provider: self.provider,
                backend: self.backend,
                store: self.store,
                prewarm: self.prewarm,
                observer: self.observer,
                timings: self.timings,
                governance_config: self.governance,
                pipeline,
                busy: AtomicBool::new(false),
                ending: AtomicBool::new(false),
                request_seq: AtomicU64::new(0),
                state: Mutex::new(SessionState::Idle),
                session: Mutex::new(None),
                config: Mutex::new(None),
                aggregator: Mutex::new(TranscriptAggregator::new()),
                governance: Mutex::new(None),
                relay: Mutex::new(None),
                held_provider: AtomicBool::new(false),
                started_at: Mutex::new(None),
            }),
        }
    }
}

struct Inner {
    provider: Arc<dyn AvatarProvider>,
    backend: Arc<dyn SessionBackend>,
    store: SessionStore,
    prewarm: Arc<dyn PrewarmStore>,
    observer: Arc<dyn SessionObserver>,
    timings: Timings,
    governance_config: GovernanceConfig,
    pipeline: PersistencePipeline,

    /// True from start acceptance until the matching end completes.
    busy: AtomicBool,
    /// True while one end transition runs; concurrent ends are dropped.
    ending: AtomicBool,
    /// Stamp for in-flight start steps. Bumped by every accepted start and
    /// every accepted end, invalidating older awaited steps.
    request_seq: AtomicU64,

    state: Mutex<SessionState>,
    session: Mutex<Option<Session>>,
    config: Mutex<Option<SessionConfig>>,
    aggregator: Mutex<TranscriptAggregator>,
    governance: Mutex<Option<Governance>>,
    relay: Mutex<Option<JoinHandle<()>>>,
    /// Whether we currently hold a provider session that needs `stop`.
    held_provider: AtomicBool,
    started_at: Mutex<Option<tokio::time::Instant>>,
}

#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    pub fn builder(
        provider: Arc<dyn AvatarProvider>,
        backend: Arc<dyn SessionBackend>,
        store: SessionStore,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(provider, backend, store)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().expect("state poisoned")
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.session.lock().expect("session poisoned").clone()
    }

    /// Committed transcript lines so far, by value.
    pub fn transcript(&self) -> Vec<TranscriptLine> {
        self.inner
            .aggregator
            .lock()
            .expect("aggregator poisoned")
            .snapshot()
    }

    /// Begin a session, resolving with the session record once streaming.
    /// Rejected while another session is active or starting; the caller
    /// retries after the previous one ends.
    pub async fn start(&self, config: SessionConfig) -> Result<Session, Error> {
        if self.inner.busy.swap(true, Ordering::SeqCst) {
            tracing::warn!("session_start_rejected_busy");
            return Err(Error::SessionActive);
        }
        let seq = self.inner.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(persona_id = %config.persona_id, "session_start_accepted");

        match self.start_inner(config, seq).await {
            Ok(session) => Ok(session),
            Err(error) => {
                // An end (or newer start) that superseded us owns the
                // latches now; only a still-current attempt cleans up.
                if self.inner.request_seq.load(Ordering::SeqCst) == seq {
                    tracing::warn!(%error, "session_start_failed");
                    self.set_state(SessionState::Failed);
                    self.inner.busy.store(false, Ordering::SeqCst);
                }
                Err(error)
            }
        }
    }

    async fn start_inner(&self, config: SessionConfig, seq: u64) -> Result<Session, Error> {
        let inner = &self.inner;

        self.set_state(SessionState::Requesting);
        {
            let mut session = inner.session.lock().expect("session poisoned");
            *session = Some(Session::new());
        }
        {
            let mut aggregator = inner.aggregator.lock().expect("aggregator poisoned");
            *aggregator = TranscriptAggregator::with_mirror(Box::new(FsMirror::new(
                inner.store.clone(),
            )));
        }
        inner.store.clear_live_transcript();
        *inner.config.lock().expect("config poisoned") = Some(config.clone());

        // Best-effort teardown of anything left over, then a pause so the
        // server-side cleanup can land before we create a new session.
        if inner.held_provider.swap(false, Ordering::SeqCst)
            && let Err(error) = inner.provider.stop().await
        {
            tracing::warn!(%error, "stale_provider_stop_failed");
        }
        if let Err(error) = inner.backend.end_existing().await {
            tracing::warn!(%error, "existing_session_teardown_failed");
        }
        tokio::time::sleep(inner.timings.cleanup_delay).await;
        self.ensure_current(seq)?;

        let prewarmed = inner
            .prewarm
            .take(&config.persona_id)
            .filter(|p| p.live_stream.is_some());

        if let Some(prewarmed) = prewarmed {
            tracing::info!(
                provider_session_id = %prewarmed.provider_session_id,
                "prewarmed_session_adopted"
            );
            inner.held_provider.store(true, Ordering::SeqCst);
            self.with_session(|s| s.provider_session_id = Some(prewarmed.provider_session_id));
        } else {
            let credential = inner
                .backend
                .fetch_credential()
                .await
                .map_err(|e| Error::Credential(e.to_string()))?;
            if credential.token.trim().is_empty() {
                return Err(Error::Credential("empty credential token".to_string()));
            }
            self.ensure_current(seq)?;

            let provider_session = inner
                .provider
                .connect(ConnectRequest {
                    credential: credential.token,
                    persona_id: config.persona_id.clone(),
                    knowledge: config.knowledge.clone(),
                })
                .await
                .map_err(|e| match e {
                    rehearsal_avatar_interface::Error::Rejected(message) => {
                        Error::ProviderRejected(message)
                    }
                    other => Error::Provider(other),
                })?;
            // Held from this point on so a failed readiness wait still
            // tears the provider session down.
            inner.held_provider.store(true, Ordering::SeqCst);
            self.with_session(|s| s.provider_session_id = Some(provider_session.session_id));

            self.set_state(SessionState::AwaitingStream);
            self.await_stream_ready().await?;
        }
        self.ensure_current(seq)?;

        // Registration failure is tolerated: the session runs untracked and
        // the governor falls back to its local countdown.
        let provider_session_id = self
            .session()
            .and_then(|s| s.provider_session_id)
            .unwrap_or_default();
        match inner
            .backend
            .start_session(StartSessionRequest {
                provider_session_id: provider_session_id.clone(),
                scenario_id: config.scenario_id.clone(),
                avatar_id: config.persona_id.clone(),
                mode: config.mode.clone(),
            })
            .await
        {
            Ok(response) => {
                self.with_session(|s| s.backend_session_id = Some(response.session.id));
            }
            Err(error) => {
                tracing::warn!(%error, "session_registration_failed");
            }
        }
        self.ensure_current(seq)?;

        self.set_state(SessionState::Streaming);
        *inner.started_at.lock().expect("started_at poisoned") =
            Some(tokio::time::Instant::now());
        tracing::info!(provider_session_id = %provider_session_id, "session_streaming");

        let backend_session_id = self.session().and_then(|s| s.backend_session_id);
        let governance = Governance::start(
            inner.provider.clone(),
            inner.backend.clone(),
            GovernanceIds {
                provider_session_id,
                backend_session_id,
            },
            inner.governance_config,
            &inner.timings,
            self.governance_hooks(),
        );
        *inner.governance.lock().expect("governance poisoned") = Some(governance);

        let relay = tokio::spawn(relay_loop(self.clone(), inner.provider.subscribe()));
        *inner.relay.lock().expect("relay poisoned") = Some(relay);

        // An end can race in between the seq check above and the two stores;
        // it finds the slots still empty and drains nothing. Re-check and
        // drain here so the tasks never outlive the session.
        if let Err(error) = self.ensure_current(seq) {
            let governance = inner
                .governance
                .lock()
                .expect("governance poisoned")
                .take();
            if let Some(governance) = governance {
                governance.stop().await;
            }
            if let Some(relay) = inner.relay.lock().expect("relay poisoned").take() {
                relay.abort();
            }
            return Err(error);
        }

        self.session().ok_or(Error::Superseded)
    }

    fn governance_hooks(&self) -> GovernanceHooks {
        let on_remaining = {
            let observer = self.inner.observer.clone();
            Box::new(move |remaining| observer.on_remaining(remaining)) as Box<dyn Fn(i64) + Send + Sync>
        };
        let on_warning = {
            let observer = self.inner.observer.clone();
            Box::new(move || observer.on_warning()) as Box<dyn Fn() + Send + Sync>
        };
        let on_expired = {
            let handle = self.clone();
            Box::new(move || {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle.end(EndReason::TimeLimit).await;
                });
            }) as Box<dyn Fn() + Send + Sync>
        };
        GovernanceHooks {
            on_remaining,
            on_warning,
            on_expired,
        }
    }

    /// Wait for the media stream. The ready event is raced against a bounded
    /// property poll (the event is known to not always fire) and a hard
    /// timeout, with one last poll at the deadline before giving up.
    async fn await_stream_ready(&self) -> Result<(), Error> {
        let inner = &self.inner;
        let timeout = inner.timings.readiness_timeout;

        let mut events = inner.provider.subscribe();
        let ready_event = async move {
            while let Some(event) = events.next().await {
                if matches!(event, ProviderEvent::StreamReady) {
                    tracing::debug!("stream_ready_event_received");
                    return;
                }
            }
            // Stream closed without the event; leave it to the other arms.
            std::future::pending::<()>().await
        };

        let ready_poll = async {
            for _ in 0..inner.timings.readiness_poll_attempts {
                if inner.provider.live_stream().is_some() {
                    tracing::debug!("stream_ready_by_poll");
                    return;
                }
                tokio::time::sleep(inner.timings.readiness_poll_interval).await;
            }
            std::future::pending::<()>().await
        };

        tokio::select! {
            _ = ready_event => Ok(()),
            _ = ready_poll => Ok(()),
            _ = tokio::time::sleep(timeout) => {
                if inner.provider.live_stream().is_some() {
                    tracing::debug!("stream_ready_at_deadline");
                    Ok(())
                } else {
                    Err(Error::StreamTimeout { waited: timeout })
                }
            }
        }
    }

    /// End the session and persist its transcript. Returns `None` when no
    /// session is in an endable state or another end is already running;
    /// exactly one caller per session observes the save report.
    pub async fn end(&self, reason: EndReason) -> Option<SaveReport> {
        let inner = &self.inner;
        if inner.ending.swap(true, Ordering::SeqCst) {
            return None;
        }
        let endable = matches!(
            self.state(),
            SessionState::Requesting | SessionState::AwaitingStream | SessionState::Streaming
        );
        if !endable {
            inner.ending.store(false, Ordering::SeqCst);
            return None;
        }

        // Invalidate any start step still awaiting.
        inner.request_seq.fetch_add(1, Ordering::SeqCst);
        tracing::info!(reason = reason.as_str(), "session_ending");
        self.set_state(SessionState::Ending);

        let governance = inner
            .governance
            .lock()
            .expect("governance poisoned")
            .take();
        if let Some(governance) = governance {
            governance.stop().await;
        }
        if let Some(relay) = inner.relay.lock().expect("relay poisoned").take() {
            relay.abort();
        }

        let lines = {
            let mut aggregator = inner.aggregator.lock().expect("aggregator poisoned");
            aggregator.finalize_all();
            aggregator.strip_control_phrases();
            aggregator.snapshot()
        };

        if inner.held_provider.swap(false, Ordering::SeqCst)
            && let Err(error) = inner.provider.stop().await
        {
            tracing::warn!(%error, "provider_stop_failed");
        }

        let (backend_session_id, provider_session_id) = {
            let session = inner.session.lock().expect("session poisoned");
            match session.as_ref() {
                Some(s) => (s.backend_session_id.clone(), s.provider_session_id.clone()),
                None => (None, None),
            }
        };
        if let Err(error) = inner
            .backend
            .end_session(EndSessionRequest {
                session_id: backend_session_id.clone(),
                provider_session_id,
                reason: reason.as_str().to_string(),
            })
            .await
        {
            tracing::warn!(%error, "session_end_report_failed");
        }

        let report = inner.pipeline.save(lines, self.save_metadata()).await;

        {
            let mut session = inner.session.lock().expect("session poisoned");
            if let Some(s) = session.as_mut() {
                s.state = SessionState::Ended;
                s.end_reason = Some(reason);
            }
        }
        self.set_state(SessionState::Ended);
        inner.busy.store(false, Ordering::SeqCst);
        inner.ending.store(false, Ordering::SeqCst);
        tracing::info!(reason = reason.as_str(), "session_ended");
        Some(report)
    }

    /// Cancel the avatar's current utterance. Valid only while streaming.
    pub async fn interrupt(&self) {
        if self.state() != SessionState::Streaming {
            return;
        }
        if let Err(error) = self.inner.provider.interrupt().await {
            tracing::warn!(%error, "avatar_interrupt_failed");
        }
    }

    /// The application returned to the foreground: trigger an immediate
    /// keepalive ping instead of waiting out the interval.
    pub fn notify_foreground(&self) {
        if let Some(governance) = self
            .inner
            .governance
            .lock()
            .expect("governance poisoned")
            .as_ref()
        {
            governance.notify_foreground();
        }
    }

    fn save_metadata(&self) -> SaveMetadata {
        let inner = &self.inner;
        let config = inner
            .config
            .lock()
            .expect("config poisoned")
            .clone()
            .unwrap_or_default();
        let session_id = self
            .session()
            .and_then(|s| s.backend_session_id.or(s.provider_session_id))
            .unwrap_or_else(|| self.session().map(|s| s.local_id).unwrap_or_default());
        let duration_sec = inner
            .started_at
            .lock()
            .expect("started_at poisoned")
            .take()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);
        SaveMetadata {
            session_id,
            avatar_id: config.persona_id,
            duration_sec,
            topic: config.topic,
            instructions: config.instructions,
            user_id: config.user_id,
            scenario_id: config.scenario_id,
            skill_id: config.skill_id,
            mode: config.mode,
            max_duration_sec: inner.governance_config.max_duration_sec,
        }
    }

    fn ensure_current(&self, seq: u64) -> Result<(), Error> {
        if self.inner.request_seq.load(Ordering::SeqCst) != seq {
            tracing::info!("session_start_superseded");
            return Err(Error::Superseded);
        }
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        *self.inner.state.lock().expect("state poisoned") = state;
        if let Some(s) = self
            .inner
            .session
            .lock()
            .expect("session poisoned")
            .as_mut()
        {
            s.state = state;
        }
        self.inner.observer.on_state(state);
    }

    fn with_session(&self, f: impl FnOnce(&mut Session)) {
        if let Some(s) = self
            .inner
            .session
            .lock()
            .expect("session poisoned")
            .as_mut()
        {
            f(s);
        }
    }
}

/// Relay provider speech events into the aggregator. Runs until the stream
/// closes, the session ends (abort), or the provider disconnects.
async fn relay_loop(handle: SessionOrchestrator, mut events: EventStream) {
    while let Some(event) = events.next().await {
        match event {
            ProviderEvent::SpeechFragment { speaker, text } => {
                handle
                    .inner
                    .aggregator
                    .lock()
                    .expect("aggregator poisoned")
                    .append_fragment(speaker, &text);
            }
            ProviderEvent::SpeechEnded { speaker } => {
                let line = {
                    let mut aggregator = handle
                        .inner
                        .aggregator
                        .lock()
                        .expect("aggregator poisoned");
                    if aggregator.finalize(speaker) {
                        aggregator.lines().last().cloned()
                    } else {
                        None
                    }
                };
                if let Some(line) = line {
                    handle.inner.observer.on_line(&line);
                }
            }
            ProviderEvent::StreamDisconnected { reason } => {
                tracing::warn!(?reason, "provider_stream_disconnected");
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle.end(EndReason::StreamDisconnected).await;
                });
                break;
            }
            ProviderEvent::StreamReady | ProviderEvent::SpeechStarted { .. } => {}
        }
    }
}
