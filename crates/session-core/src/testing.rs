//! Scripted provider and backend doubles.
//!
//! Compiled into the library (not behind `cfg(test)`) so integration tests
//! and examples can drive the orchestrator without a real provider SDK or a
//! running backend.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use rehearsal_avatar_interface::{
    AvatarProvider, ConnectRequest, EventStream, LiveStream, ProviderEvent, ProviderSession,
};
use rehearsal_backend_api::{
    AnalyzeRequest, Credential, EndSessionRequest, HeartbeatRequest, HeartbeatResponse, SaveMode,
    SaveTranscriptRequest, SaveTranscriptResponse, SessionBackend, SessionStatus,
    StartSessionRequest, StartSessionResponse, StartedSession, StatusQuery,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

type ProviderResult<'a, T> = rehearsal_avatar_interface::BoxFuture<'a, T>;
type BackendResult<'a, T> = rehearsal_backend_api::BoxFuture<'a, T>;

/// Provider double. Events are injected with [`emit`](MockProvider::emit);
/// stream readiness is a plain settable property, so tests can exercise the
/// event path, the poll path, or neither.
pub struct MockProvider {
    events: broadcast::Sender<ProviderEvent>,
    live: Mutex<Option<LiveStream>>,
    reject_with: Mutex<Option<String>>,
    ready_on_connect: AtomicBool,
    connect_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    interrupt_calls: AtomicUsize,
    keepalive_calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            live: Mutex::new(None),
            reject_with: Mutex::new(None),
            ready_on_connect: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            interrupt_calls: AtomicUsize::new(0),
            keepalive_calls: AtomicUsize::new(0),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `connect` call fails with this rejection message.
    pub fn reject_with(&self, message: &str) {
        *self.reject_with.lock().unwrap() = Some(message.to_string());
    }

    /// Make the stream observable by polling as soon as `connect` resolves.
    pub fn ready_on_connect(&self) {
        self.ready_on_connect.store(true, Ordering::SeqCst);
    }

    pub fn set_live(&self, stream: Option<LiveStream>) {
        *self.live.lock().unwrap() = stream;
    }

    pub fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine; events before subscribe are simply lost,
        // which is exactly how the real SDK behaves.
        let _ = self.events.send(event);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn interrupt_calls(&self) -> usize {
        self.interrupt_calls.load(Ordering::SeqCst)
    }

    pub fn keepalive_calls(&self) -> usize {
        self.keepalive_calls.load(Ordering::SeqCst)
    }
}

impl AvatarProvider for MockProvider {
    fn connect(
        &self,
        _req: ConnectRequest,
    ) -> ProviderResult<'_, Result<ProviderSession, rehearsal_avatar_interface::Error>> {
        Box::pin(async move {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.reject_with.lock().unwrap().take() {
                return Err(rehearsal_avatar_interface::Error::Rejected(message));
            }
            if self.ready_on_connect.load(Ordering::SeqCst) {
                self.set_live(Some(LiveStream {
                    stream_id: "stream_1".to_string(),
                }));
            }
            Ok(ProviderSession {
                session_id: "ps_1".to_string(),
            })
        })
    }

    fn subscribe(&self) -> EventStream {
        let rx = self.events.subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|event| async move { event.ok() }))
    }

    fn live_stream(&self) -> Option<LiveStream> {
        self.live.lock().unwrap().clone()
    }

    fn interrupt(&self) -> ProviderResult<'_, Result<(), rehearsal_avatar_interface::Error>> {
        Box::pin(async move {
            self.interrupt_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn keep_alive(
        &self,
        _session_id: &str,
    ) -> ProviderResult<'_, Result<(), rehearsal_avatar_interface::Error>> {
        Box::pin(async move {
            self.keepalive_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn stop(&self) -> ProviderResult<'_, Result<(), rehearsal_avatar_interface::Error>> {
        Box::pin(async move {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.set_live(None);
            Ok(())
        })
    }
}

/// Backend double with scripted failures and call accounting.
pub struct MockBackend {
    token: Mutex<String>,
    heartbeat: Mutex<HeartbeatResponse>,
    fail_saves_remaining: AtomicU32,
    save_delay: Mutex<Option<Duration>>,
    save_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
    start_calls: AtomicUsize,
    end_calls: AtomicUsize,
    end_existing_calls: AtomicUsize,
    last_save: Mutex<Option<SaveTranscriptRequest>>,
    last_save_mode: Mutex<Option<SaveMode>>,
    last_end_reason: Mutex<Option<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            token: Mutex::new("tok".to_string()),
            heartbeat: Mutex::new(HeartbeatResponse::default()),
            fail_saves_remaining: AtomicU32::new(0),
            save_delay: Mutex::new(None),
            save_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            end_calls: AtomicUsize::new(0),
            end_existing_calls: AtomicUsize::new(0),
            last_save: Mutex::new(None),
            last_save_mode: Mutex::new(None),
            last_end_reason: Mutex::new(None),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = token.to_string();
    }

    pub fn set_heartbeat(&self, response: HeartbeatResponse) {
        *self.heartbeat.lock().unwrap() = response;
    }

    /// Fail this many upcoming save attempts with a server error.
    pub fn fail_next_saves(&self, count: u32) {
        self.fail_saves_remaining.store(count, Ordering::SeqCst);
    }

    /// Delay every save attempt, for exercising the in-flight latch and the
    /// save timeout.
    pub fn delay_saves(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = Some(delay);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }

    pub fn end_existing_calls(&self) -> usize {
        self.end_existing_calls.load(Ordering::SeqCst)
    }

    pub fn last_save(&self) -> Option<SaveTranscriptRequest> {
        self.last_save.lock().unwrap().clone()
    }

    pub fn last_save_mode(&self) -> Option<SaveMode> {
        *self.last_save_mode.lock().unwrap()
    }

    pub fn last_end_reason(&self) -> Option<String> {
        self.last_end_reason.lock().unwrap().clone()
    }

    fn server_error(message: &str) -> rehearsal_backend_api::Error {
        rehearsal_backend_api::Error::Api {
            status: 500,
            message: message.to_string(),
        }
    }
}

impl SessionBackend for MockBackend {
    fn end_existing(&self) -> BackendResult<'_, Result<(), rehearsal_backend_api::Error>> {
        Box::pin(async move {
            self.end_existing_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn fetch_credential(
        &self,
    ) -> BackendResult<'_, Result<Credential, rehearsal_backend_api::Error>> {
        Box::pin(async move {
            Ok(Credential {
                token: self.token.lock().unwrap().clone(),
            })
        })
    }

    fn start_session(
        &self,
        _req: StartSessionRequest,
    ) -> BackendResult<'_, Result<StartSessionResponse, rehearsal_backend_api::Error>> {
        Box::pin(async move {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            Ok(StartSessionResponse {
                session: StartedSession {
                    id: "backend_1".to_string(),
                    expires_at: None,
                },
            })
        })
    }

    fn heartbeat(
        &self,
        _req: HeartbeatRequest,
    ) -> BackendResult<'_, Result<HeartbeatResponse, rehearsal_backend_api::Error>> {
        Box::pin(async move { Ok(self.heartbeat.lock().unwrap().clone()) })
    }

    fn session_status(
        &self,
        _query: StatusQuery,
    ) -> BackendResult<'_, Result<SessionStatus, rehearsal_backend_api::Error>> {
        Box::pin(async move {
            let heartbeat = self.heartbeat.lock().unwrap();
            Ok(SessionStatus {
                remaining_sec: heartbeat.remaining_sec,
                is_expired: heartbeat.expired,
            })
        })
    }

    fn end_session(
        &self,
        req: EndSessionRequest,
    ) -> BackendResult<'_, Result<(), rehearsal_backend_api::Error>> {
        Box::pin(async move {
            self.end_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_end_reason.lock().unwrap() = Some(req.reason);
            Ok(())
        })
    }

    fn save_transcript(
        &self,
        req: SaveTranscriptRequest,
        mode: SaveMode,
    ) -> BackendResult<'_, Result<SaveTranscriptResponse, rehearsal_backend_api::Error>> {
        Box::pin(async move {
            let delay = *self.save_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_save_mode.lock().unwrap() = Some(mode);
            let transcript_id = req.transcript_id.clone();
            *self.last_save.lock().unwrap() = Some(req);

            let remaining = self.fail_saves_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_saves_remaining
                    .store(remaining.saturating_sub(1), Ordering::SeqCst);
                return Err(Self::server_error("save failed"));
            }
            Ok(SaveTranscriptResponse {
                success: true,
                transcript_id: Some(transcript_id),
            })
        })
    }

    fn analyze_transcript(
        &self,
        _req: AnalyzeRequest,
    ) -> BackendResult<'_, Result<(), rehearsal_backend_api::Error>> {
        Box::pin(async move {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
