use std::future::Future;
use std::pin::Pin;

use crate::error::Error;
use crate::types::*;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations the session core needs from the credential/backend
/// collaborator.
///
/// One trait per collaborator (not per HTTP verb) so tests can substitute a
/// scripted backend without standing up a server. Object-safe via explicit
/// [`BoxFuture`] returns; use `Arc<dyn SessionBackend>`.
pub trait SessionBackend: Send + Sync {
    /// Best-effort teardown of any other active sessions for this account.
    fn end_existing(&self) -> BoxFuture<'_, Result<(), Error>>;

    /// Short-lived provider credential. An empty token is the caller's
    /// problem to reject; the wire contract allows it.
    fn fetch_credential(&self) -> BoxFuture<'_, Result<Credential, Error>>;

    /// Register the tracked session once a provider session id exists.
    fn start_session(
        &self,
        req: StartSessionRequest,
    ) -> BoxFuture<'_, Result<StartSessionResponse, Error>>;

    /// Reconciliation heartbeat against the backend's authoritative clock.
    fn heartbeat(&self, req: HeartbeatRequest) -> BoxFuture<'_, Result<HeartbeatResponse, Error>>;

    fn session_status(&self, query: StatusQuery) -> BoxFuture<'_, Result<SessionStatus, Error>>;

    fn end_session(&self, req: EndSessionRequest) -> BoxFuture<'_, Result<(), Error>>;

    fn save_transcript(
        &self,
        req: SaveTranscriptRequest,
        mode: SaveMode,
    ) -> BoxFuture<'_, Result<SaveTranscriptResponse, Error>>;

    /// Fire-and-forget downstream analysis request; failures are ignored by
    /// every caller.
    fn analyze_transcript(&self, req: AnalyzeRequest) -> BoxFuture<'_, Result<(), Error>>;
}
