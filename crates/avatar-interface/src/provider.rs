use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use crate::error::Error;
use crate::types::{ConnectRequest, LiveStream, ProviderEvent, ProviderSession};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type EventStream = Pin<Box<dyn Stream<Item = ProviderEvent> + Send>>;

/// Capability contract for the external realtime provider.
///
/// The provider SDK is an opaque external actor with unreliable events:
/// `StreamReady` is not guaranteed to fire even when the stream comes up, so
/// callers must always pair a `subscribe` watcher with a bounded poll of
/// [`live_stream`](AvatarProvider::live_stream).
///
/// # Object safety
///
/// Methods return an explicit [`BoxFuture`] so the trait can be used as
/// `Arc<dyn AvatarProvider>`.
pub trait AvatarProvider: Send + Sync {
    /// Issue the connect request. Resolves with the provider session id,
    /// which may precede stream readiness by several seconds.
    fn connect(&self, req: ConnectRequest) -> BoxFuture<'_, Result<ProviderSession, Error>>;

    /// Subscribe to provider events. Multiple concurrent subscribers are
    /// allowed; the readiness watcher and the speech relay each hold one.
    fn subscribe(&self) -> EventStream;

    /// Poll the live-stream property directly. This is the fallback for the
    /// known provider defect where the stream comes up without an event.
    fn live_stream(&self) -> Option<LiveStream>;

    /// Cancel any in-progress avatar utterance.
    fn interrupt(&self) -> BoxFuture<'_, Result<(), Error>>;

    /// Ping the provider so the session is not torn down as idle.
    fn keep_alive(&self, session_id: &str) -> BoxFuture<'_, Result<(), Error>>;

    /// Terminate the provider session.
    fn stop(&self) -> BoxFuture<'_, Result<(), Error>>;
}
