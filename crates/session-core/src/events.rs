use rehearsal_transcript::TranscriptLine;

use crate::session::SessionState;

/// How the session core reports back to its embedding application.
///
/// The UI layer implements this to drive its own event surface; the library
/// never assumes a particular host. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    fn on_state(&self, _state: SessionState) {}

    /// A transcript line was appended (not called for supersessions).
    fn on_line(&self, _line: &TranscriptLine) {}

    /// Remaining seconds, emitted on every governor tick.
    fn on_remaining(&self, _remaining_sec: i64) {}

    /// The low-time warning latch fired. At most once per session.
    fn on_warning(&self) {}
}

pub struct NullObserver;

impl SessionObserver for NullObserver {}
