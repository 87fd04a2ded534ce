//! Session lifecycle core for realtime avatar practice sessions.
//!
//! The orchestrator establishes a streaming session against the external
//! realtime provider, races its unreliable readiness signals against a
//! bounded poll and a hard timeout, relays speech events into the transcript
//! aggregator, enforces provider keepalive and an absolute duration ceiling,
//! and persists the finished transcript with bounded retry and a local
//! fallback. Every externally-triggered operation (start, end, save) is
//! idempotent-guarded: provider events are not exactly-once, and a user can
//! press "end" while the duration governor fires the same transition.

pub mod config;
mod error;
mod events;
pub mod governance;
mod orchestrator;
pub mod persistence;
mod session;
pub mod testing;

pub use config::{GovernanceConfig, SessionConfig, Timings};
pub use error::Error;
pub use events::{NullObserver, SessionObserver};
pub use governance::{Countdown, Governance, GovernanceHooks, GovernorEvent};
pub use orchestrator::{OrchestratorBuilder, SessionOrchestrator};
pub use persistence::{PersistencePipeline, SaveMetadata, SaveReport};
pub use session::{EndReason, Session, SessionState};
