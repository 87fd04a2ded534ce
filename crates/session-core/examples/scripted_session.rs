//! Runs a full scripted session against the in-crate provider and backend
//! doubles, printing lifecycle events and the final save report.
//!
//! ```not_rust
//! cargo run -p session-core --example scripted_session
//! ```

use std::sync::Arc;
use std::time::Duration;

use rehearsal_avatar_interface::{ProviderEvent, Speaker};
use rehearsal_backend_api::{SessionBackend, StatusQuery};
use session_core::testing::{MockBackend, MockProvider};
use session_core::{
    EndReason, SessionConfig, SessionObserver, SessionOrchestrator, SessionState,
};
use rehearsal_storage::SessionStore;
use rehearsal_transcript::TranscriptLine;

struct PrintObserver;

impl SessionObserver for PrintObserver {
    fn on_state(&self, state: SessionState) {
        println!("state: {state:?}");
    }

    fn on_line(&self, line: &TranscriptLine) {
        println!("[{}] {}: {}", line.timestamp, line.speaker, line.text);
    }

    fn on_remaining(&self, remaining_sec: i64) {
        if remaining_sec % 60 == 0 {
            println!("remaining: {remaining_sec}s");
        }
    }

    fn on_warning(&self) {
        println!("warning: session time is almost up");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let dir = tempfile::tempdir()?;
    let provider = Arc::new(MockProvider::new());
    let backend = Arc::new(MockBackend::new());
    let store = SessionStore::new(dir.path());

    provider.ready_on_connect();

    let orchestrator =
        SessionOrchestrator::builder(provider.clone(), backend.clone(), store.clone())
            .observer(Arc::new(PrintObserver))
            .build();

    let session = orchestrator
        .start(SessionConfig {
            persona_id: "persona_demo".to_string(),
            topic: Some("objection handling".to_string()),
            ..Default::default()
        })
        .await?;
    println!("session: {}", session.local_id);

    // One-shot authoritative check, the kind a UI runs when it regains
    // focus; the governor keeps reconciling on its own via heartbeats.
    let status = backend
        .session_status(StatusQuery {
            session_id: session.backend_session_id.clone(),
            provider_session_id: session.provider_session_id.clone(),
        })
        .await?;
    println!("backend remaining: {:?}", status.remaining_sec);

    provider.emit(ProviderEvent::SpeechFragment {
        speaker: Speaker::Avatar,
        text: "Thanks for calling, but we already have a vendor.".to_string(),
    });
    provider.emit(ProviderEvent::SpeechEnded {
        speaker: Speaker::Avatar,
    });
    provider.emit(ProviderEvent::SpeechFragment {
        speaker: Speaker::User,
        text: "Understood. Can I ask what you'd change about them?".to_string(),
    });
    provider.emit(ProviderEvent::SpeechEnded {
        speaker: Speaker::User,
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = orchestrator.end(EndReason::UserEnded).await;
    println!("save report: {report:?}");
    println!("live mirror lines: {}", store.read_live_transcript().len());

    Ok(())
}
