use std::sync::Arc;
use std::time::Duration;

use rehearsal_avatar_interface::{
    InMemoryPrewarmStore, LiveStream, PrewarmStore, PrewarmedSession, ProviderEvent, Speaker,
};
use session_core::testing::{MockBackend, MockProvider};
use session_core::{
    EndReason, Error, GovernanceConfig, SaveReport, SessionConfig, SessionOrchestrator,
    SessionState,
};
use rehearsal_storage::SessionStore;
use tempfile::TempDir;

struct Harness {
    orchestrator: SessionOrchestrator,
    provider: Arc<MockProvider>,
    backend: Arc<MockBackend>,
    store: SessionStore,
    _dir: TempDir,
}

fn harness() -> Harness {
    harness_with(|b| b)
}

fn harness_with(
    customize: impl FnOnce(
        session_core::OrchestratorBuilder,
    ) -> session_core::OrchestratorBuilder,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockProvider::new());
    let backend = Arc::new(MockBackend::new());
    let store = SessionStore::new(dir.path());
    let builder =
        SessionOrchestrator::builder(provider.clone(), backend.clone(), store.clone());
    let orchestrator = customize(builder).build();
    Harness {
        orchestrator,
        provider,
        backend,
        store,
        _dir: dir,
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        persona_id: "persona_a".to_string(),
        topic: Some("cold calls".to_string()),
        ..Default::default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_active() {
    let h = harness();
    h.provider.ready_on_connect();

    h.orchestrator.start(config()).await.unwrap();
    assert_eq!(h.orchestrator.state(), SessionState::Streaming);

    let err = h.orchestrator.start(config()).await.unwrap_err();
    assert!(matches!(err, Error::SessionActive));
    assert_eq!(h.provider.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_collapse_to_one_connect() {
    let h = harness();
    h.provider.ready_on_connect();

    let first = h.orchestrator.clone();
    let second = h.orchestrator.clone();
    let (a, b) = tokio::join!(first.start(config()), second.start(config()));

    assert!(a.is_ok() != b.is_ok(), "exactly one start must win");
    let loser = if a.is_err() {
        a.unwrap_err()
    } else {
        b.unwrap_err()
    };
    assert!(matches!(loser, Error::SessionActive));
    assert_eq!(h.provider.connect_calls(), 1);
    assert_eq!(h.orchestrator.state(), SessionState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn end_during_start_supersedes_it_and_leaves_no_timers() {
    let h = harness();
    h.provider.ready_on_connect();

    let starter = h.orchestrator.clone();
    let ender = h.orchestrator.clone();
    let (started, ended) = tokio::join!(starter.start(config()), async move {
        // Let the start win the busy latch before ending it.
        tokio::task::yield_now().await;
        ender.end(EndReason::UserEnded).await
    });

    assert!(matches!(started.unwrap_err(), Error::Superseded));
    assert_eq!(ended, Some(SaveReport::Empty));
    assert_eq!(h.orchestrator.state(), SessionState::Ended);
    assert_eq!(h.provider.connect_calls(), 0);

    // Nothing from the superseded attempt keeps running.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.provider.keepalive_calls(), 0);

    // The latches were released; a fresh start succeeds.
    h.orchestrator.start(config()).await.unwrap();
    assert_eq!(h.orchestrator.state(), SessionState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn stream_readiness_is_found_by_polling_without_the_event() {
    let h = harness();
    // The stream property is up, but StreamReady never fires.
    h.provider.set_live(Some(LiveStream {
        stream_id: "stream_1".to_string(),
    }));

    h.orchestrator.start(config()).await.unwrap();

    assert_eq!(h.orchestrator.state(), SessionState::Streaming);
    assert_eq!(h.backend.start_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_fails_the_attempt_but_allows_retry() {
    let h = harness();

    let err = h.orchestrator.start(config()).await.unwrap_err();
    assert!(matches!(err, Error::StreamTimeout { .. }));
    assert_eq!(h.orchestrator.state(), SessionState::Failed);

    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();
    assert_eq!(h.orchestrator.state(), SessionState::Streaming);
    assert_eq!(h.provider.connect_calls(), 2);
    // The orphaned provider session from the first attempt was torn down.
    assert!(h.provider.stop_calls() >= 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_ends_collapse_to_one_transition() {
    let h = harness();
    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();

    let first = h.orchestrator.clone();
    let second = h.orchestrator.clone();
    let (a, b) = tokio::join!(
        first.end(EndReason::UserEnded),
        second.end(EndReason::UserEnded)
    );

    assert!(a.is_some() != b.is_some(), "exactly one end must win");
    assert_eq!(h.backend.end_calls(), 1);
    assert_eq!(h.orchestrator.state(), SessionState::Ended);

    // A third end after the transition is a no-op too.
    assert!(h.orchestrator.end(EndReason::UserEnded).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn governor_expiry_ends_the_session_with_time_limit() {
    let h = harness_with(|b| {
        b.governance(GovernanceConfig {
            max_duration_sec: 3,
            warning_threshold_sec: 2,
        })
    });
    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.orchestrator.state(), SessionState::Ended);
    assert_eq!(h.backend.last_end_reason().as_deref(), Some("time_limit"));
    let session = h.orchestrator.session().unwrap();
    assert_eq!(session.end_reason, Some(EndReason::TimeLimit));
}

#[tokio::test(start_paused = true)]
async fn timers_stop_after_the_session_ends() {
    let h = harness();
    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();

    h.orchestrator.end(EndReason::UserEnded).await.unwrap();
    let pings_at_end = h.provider.keepalive_calls();

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.provider.keepalive_calls(), pings_at_end);
}

#[tokio::test(start_paused = true)]
async fn save_failure_falls_back_to_local_backup() {
    let h = harness();
    h.provider.ready_on_connect();
    h.backend.fail_next_saves(u32::MAX);
    h.orchestrator.start(config()).await.unwrap();

    h.provider.emit(ProviderEvent::SpeechFragment {
        speaker: Speaker::User,
        text: "hello there".to_string(),
    });
    h.provider.emit(ProviderEvent::SpeechEnded {
        speaker: Speaker::User,
    });
    settle().await;

    let report = h.orchestrator.end(EndReason::UserEnded).await.unwrap();
    assert_eq!(report, SaveReport::SavedLocally);

    let backup = h.store.read_backup().expect("backup must exist");
    assert_eq!(backup.lines.len(), 1);
    assert_eq!(backup.lines[0].text, "hello there");
}

#[tokio::test(start_paused = true)]
async fn full_conversation_is_captured_and_saved() {
    let h = harness();
    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();

    h.provider.emit(ProviderEvent::SpeechStarted {
        speaker: Speaker::Avatar,
    });
    h.provider.emit(ProviderEvent::SpeechFragment {
        speaker: Speaker::Avatar,
        text: "Hi, I hear you want ".to_string(),
    });
    h.provider.emit(ProviderEvent::SpeechFragment {
        speaker: Speaker::Avatar,
        text: "to practice cold calls.".to_string(),
    });
    h.provider.emit(ProviderEvent::SpeechEnded {
        speaker: Speaker::Avatar,
    });
    h.provider.emit(ProviderEvent::SpeechFragment {
        speaker: Speaker::User,
        text: "Yes, let's begin.".to_string(),
    });
    h.provider.emit(ProviderEvent::SpeechEnded {
        speaker: Speaker::User,
    });
    settle().await;

    let report = h.orchestrator.end(EndReason::UserEnded).await.unwrap();
    let SaveReport::Saved { transcript_id } = report else {
        panic!("expected Saved, got {report:?}");
    };
    assert!(transcript_id.starts_with("t_"));

    let save = h.backend.last_save().expect("save request captured");
    assert_eq!(save.messages.len(), 2);
    assert_eq!(save.messages[0].speaker, Speaker::Avatar);
    assert_eq!(
        save.messages[0].text,
        "Hi, I hear you want to practice cold calls."
    );
    assert_eq!(save.messages[1].speaker, Speaker::User);
    assert_eq!(save.topic.as_deref(), Some("cold calls"));
    // The provider session was stopped exactly once.
    assert_eq!(h.provider.stop_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn prewarmed_session_is_adopted_without_a_new_connect() {
    let prewarm = Arc::new(InMemoryPrewarmStore::new());
    prewarm.put(PrewarmedSession {
        persona_id: "persona_a".to_string(),
        provider_session_id: "ps_warm".to_string(),
        live_stream: Some(LiveStream {
            stream_id: "stream_warm".to_string(),
        }),
    });

    let h = harness_with(|b| b.prewarm(prewarm.clone()));
    h.orchestrator.start(config()).await.unwrap();

    assert_eq!(h.orchestrator.state(), SessionState::Streaming);
    assert_eq!(h.provider.connect_calls(), 0);
    let session = h.orchestrator.session().unwrap();
    assert_eq!(session.provider_session_id.as_deref(), Some("ps_warm"));
    // Consume-once: the slot is empty for the next session.
    assert!(prewarm.take("persona_a").is_none());
}

#[tokio::test(start_paused = true)]
async fn stream_disconnect_ends_the_session() {
    let h = harness();
    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();

    h.provider.emit(ProviderEvent::StreamDisconnected {
        reason: Some("network".to_string()),
    });
    settle().await;

    assert_eq!(h.orchestrator.state(), SessionState::Ended);
    assert_eq!(
        h.backend.last_end_reason().as_deref(),
        Some("stream_disconnected")
    );
}

#[tokio::test(start_paused = true)]
async fn interrupt_is_ignored_outside_streaming() {
    let h = harness();

    h.orchestrator.interrupt().await;
    assert_eq!(h.provider.interrupt_calls(), 0);

    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();
    h.orchestrator.interrupt().await;
    assert_eq!(h.provider.interrupt_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn live_mirror_tracks_lines_and_resets_on_start() {
    let h = harness();
    h.provider.ready_on_connect();
    h.orchestrator.start(config()).await.unwrap();

    h.provider.emit(ProviderEvent::SpeechFragment {
        speaker: Speaker::User,
        text: "first line of the mirror".to_string(),
    });
    h.provider.emit(ProviderEvent::SpeechEnded {
        speaker: Speaker::User,
    });
    settle().await;

    let mirrored = h.store.read_live_transcript();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].text, "first line of the mirror");

    h.orchestrator.end(EndReason::UserEnded).await.unwrap();
    h.orchestrator.start(config()).await.unwrap();
    assert!(h.store.read_live_transcript().is_empty());
}
