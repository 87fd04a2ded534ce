//! Finished-transcript persistence: bounded retry against the durable
//! store, a pre-save snapshot before any network call, and a local backup
//! when everything fails. A save never hard-errors: the session must be
//! able to end no matter what the network does.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rehearsal_backend_api::{
    AnalyzePayload, AnalyzeRequest, SaveMode, SaveTranscriptRequest, SessionBackend,
    SessionConfigInfo,
};
use rehearsal_storage::{PendingSave, SessionStore, TranscriptBackup, format_transcript};
use rehearsal_transcript::TranscriptLine;

/// Context carried alongside the transcript into the durable store.
#[derive(Debug, Clone, Default)]
pub struct SaveMetadata {
    pub session_id: String,
    pub avatar_id: String,
    pub duration_sec: u64,
    pub topic: Option<String>,
    pub instructions: Option<String>,
    pub user_id: Option<String>,
    pub scenario_id: Option<String>,
    pub skill_id: Option<String>,
    pub mode: Option<String>,
    pub max_duration_sec: u64,
}

/// Outcome of one save. Only `Saved` means the durable store acknowledged;
/// `SavedLocally` is the soft-failure path (data preserved on disk, user is
/// told the transcript was saved locally, never shown an error dialog).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveReport {
    Saved { transcript_id: String },
    SavedLocally,
    Empty,
    AlreadyInFlight,
}

pub struct PersistencePipeline {
    backend: Arc<dyn SessionBackend>,
    store: SessionStore,
    save_timeout: Duration,
    in_flight: AtomicBool,
}

impl PersistencePipeline {
    pub fn new(backend: Arc<dyn SessionBackend>, store: SessionStore, save_timeout: Duration) -> Self {
        Self {
            backend,
            store,
            save_timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Submit a finalized transcript. Guarded by an in-flight latch:
    /// concurrent calls return [`SaveReport::AlreadyInFlight`] immediately
    /// instead of racing. Idempotence across a session is the caller's
    /// contract: never call again after a `Saved` result.
    pub async fn save(&self, lines: Vec<TranscriptLine>, meta: SaveMetadata) -> SaveReport {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("transcript_save_already_in_progress");
            return SaveReport::AlreadyInFlight;
        }
        let report = self.save_inner(lines, meta).await;
        self.in_flight.store(false, Ordering::SeqCst);
        report
    }

    async fn save_inner(&self, lines: Vec<TranscriptLine>, meta: SaveMetadata) -> SaveReport {
        if lines.is_empty() {
            tracing::info!("transcript_save_skipped_empty");
            return SaveReport::Empty;
        }

        // Generated locally so the id exists even if every network call
        // fails and the only copy is the on-disk backup.
        let transcript_id = generate_transcript_id();

        let snapshot = PendingSave {
            transcript_id: transcript_id.clone(),
            session_id: meta.session_id.clone(),
            lines: lines.clone(),
        };
        if let Err(error) = self.store.write_pending_save(&snapshot) {
            tracing::warn!(%error, "transcript_presave_snapshot_failed");
        }

        let request = build_request(&transcript_id, &lines, &meta);

        match self.attempt(request.clone(), SaveMode::Normal).await {
            Ok(saved_id) => {
                self.spawn_analysis(&lines, &meta);
                self.store.clear_pending_save();
                tracing::info!(transcript_id = %saved_id, "transcript_saved");
                return SaveReport::Saved {
                    transcript_id: saved_id,
                };
            }
            Err(error) => {
                tracing::warn!(%error, "transcript_save_first_attempt_failed");
            }
        }

        match self.attempt(request, SaveMode::Bypass).await {
            Ok(saved_id) => {
                self.spawn_analysis(&lines, &meta);
                self.store.clear_pending_save();
                tracing::info!(transcript_id = %saved_id, "transcript_saved_on_retry");
                SaveReport::Saved {
                    transcript_id: saved_id,
                }
            }
            Err(error) => {
                tracing::warn!(%error, "transcript_save_retry_failed_backing_up_locally");
                let backup = TranscriptBackup {
                    transcript_id,
                    session_id: meta.session_id.clone(),
                    formatted: format_transcript(&lines),
                    lines,
                };
                if let Err(error) = self.store.write_backup(&backup) {
                    tracing::error!(%error, "transcript_local_backup_failed");
                }
                SaveReport::SavedLocally
            }
        }
    }

    async fn attempt(
        &self,
        request: SaveTranscriptRequest,
        mode: SaveMode,
    ) -> Result<String, String> {
        let transcript_id = request.transcript_id.clone();
        let call = self.backend.save_transcript(request, mode);
        match tokio::time::timeout(self.save_timeout, call).await {
            Ok(Ok(response)) if response.success => {
                Ok(response.transcript_id.unwrap_or(transcript_id))
            }
            Ok(Ok(_)) => Err("store reported failure".to_string()),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.save_timeout)),
        }
    }

    /// Best-effort, non-blocking downstream analysis request. Failure here
    /// never fails the save.
    fn spawn_analysis(&self, lines: &[TranscriptLine], meta: &SaveMetadata) {
        let backend = self.backend.clone();
        let request = AnalyzeRequest {
            transcript: AnalyzePayload {
                messages: lines.to_vec(),
                context: meta.topic.clone(),
                instructions: meta.instructions.clone(),
            },
        };
        tokio::spawn(async move {
            if let Err(error) = backend.analyze_transcript(request).await {
                tracing::debug!(%error, "transcript_analysis_request_failed");
            }
        });
    }
}

fn build_request(
    transcript_id: &str,
    lines: &[TranscriptLine],
    meta: &SaveMetadata,
) -> SaveTranscriptRequest {
    SaveTranscriptRequest {
        transcript_id: transcript_id.to_string(),
        session_id: meta.session_id.clone(),
        avatar_id: meta.avatar_id.clone(),
        messages: lines.to_vec(),
        duration_sec: meta.duration_sec,
        topic: meta.topic.clone(),
        instructions: meta.instructions.clone(),
        user_id: meta.user_id.clone(),
        scenario_id: meta.scenario_id.clone(),
        skill_id: meta.skill_id.clone(),
        session_config: SessionConfigInfo {
            avatar_id: meta.avatar_id.clone(),
            scenario_id: meta.scenario_id.clone(),
            mode: meta.mode.clone(),
            max_duration_sec: meta.max_duration_sec,
        },
    }
}

fn generate_transcript_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "t_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}
