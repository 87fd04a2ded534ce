use std::path::{Path, PathBuf};

use rehearsal_transcript::TranscriptLine;

use crate::error::Error;
use crate::fs::atomic_write;

/// Live mirror of the in-memory transcript, kept for crash/refresh recovery.
pub const LIVE_TRANSCRIPT_FILENAME: &str = "live_transcript.json";

/// Pre-save snapshot written before any network call.
pub const PENDING_SAVE_FILENAME: &str = "pending_save.json";

/// Final backup written only when every save attempt failed. Distinct from
/// the pre-save snapshot so a later successful save never clears it.
pub const BACKUP_FILENAME: &str = "transcript_backup.json";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PendingSave {
    pub transcript_id: String,
    pub session_id: String,
    pub lines: Vec<TranscriptLine>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptBackup {
    pub transcript_id: String,
    pub session_id: String,
    pub lines: Vec<TranscriptLine>,
    /// Human-readable rendering, so the backup is useful even without the
    /// application to re-parse it.
    pub formatted: String,
}

pub fn format_transcript(lines: &[TranscriptLine]) -> String {
    lines
        .iter()
        .map(|l| format!("[{}] {}: {}", l.timestamp, l.speaker, l.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fixed-name JSON documents under one base directory.
///
/// The live mirror is the only document written by more than one component
/// (aggregator mirror and persistence pipeline), and no cross-process lock
/// exists, so every mutation goes read-modify-write against the file.
#[derive(Clone)]
pub struct SessionStore {
    base: PathBuf,
}

impl SessionStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path(&self, filename: &str) -> PathBuf {
        self.base.join(filename)
    }

    fn write_json<T: serde::Serialize>(&self, filename: &str, value: &T) -> Result<(), Error> {
        let content = serde_json::to_string_pretty(value)?;
        atomic_write(&self.path(filename), &content)?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, filename: &str) -> Option<T> {
        let content = std::fs::read_to_string(self.path(filename)).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(filename, %error, "session_store_document_corrupt");
                None
            }
        }
    }

    fn remove(&self, filename: &str) {
        if let Err(error) = std::fs::remove_file(self.path(filename))
            && error.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(filename, %error, "session_store_remove_failed");
        }
    }

    // ── Live transcript mirror ──────────────────────────────────────────────

    /// Missing or corrupt documents read as empty. Recovery data must never
    /// take the session down.
    pub fn read_live_transcript(&self) -> Vec<TranscriptLine> {
        self.read_json(LIVE_TRANSCRIPT_FILENAME).unwrap_or_default()
    }

    pub fn write_live_transcript(&self, lines: &[TranscriptLine]) -> Result<(), Error> {
        self.write_json(LIVE_TRANSCRIPT_FILENAME, &lines)
    }

    pub fn clear_live_transcript(&self) {
        self.remove(LIVE_TRANSCRIPT_FILENAME);
    }

    // ── Pre-save snapshot ───────────────────────────────────────────────────

    pub fn write_pending_save(&self, snapshot: &PendingSave) -> Result<(), Error> {
        self.write_json(PENDING_SAVE_FILENAME, snapshot)
    }

    pub fn read_pending_save(&self) -> Option<PendingSave> {
        self.read_json(PENDING_SAVE_FILENAME)
    }

    pub fn clear_pending_save(&self) {
        self.remove(PENDING_SAVE_FILENAME);
    }

    // ── Final backup ────────────────────────────────────────────────────────

    pub fn write_backup(&self, backup: &TranscriptBackup) -> Result<(), Error> {
        self.write_json(BACKUP_FILENAME, backup)
    }

    pub fn read_backup(&self) -> Option<TranscriptBackup> {
        self.read_json(BACKUP_FILENAME)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}
