use rehearsal_transcript::{TranscriptLine, TranscriptMirror};

use crate::store::SessionStore;

/// Durable transcript mirror over the session store.
///
/// Writes go read-modify-write against the live document. Failures are
/// logged and swallowed; losing a mirror write must never disturb the
/// in-memory transcript.
pub struct FsMirror {
    store: SessionStore,
}

impl FsMirror {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

impl TranscriptMirror for FsMirror {
    fn append(&self, line: &TranscriptLine) {
        let mut lines = self.store.read_live_transcript();
        lines.push(line.clone());
        if let Err(error) = self.store.write_live_transcript(&lines) {
            tracing::warn!(%error, "transcript_mirror_append_failed");
        }
    }

    fn replace(&self, index: usize, line: &TranscriptLine) {
        let mut lines = self.store.read_live_transcript();
        if index >= lines.len() {
            tracing::warn!(index, len = lines.len(), "transcript_mirror_index_out_of_range");
            return;
        }
        lines[index] = line.clone();
        if let Err(error) = self.store.write_live_transcript(&lines) {
            tracing::warn!(%error, "transcript_mirror_replace_failed");
        }
    }

    fn set_all(&self, lines: &[TranscriptLine]) {
        if let Err(error) = self.store.write_live_transcript(lines) {
            tracing::warn!(%error, "transcript_mirror_rewrite_failed");
        }
    }
}
