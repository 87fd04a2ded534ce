use crate::types::TranscriptLine;

/// Durable local copy of the transcript, kept in lockstep with the
/// aggregator's line buffer for crash/refresh recovery.
///
/// Implementations own their failure handling; a mirror write that fails
/// must never disturb aggregation, so this seam is infallible by contract.
pub trait TranscriptMirror: Send + Sync {
    fn append(&self, line: &TranscriptLine);
    fn replace(&self, index: usize, line: &TranscriptLine);
    fn set_all(&self, lines: &[TranscriptLine]);
}

/// Mirror that drops everything. Used when no durable cache is wired in.
pub struct NullMirror;

impl TranscriptMirror for NullMirror {
    fn append(&self, _line: &TranscriptLine) {}
    fn replace(&self, _index: usize, _line: &TranscriptLine) {}
    fn set_all(&self, _lines: &[TranscriptLine]) {}
}
