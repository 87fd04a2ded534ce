//! Accumulates per-speaker speech fragments into finalized, deduplicated
//! transcript lines.
//!
//! Caption streams are noisy: the provider re-emits text, extends earlier
//! utterances, and occasionally echoes the other party's speech. The
//! aggregator absorbs that by buffering fragments per speaker and running
//! every finalized utterance through a dedup window before it becomes a
//! line. Lines are append-only except for in-place supersession of a recent
//! near-duplicate by a longer variant.

use std::collections::HashMap;

use rehearsal_avatar_interface::Speaker;

use crate::chunk::chunk_text;
use crate::cleanup::contains_control_phrase;
use crate::mirror::{NullMirror, TranscriptMirror};
use crate::similarity::is_similar_text;
use crate::types::TranscriptLine;

/// How many recent lines the dedup checks look back over.
const DEDUP_WINDOW: usize = 5;

/// New text longer than this is checked against recent lines from *any*
/// speaker, to catch the avatar's captions echoing the user (or vice versa).
const CROSS_SPEAKER_GUARD_CHARS: usize = 20;

pub struct TranscriptAggregator {
    lines: Vec<TranscriptLine>,
    pending: HashMap<Speaker, String>,
    mirror: Box<dyn TranscriptMirror>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::with_mirror(Box::new(NullMirror))
    }

    pub fn with_mirror(mirror: Box<dyn TranscriptMirror>) -> Self {
        Self {
            lines: Vec::new(),
            pending: HashMap::new(),
            mirror,
        }
    }

    /// Append a fragment to the speaker's pending utterance. No line is
    /// emitted until [`finalize`](Self::finalize).
    pub fn append_fragment(&mut self, speaker: Speaker, text: &str) {
        self.pending.entry(speaker).or_default().push_str(text);
    }

    /// Close the speaker's pending buffer into a committed line. The buffer
    /// is cleared unconditionally, even when dedup drops the text.
    pub fn finalize(&mut self, speaker: Speaker) -> bool {
        let Some(pending) = self.pending.remove(&speaker) else {
            return false;
        };

        let trimmed = pending.trim();
        if trimmed.is_empty() {
            return false;
        }

        self.add_line(speaker, trimmed)
    }

    /// Add one utterance, returning whether a new line was appended.
    ///
    /// Evaluated against the last 5 lines from the same speaker:
    /// an exact duplicate is rejected; containment or high similarity merges
    /// (longer-or-equal text replaces the recent line in place, shorter text
    /// is dropped). Text over 20 chars wholly containing or contained in any
    /// of the last 5 lines from *any* speaker is dropped as an echo.
    pub fn add_line(&mut self, speaker: Speaker, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        let text = chunk_text(trimmed);
        let text_chars = text.chars().count();

        let recent_same: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, l)| l.speaker == speaker)
            .take(DEDUP_WINDOW)
            .map(|(i, _)| i)
            .collect();

        for idx in recent_same {
            let existing = &self.lines[idx].text;

            if *existing == text {
                return false;
            }

            let contained = existing.contains(&text) || text.contains(existing.as_str());
            if contained || is_similar_text(existing, &text) {
                if text_chars >= existing.chars().count() {
                    tracing::debug!(index = idx, "transcript_line_superseded");
                    self.lines[idx].text = text;
                    self.mirror.replace(idx, &self.lines[idx]);
                } else {
                    tracing::debug!(index = idx, "transcript_line_dropped_shorter_variant");
                }
                return false;
            }
        }

        if text_chars > CROSS_SPEAKER_GUARD_CHARS {
            let window_start = self.lines.len().saturating_sub(DEDUP_WINDOW);
            let echoed = self.lines[window_start..]
                .iter()
                .any(|l| l.text.contains(&text) || text.contains(l.text.as_str()));
            if echoed {
                tracing::debug!("transcript_line_dropped_cross_speaker_echo");
                return false;
            }
        }

        let line = TranscriptLine::new(speaker, text);
        self.mirror.append(&line);
        self.lines.push(line);
        true
    }

    /// Finalize any pending utterances for both speakers, in a fixed order.
    pub fn finalize_all(&mut self) {
        self.finalize(Speaker::User);
        self.finalize(Speaker::Avatar);
    }

    /// Remove lines whose text contains a leaked UI-control phrase. Applied
    /// once at finalize-for-save time; the mirror is rewritten to match.
    pub fn strip_control_phrases(&mut self) {
        let before = self.lines.len();
        self.lines.retain(|l| !contains_control_phrase(&l.text));
        if self.lines.len() != before {
            tracing::debug!(
                removed = before - self.lines.len(),
                "transcript_control_phrases_stripped"
            );
            self.mirror.set_all(&self.lines);
        }
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<TranscriptLine> {
        self.lines
    }

    /// Export the current lines by value, leaving the aggregator intact.
    pub fn snapshot(&self) -> Vec<TranscriptLine> {
        self.lines.clone()
    }
}

impl Default for TranscriptAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, PartialEq)]
    enum MirrorOp {
        Append(String),
        Replace(usize, String),
        SetAll(usize),
    }

    #[derive(Clone, Default)]
    struct RecordingMirror {
        ops: Arc<Mutex<Vec<MirrorOp>>>,
    }

    impl TranscriptMirror for RecordingMirror {
        fn append(&self, line: &TranscriptLine) {
            self.ops
                .lock()
                .unwrap()
                .push(MirrorOp::Append(line.text.clone()));
        }
        fn replace(&self, index: usize, line: &TranscriptLine) {
            self.ops
                .lock()
                .unwrap()
                .push(MirrorOp::Replace(index, line.text.clone()));
        }
        fn set_all(&self, lines: &[TranscriptLine]) {
            self.ops.lock().unwrap().push(MirrorOp::SetAll(lines.len()));
        }
    }

    fn texts(agg: &TranscriptAggregator) -> Vec<&str> {
        agg.lines().iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn exact_duplicate_is_rejected() {
        let mut agg = TranscriptAggregator::new();

        assert!(agg.add_line(Speaker::User, "hello"));
        assert!(!agg.add_line(Speaker::User, "hello"));

        assert_eq!(texts(&agg), ["hello"]);
    }

    #[test]
    fn longer_variant_supersedes_in_place() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::Avatar, "I can help");
        assert!(!agg.add_line(Speaker::Avatar, "I can help you today"));

        assert_eq!(texts(&agg), ["I can help you today"]);
    }

    #[test]
    fn shorter_variant_is_dropped() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::Avatar, "I can help you today");
        assert!(!agg.add_line(Speaker::Avatar, "I can help"));

        assert_eq!(texts(&agg), ["I can help you today"]);
    }

    #[test]
    fn supersession_preserves_line_order() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::Avatar, "first question");
        agg.add_line(Speaker::User, "my answer");
        agg.add_line(Speaker::Avatar, "first question with a follow-up");

        assert_eq!(
            texts(&agg),
            ["first question with a follow-up", "my answer"]
        );
    }

    #[test]
    fn dedup_window_only_looks_back_five_lines() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::User, "alpha");
        for t in ["beta", "gamma", "delta", "epsilon", "zeta"] {
            agg.add_line(Speaker::User, t);
        }

        // "alpha" fell out of the window, so it appends again.
        assert!(agg.add_line(Speaker::User, "alpha"));
        assert_eq!(agg.lines().len(), 7);
    }

    #[test]
    fn cross_speaker_echo_is_dropped() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::User, "tell me about the role requirements");
        assert!(!agg.add_line(Speaker::Avatar, "tell me about the role requirements"));

        assert_eq!(agg.lines().len(), 1);
        assert_eq!(agg.lines()[0].speaker, Speaker::User);
    }

    #[test]
    fn short_cross_speaker_text_is_not_guarded() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::User, "thank you");
        assert!(agg.add_line(Speaker::Avatar, "thank you"));

        assert_eq!(agg.lines().len(), 2);
    }

    #[test]
    fn fragments_accumulate_until_finalize() {
        let mut agg = TranscriptAggregator::new();

        agg.append_fragment(Speaker::User, "I led the ");
        agg.append_fragment(Speaker::User, "migration project");
        assert!(agg.lines().is_empty());

        assert!(agg.finalize(Speaker::User));
        assert_eq!(texts(&agg), ["I led the migration project"]);
    }

    #[test]
    fn finalize_clears_buffer_even_when_dropped() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::User, "hello");
        agg.append_fragment(Speaker::User, "hello");
        assert!(!agg.finalize(Speaker::User));

        // Buffer was cleared: a second finalize has nothing to emit.
        assert!(!agg.finalize(Speaker::User));
        assert_eq!(agg.lines().len(), 1);
    }

    #[test]
    fn whitespace_only_finalize_is_a_noop() {
        let mut agg = TranscriptAggregator::new();

        agg.append_fragment(Speaker::Avatar, "   \n ");
        assert!(!agg.finalize(Speaker::Avatar));
        assert!(agg.lines().is_empty());
    }

    #[test]
    fn long_text_is_chunked_before_dedup_and_storage() {
        let mut agg = TranscriptAggregator::new();
        let long = "a b c d e ".repeat(45);

        agg.add_line(Speaker::User, &long);

        let stored = &agg.lines()[0].text;
        assert!(stored.contains('\n'));
        assert!(stored.split('\n').all(|s| s.chars().count() <= 200));
        assert_eq!(stored.replace('\n', ""), long.trim());
    }

    #[test]
    fn strip_control_phrases_removes_leaked_labels() {
        let mut agg = TranscriptAggregator::new();

        agg.add_line(Speaker::User, "my actual answer");
        agg.add_line(Speaker::Avatar, "End Session");
        agg.strip_control_phrases();

        assert_eq!(texts(&agg), ["my actual answer"]);
    }

    #[test]
    fn mirror_tracks_append_replace_and_rewrite() {
        let mirror = RecordingMirror::default();
        let mut agg = TranscriptAggregator::with_mirror(Box::new(mirror.clone()));

        agg.add_line(Speaker::Avatar, "I can help");
        agg.add_line(Speaker::Avatar, "I can help you today");
        agg.add_line(Speaker::User, "View Transcript please and thank you");
        agg.strip_control_phrases();

        let ops = mirror.ops.lock().unwrap();
        assert_eq!(
            *ops,
            vec![
                MirrorOp::Append("I can help".into()),
                MirrorOp::Replace(0, "I can help you today".into()),
                MirrorOp::Append("View Transcript please and thank you".into()),
                MirrorOp::SetAll(1),
            ]
        );
    }
}
