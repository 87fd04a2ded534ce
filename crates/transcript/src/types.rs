use rehearsal_avatar_interface::Speaker;

/// One attributed utterance in the session transcript.
///
/// `text` is trimmed and never empty; anything longer than
/// [`crate::chunk::MAX_SEGMENT_CHARS`] characters has already been split into
/// line-break-joined segments. `timestamp` is wall-clock, formatted for
/// display.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: String,
}

impl TranscriptLine {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: display_timestamp(),
        }
    }
}

pub(crate) fn display_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
