/// UI action labels that leak into scraped captions when the caption source
/// picks up the application's own controls instead of speech.
pub const CONTROL_PHRASES: &[&str] = &[
    "end session",
    "end the session",
    "interrupt avatar",
    "view transcript",
    "clear transcript",
    "session ended",
];

pub fn contains_control_phrase(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CONTROL_PHRASES.iter().any(|p| lowered.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_leaked_action_label() {
        assert!(contains_control_phrase("End Session"));
        assert!(contains_control_phrase("please View Transcript here"));
    }

    #[test]
    fn normal_speech_passes() {
        assert!(!contains_control_phrase(
            "I ended up leading the session planning"
        ));
    }
}
