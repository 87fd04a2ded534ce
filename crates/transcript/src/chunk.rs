pub const MAX_SEGMENT_CHARS: usize = 200;

/// Split text longer than [`MAX_SEGMENT_CHARS`] into line-break-joined
/// segments of at most that many characters. Dedup and storage operate on
/// the chunked form; short text passes through untouched.
pub fn chunk_text(text: &str) -> String {
    if text.chars().count() <= MAX_SEGMENT_CHARS {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(MAX_SEGMENT_CHARS)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(chunk_text("hello"), "hello");
    }

    #[test]
    fn boundary_length_is_untouched() {
        let text = "a".repeat(MAX_SEGMENT_CHARS);
        assert_eq!(chunk_text(&text), text);
    }

    #[test]
    fn long_text_splits_into_capped_segments() {
        let text = "x".repeat(450);
        let chunked = chunk_text(&text);

        let segments: Vec<&str> = chunked.split('\n').collect();
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.chars().count() <= MAX_SEGMENT_CHARS));
        assert_eq!(chunked.replace('\n', ""), text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(250);
        let chunked = chunk_text(&text);

        let segments: Vec<&str> = chunked.split('\n').collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(chunked.replace('\n', ""), text);
    }
}
