pub mod aggregator;
pub mod chunk;
pub mod cleanup;
pub mod mirror;
pub mod similarity;
pub mod types;

pub use aggregator::TranscriptAggregator;
pub use chunk::{MAX_SEGMENT_CHARS, chunk_text};
pub use cleanup::{CONTROL_PHRASES, contains_control_phrase};
pub use mirror::{NullMirror, TranscriptMirror};
pub use similarity::is_similar_text;
pub use types::TranscriptLine;

pub use rehearsal_avatar_interface::Speaker;
