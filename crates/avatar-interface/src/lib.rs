mod error;
mod prewarm;
mod provider;
mod types;

pub use error::*;
pub use prewarm::*;
pub use provider::*;
pub use types::*;
