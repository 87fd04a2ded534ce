mod error;
pub mod fs;
mod mirror;
mod runtime;
mod store;

pub use error::*;
pub use mirror::FsMirror;
pub use runtime::*;
pub use store::*;
