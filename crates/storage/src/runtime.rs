use std::path::PathBuf;

use crate::error::Error;

/// Resolves where session documents live. The embedding application decides
/// the base directory; the library never hardcodes one.
pub trait StorageRuntime: Send + Sync {
    fn base_dir(&self) -> Result<PathBuf, Error>;
}

/// Platform data dir under a fixed app folder.
pub struct DefaultRuntime {
    app_folder: String,
}

impl DefaultRuntime {
    pub fn new(app_folder: impl Into<String>) -> Self {
        Self {
            app_folder: app_folder.into(),
        }
    }
}

impl StorageRuntime for DefaultRuntime {
    fn base_dir(&self) -> Result<PathBuf, Error> {
        dirs::data_dir()
            .map(|d| d.join(&self.app_folder))
            .ok_or(Error::DataDirUnavailable)
    }
}
