use crate::error::LoadError;
use log::debug;
use std::path::{Path, PathBuf};

/// Fetches the text of a schema named by an `@schema:PATH` directive.
///
/// Loading is synchronous. A loader backed by asynchronous I/O blocks on its own
/// runtime and owns any timeout. Returning a [`MaxiError`](crate::error::MaxiError)
/// boxed as the error passes it through to the caller unchanged; any other error is
/// wrapped as a schema-load error.
pub trait SchemaLoader {
    fn load(&self, path: &str) -> Result<String, LoadError>;
}

impl<F> SchemaLoader for F
where
    F: Fn(&str) -> Result<String, LoadError>,
{
    fn load(&self, path: &str) -> Result<String, LoadError> {
        self(path)
    }
}

/// Reads imported schemas from disk, resolving relative paths against a base
/// directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    base_dir: PathBuf,
}

impl FsLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FsLoader {
            base_dir: base_dir.into(),
        }
    }

    /// Loader rooted at the directory containing `file`.
    pub fn for_file(file: impl AsRef<Path>) -> Self {
        let dir = file
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl SchemaLoader for FsLoader {
    fn load(&self, path: &str) -> Result<String, LoadError> {
        let full = self.base_dir.join(path);
        debug!("loading schema {}", full.display());
        Ok(std::fs::read_to_string(full)?)
    }
}
