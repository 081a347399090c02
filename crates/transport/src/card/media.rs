//! Media directory for generated card images.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Files under a root directory, addressed by relative paths such as
/// `qr_codes/qr_code_1_S1.png`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative path, refusing anything that would step outside
    /// the root.
    pub fn path(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (contained && !relative.as_os_str().is_empty()).then(|| self.root.join(relative))
    }

    /// Writes `bytes`, replacing any existing file.
    pub fn write(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, bytes).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// `None` if the file does not exist.
    pub fn read(&self, relative: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(relative)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Io { path, source }),
        }
    }

    /// Returns false if there was nothing to remove.
    pub fn remove(&self, relative: &str) -> Result<bool> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(Error::Io { path, source }),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        self.path(relative).ok_or_else(|| Error::Io {
            path: PathBuf::from(relative),
            source: std::io::Error::new(ErrorKind::InvalidInput, "path escapes media root"),
        })
    }
}
