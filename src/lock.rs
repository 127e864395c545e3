use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Lock acquisition/release errors
#[derive(Debug, Error)]
pub enum LockError {
    /// Another invocation already holds the recording lock
    #[error("recording already active: {path} exists")]
    AlreadyActive {
        /// Lock file path
        path: String,
    },

    /// Filesystem operation on the lock file failed
    #[error("lock file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Recording state as presence of a marker file.
///
/// The marker is the only state shared between toggle invocations: its
/// presence means a capture loop is (or should be) running somewhere.
/// Removal is the cross-process stop signal.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a recording session is currently marked active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.path.exists()
    }

    /// Create the marker file.
    ///
    /// Uses exclusive create so two concurrent toggles cannot both win:
    /// the loser gets [`LockError::AlreadyActive`] and must not capture.
    ///
    /// # Errors
    /// [`LockError::AlreadyActive`] if the marker exists, [`LockError::Io`]
    /// on any other filesystem failure.
    pub fn acquire(&self) -> Result<(), LockError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => {
                info!(path = %self.path.display(), "lock acquired");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LockError::AlreadyActive {
                    path: self.path.display().to_string(),
                })
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    /// Remove the marker file. No-op if it is already gone.
    ///
    /// # Errors
    /// [`LockError::Io`] if removal fails for any reason other than the
    /// file being absent.
    pub fn release(&self) -> Result<(), LockError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "lock released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "lock already released");
                Ok(())
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }
}
