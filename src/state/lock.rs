use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};

use super::StateError;

/// Advisory lock next to a state file (`<state file>.lock`), held for the
/// duration of one workflow invocation.
pub struct StateLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl StateLock {
    pub fn open(state_path: &Path) -> Result<Self, StateError> {
        let mut name = state_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        let path = state_path.with_file_name(name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StateError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without waiting.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, StateError> {
        let path = self.path.clone();
        self.lock
            .try_write()
            .map_err(|_| StateError::Locked { path })
    }
}
