use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{StateError, WorkflowState, SCHEMA_VERSION};

/// Persistence for a single workflow's state record.
pub trait StateStore {
    /// The persisted state, or a fresh state at step 0 when none exists.
    fn load(&self) -> Result<WorkflowState, StateError>;

    /// Durably persist `state` before returning.
    fn save(&self, state: &WorkflowState) -> Result<(), StateError>;

    /// Delete the persisted state. Resetting absent state is not an error.
    fn reset(&self) -> Result<(), StateError>;

    fn exists(&self) -> bool;

    /// Human readable location, for messages.
    fn location(&self) -> String;
}

/// JSON file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<WorkflowState, StateError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WorkflowState::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let state: WorkflowState =
            serde_json::from_str(&contents).map_err(|e| StateError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        if state.schema_version != SCHEMA_VERSION {
            return Err(StateError::Corrupt {
                path: self.path.clone(),
                reason: format!(
                    "schema version {} is not supported, expected {}",
                    state.schema_version, SCHEMA_VERSION
                ),
            });
        }

        tracing::debug!(path = %self.path.display(), step = state.current_step, "Loaded workflow state");
        Ok(state)
    }

    fn save(&self, state: &WorkflowState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let serialized = serde_json::to_string_pretty(state).map_err(|e| StateError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        // Write to temporary file first, then rename (atomic operation)
        let temp = self.temp_path();
        let mut file = File::create(&temp).map_err(|e| self.io_error(e))?;
        file.write_all(serialized.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| self.io_error(e))?;
        fs::rename(&temp, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), step = state.current_step, "Saved workflow state");
        Ok(())
    }

    fn reset(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Workflow state reset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RefCell<Option<WorkflowState>>,
    saves: RefCell<Vec<u32>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: WorkflowState) -> Self {
        Self {
            state: RefCell::new(Some(state)),
            saves: RefCell::default(),
        }
    }

    pub fn snapshot(&self) -> Option<WorkflowState> {
        self.state.borrow().clone()
    }

    /// Step index of every save, in order.
    pub fn saved_steps(&self) -> Vec<u32> {
        self.saves.borrow().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<WorkflowState, StateError> {
        Ok(self.state.borrow().clone().unwrap_or_default())
    }

    fn save(&self, state: &WorkflowState) -> Result<(), StateError> {
        self.saves.borrow_mut().push(state.current_step);
        *self.state.borrow_mut() = Some(state.clone());
        Ok(())
    }

    fn reset(&self) -> Result<(), StateError> {
        *self.state.borrow_mut() = None;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.state.borrow().is_some()
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
