//! Workflow state
//!
//! A workflow persists the index of the next step to run plus the values it
//! captured along the way, so a later invocation resumes where the previous
//! one stopped.

pub mod lock;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use lock::StateLock;
pub use store::{FileStateStore, MemoryStateStore, StateStore};

/// Version of the persisted record layout.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(
        "Workflow state file {} is corrupt ({reason}). Delete it or rerun with the reset flag to start over from the first step",
        path.display()
    )]
    Corrupt { path: PathBuf, reason: String },
    #[error("Workflow state file {} is locked by another process", path.display())]
    Locked { path: PathBuf },
    #[error("Workflow state I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot encode workflow value '{key}': {source}")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The workflows with persisted state, one state file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Release,
    Bootstrap,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Release => "release",
            WorkflowKind::Bootstrap => "bootstrap",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(WorkflowKind::Release),
            "bootstrap" => Ok(WorkflowKind::Bootstrap),
            other => Err(format!("unknown workflow '{other}', expected release or bootstrap")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub schema_version: u32,
    /// Index of the next step to execute.
    pub current_step: u32,
    /// Values captured by earlier steps for use by later ones.
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            current_step: 0,
            values: BTreeMap::new(),
        }
    }
}

impl WorkflowState {
    pub fn at_step(step: u32) -> Self {
        Self {
            current_step: step,
            ..Self::default()
        }
    }

    /// Typed captured value. A value that does not decode as `T` is reported
    /// as corrupt state.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        self.values
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| StateError::Corrupt {
                    path: PathBuf::from(key),
                    reason: format!("value '{key}' has an unexpected shape: {e}"),
                })
            })
            .transpose()
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StateError> {
        let value = serde_json::to_value(value).map_err(|source| StateError::Value {
            key: key.to_string(),
            source,
        })?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(serde_json::Value::as_str)
    }
}
