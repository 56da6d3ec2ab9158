use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;

use crate::config::RelengConfig;
use crate::external::{CommandExecutor, GitClient, ProcessCommandExecutor};
use crate::state::{FileStateStore, StateLock, WorkflowKind};
use crate::workflows::{Confirm, FixedConfirm, StdinConfirm};

pub mod bootstrap;
pub mod build;
pub mod release;
pub mod repo;
pub mod state;

/// How a command finished, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    /// Declined confirmation, configuration problem or failed step.
    Failure,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Success => ExitCode::SUCCESS,
            Exit::Failure => ExitCode::from(1),
        }
    }
}

/// Repository, configuration and process executor shared by every command.
pub struct CommandContext {
    pub repo: PathBuf,
    pub config: RelengConfig,
    pub executor: Arc<dyn CommandExecutor>,
}

impl CommandContext {
    pub fn new(repo: impl Into<PathBuf>, config: RelengConfig) -> Self {
        Self {
            repo: repo.into(),
            config,
            executor: Arc::new(ProcessCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Git client using the configured remote and commit identity.
    pub fn git(&self) -> GitClient {
        let client = GitClient::new(Arc::clone(&self.executor)).with_remote(&self.config.git.remote);
        match (&self.config.git.user_name, &self.config.git.user_email) {
            (Some(name), Some(email)) => client.with_identity(name, email),
            _ => client,
        }
    }

    pub fn state_store(&self, kind: WorkflowKind) -> Result<FileStateStore> {
        Ok(FileStateStore::new(self.config.state_path(kind)?))
    }

    /// Lock next to the state file of `kind`, when locking is enabled.
    pub fn state_lock(&self, kind: WorkflowKind) -> Result<Option<StateLock>> {
        if !self.config.state.lock {
            return Ok(None);
        }
        Ok(Some(StateLock::open(&self.config.state_path(kind)?)?))
    }
}

/// Confirmation gate for `--yes` style flags.
pub fn confirmer(assume_yes: bool) -> Box<dyn Confirm> {
    if assume_yes {
        Box::new(FixedConfirm(true))
    } else {
        Box::new(StdinConfirm)
    }
}

/// Ask `times` times; destructive operations need repeated agreement.
pub fn confirm_repeatedly(confirm: &dyn Confirm, question: &str, times: usize) -> Result<bool> {
    for attempt in 1..=times {
        let question = if attempt == 1 {
            question.to_string()
        } else {
            format!("Are you sure? ({attempt}/{times})")
        };
        if !confirm.confirm(&question)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedConfirm;

    #[test]
    fn test_repeated_confirmation_stops_at_first_no() {
        let confirm = ScriptedConfirm::new([true, false, true]);
        assert!(!confirm_repeatedly(&confirm, "Delete files?", 3).unwrap());
        assert_eq!(confirm.questions().len(), 2);
    }

    #[test]
    fn test_repeated_confirmation_asks_every_time() {
        let confirm = ScriptedConfirm::new([true, true]);
        assert!(confirm_repeatedly(&confirm, "Delete files?", 2).unwrap());
        assert_eq!(
            confirm.questions(),
            vec!["Delete files?".to_string(), "Are you sure? (2/2)".to_string()]
        );
    }

    #[test]
    fn test_git_client_uses_configured_remote() {
        let mut config = RelengConfig::default();
        config.git.remote = "upstream".to_string();
        let context = CommandContext::new("/work/spoofax-releng", config);
        assert_eq!(crate::external::VersionControl::remote_name(&context.git()), "upstream");
    }
}
