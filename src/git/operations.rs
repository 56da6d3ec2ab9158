use chrono::{DateTime, Local, TimeZone};
use git2::{Repository, StatusOptions};
use std::path::{Path, PathBuf};

use super::GitError;

/// A submodule declared in a repository's `.gitmodules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleEntry {
    pub name: String,
    /// Absolute path of the submodule's working tree.
    pub path: PathBuf,
    /// Branch configured for the submodule, if any.
    pub branch: Option<String>,
    /// Whether the submodule repository has been cloned.
    pub initialized: bool,
}

impl SubmoduleEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            branch: None,
            initialized: true,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn uninitialized(mut self) -> Self {
        self.initialized = false;
        self
    }
}

/// Read-only repository queries backed by libgit2.
///
/// Everything that changes a repository goes through the git CLI (see
/// [`crate::external::GitClient`]); this type only looks.
#[derive(Debug, Default, Clone, Copy)]
pub struct RepositoryInspector;

impl RepositoryInspector {
    fn open(repo: &Path) -> Result<Repository, GitError> {
        Repository::open(repo).map_err(|e| GitError::Open {
            path: repo.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// Submodules in declaration order.
    pub fn submodules(&self, repo: &Path) -> Result<Vec<SubmoduleEntry>, GitError> {
        let repository = Self::open(repo)?;
        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo.to_path_buf());

        let submodules = repository.submodules()?;
        let entries = submodules
            .iter()
            .map(|submodule| SubmoduleEntry {
                name: submodule.name().unwrap_or_default().to_string(),
                path: workdir.join(submodule.path()),
                branch: submodule.branch().map(str::to_string),
                initialized: submodule.open().is_ok(),
            })
            .collect();
        Ok(entries)
    }

    /// Tracked changes in the index or working tree. Untracked files do not count.
    pub fn is_dirty(&self, repo: &Path) -> Result<bool, GitError> {
        let repository = Self::open(repo)?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(false);
        let statuses = repository.statuses(Some(&mut options))?;
        Ok(statuses
            .iter()
            .any(|entry| entry.status() != git2::Status::CURRENT))
    }

    /// Name of the checked out branch, `None` when HEAD is detached.
    pub fn current_branch(&self, repo: &Path) -> Result<Option<String>, GitError> {
        let repository = Self::open(repo)?;
        if repository.head_detached()? {
            return Ok(None);
        }
        let head = repository.head()?;
        Ok(head.shorthand().map(str::to_string))
    }

    /// Most recent HEAD commit time across all initialized submodules.
    pub fn latest_submodule_commit(&self, repo: &Path) -> Result<DateTime<Local>, GitError> {
        let mut latest = 0i64;
        for submodule in self.submodules(repo)? {
            if !submodule.initialized {
                continue;
            }
            let subrepo = Self::open(&submodule.path)?;
            let commit = subrepo.head()?.peel_to_commit()?;
            latest = latest.max(commit.time().seconds());
        }
        Local
            .timestamp_opt(latest, 0)
            .single()
            .ok_or_else(|| GitError::CommandFailed {
                message: format!("Invalid commit timestamp {latest}"),
            })
    }
}
