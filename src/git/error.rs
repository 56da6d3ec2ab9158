use std::path::PathBuf;
use thiserror::Error;

use crate::external::CommandError;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Cannot open git repository at {}: {message}", path.display())]
    Open { path: PathBuf, message: String },
    #[error("Not a git repository: {}", path.display())]
    RepositoryNotFound { path: PathBuf },
    #[error("Branch not found: {branch}")]
    BranchNotFound { branch: String },
    #[error("Merge conflict in {}", repo.display())]
    MergeConflict { repo: PathBuf },
    #[error("Git command failed: {message}")]
    CommandFailed { message: String },
    #[error("Command execution error: {source}")]
    CommandError {
        #[from]
        source: CommandError,
    },
    #[error("libgit2 error: {0}")]
    Git2(#[from] git2::Error),
}
