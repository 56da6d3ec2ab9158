//! Operations applied to every submodule of a repository, in declaration order.
//!
//! Uninitialized submodules are skipped with a warning, except by
//! [`update_all`] which initializes them.

use std::path::Path;

use super::{GitError, SubmoduleEntry};
use crate::external::{tracking_ref, ResetMode, VersionControl};

/// Check out the configured branch of every submodule, falling back to
/// `default_branch` for submodules without one.
pub fn checkout_all(
    vcs: &dyn VersionControl,
    repo: &Path,
    default_branch: &str,
) -> Result<(), GitError> {
    for submodule in vcs.submodules(repo)? {
        if !submodule.initialized {
            tracing::warn!(submodule = %submodule.name, "Cannot check out, submodule is not initialized");
            continue;
        }
        let branch = submodule.branch.as_deref().unwrap_or(default_branch);
        tracing::info!(submodule = %submodule.name, branch, "Checking out");
        vcs.checkout(&submodule.path, branch)?;
        checkout_all(vcs, &submodule.path, default_branch)?;
    }
    Ok(())
}

pub fn update_all(vcs: &dyn VersionControl, repo: &Path) -> Result<(), GitError> {
    for submodule in vcs.submodules(repo)? {
        vcs.update_submodule(repo, &submodule)?;
    }
    Ok(())
}

/// Create the annotated tag `name` in every initialized submodule.
pub fn tag_all(
    vcs: &dyn VersionControl,
    repo: &Path,
    name: &str,
    message: &str,
) -> Result<(), GitError> {
    for submodule in initialized(vcs, repo, "tag")? {
        tracing::info!(submodule = %submodule.name, tag = name, "Creating tag");
        vcs.tag(&submodule.path, name, message)?;
    }
    Ok(())
}

/// Push the current branch of every initialized submodule, or its tags.
pub fn push_all(vcs: &dyn VersionControl, repo: &Path, tags: bool) -> Result<(), GitError> {
    for submodule in initialized(vcs, repo, "push")? {
        tracing::info!(submodule = %submodule.name, tags, "Pushing");
        vcs.push(&submodule.path, tags)?;
    }
    Ok(())
}

/// Hard reset every initialized submodule, either to its HEAD or to the
/// remote tracking ref of its configured branch.
pub fn reset_all(vcs: &dyn VersionControl, repo: &Path, to_remote: bool) -> Result<(), GitError> {
    for submodule in initialized(vcs, repo, "reset")? {
        let target = match (&submodule.branch, to_remote) {
            (Some(branch), true) => tracking_ref(vcs, branch),
            (None, true) => {
                tracing::warn!(submodule = %submodule.name, "No configured branch, resetting to HEAD");
                "HEAD".to_string()
            }
            (_, false) => "HEAD".to_string(),
        };
        tracing::info!(submodule = %submodule.name, target = %target, "Resetting");
        vcs.reset(&submodule.path, &target, ResetMode::Hard)?;
    }
    Ok(())
}

pub fn clean_all(vcs: &dyn VersionControl, repo: &Path) -> Result<(), GitError> {
    for submodule in initialized(vcs, repo, "clean")? {
        tracing::info!(submodule = %submodule.name, "Cleaning");
        vcs.clean(&submodule.path)?;
    }
    Ok(())
}

/// Names of initialized submodules with uncommitted changes.
pub fn dirty_submodules(vcs: &dyn VersionControl, repo: &Path) -> Result<Vec<String>, GitError> {
    let mut dirty = Vec::new();
    for submodule in vcs.submodules(repo)? {
        if submodule.initialized && vcs.is_dirty(&submodule.path)? {
            dirty.push(submodule.name);
        }
    }
    Ok(dirty)
}

fn initialized(
    vcs: &dyn VersionControl,
    repo: &Path,
    action: &str,
) -> Result<Vec<SubmoduleEntry>, GitError> {
    Ok(vcs
        .submodules(repo)?
        .into_iter()
        .filter(|submodule| {
            if !submodule.initialized {
                tracing::warn!(submodule = %submodule.name, action, "Skipping uninitialized submodule");
            }
            submodule.initialized
        })
        .collect())
}
