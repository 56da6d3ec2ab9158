//! Repository-wide git helpers over the root and its submodules.

use anyhow::Result;

use super::{confirm_repeatedly, confirmer, CommandContext, Exit};
use crate::external::VersionControl;
use crate::git::{create_now_qualifier, create_qualifier, submodules};
use crate::workflows::Confirm;

const DEFAULT_BRANCH: &str = "master";

/// A repository-wide operation and the confirmation it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoAction {
    Checkout,
    Update,
    Push,
    Clean,
    Reset { to_remote: bool },
    Tag { name: String, description: Option<String> },
}

impl RepoAction {
    fn warning(&self) -> Option<(&'static str, usize)> {
        match self {
            RepoAction::Checkout => Some((
                "This will get rid of detached heads, including any commits made on them.",
                1,
            )),
            RepoAction::Update => None,
            RepoAction::Push => Some(("This pushes commits to the remote repository.", 1)),
            RepoAction::Clean => Some(("This will DELETE UNTRACKED FILES.", 2)),
            RepoAction::Reset { to_remote: true } => Some((
                "This will DELETE UNCOMMITTED CHANGES and DELETE UNPUSHED COMMITS.",
                3,
            )),
            RepoAction::Reset { to_remote: false } => {
                Some(("This will DELETE UNCOMMITTED CHANGES.", 2))
            }
            RepoAction::Tag { .. } => Some(("This creates tags in every submodule.", 1)),
        }
    }
}

pub struct RepoCommand {
    action: RepoAction,
    assume_yes: bool,
}

impl RepoCommand {
    pub fn new(action: RepoAction) -> Self {
        Self {
            action,
            assume_yes: false,
        }
    }

    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    pub fn execute(&self, context: &CommandContext) -> Result<Exit> {
        let vcs = context.git();
        let confirm = confirmer(self.assume_yes);
        self.run(context, &vcs, confirm.as_ref())
    }

    pub fn run(
        &self,
        context: &CommandContext,
        vcs: &dyn VersionControl,
        confirm: &dyn Confirm,
    ) -> Result<Exit> {
        if let Some((warning, times)) = self.action.warning() {
            println!("⚠️  {warning}");
            if !confirm_repeatedly(confirm, "Continue?", times)? {
                println!("🛑 Cancelled");
                return Ok(Exit::Failure);
            }
        }

        let repo = context.repo();
        match &self.action {
            RepoAction::Checkout => {
                let branch = vcs
                    .current_branch(repo)?
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
                println!("🌿 Checking out submodule branches (default {branch})");
                submodules::checkout_all(vcs, repo, &branch)?;
            }
            RepoAction::Update => {
                println!("🔄 Updating all submodules");
                submodules::update_all(vcs, repo)?;
            }
            RepoAction::Push => {
                println!("⬆️  Pushing current branch of every submodule");
                submodules::push_all(vcs, repo, false)?;
            }
            RepoAction::Clean => {
                println!("🧹 Cleaning all submodules");
                submodules::clean_all(vcs, repo)?;
            }
            RepoAction::Reset { to_remote } => {
                println!("⏪ Resetting all submodules");
                submodules::reset_all(vcs, repo, *to_remote)?;
            }
            RepoAction::Tag { name, description } => {
                println!("🏷️  Creating tag {name} in every submodule");
                submodules::tag_all(vcs, repo, name, description.as_deref().unwrap_or(name))?;
            }
        }
        println!("✅ Done");
        Ok(Exit::Success)
    }
}

/// Prints the build qualifier of the repository.
pub struct QualifierCommand {
    now: bool,
}

impl QualifierCommand {
    pub fn new() -> Self {
        Self { now: false }
    }

    pub fn with_now(mut self, now: bool) -> Self {
        self.now = now;
        self
    }

    pub fn execute(&self, context: &CommandContext) -> Result<Exit> {
        let qualifier = if self.now {
            create_now_qualifier(context.repo(), None)?
        } else {
            create_qualifier(context.repo(), None)?
        };
        println!("{qualifier}");
        Ok(Exit::Success)
    }
}

impl Default for QualifierCommand {
    fn default() -> Self {
        Self::new()
    }
}
