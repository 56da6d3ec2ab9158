//! Release workflow
//!
//! Merges the development branch into the release branch across the root
//! repository and every submodule, sets the release version, builds and
//! deploys, tags, pushes, and finally moves the development branch on to
//! the next development version.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::runner::{check_guard, Collaborators, ExecutionMode, Transition, Workflow, WorkflowStep};
use crate::build::{BuildOptions, ALL_TARGET};
use crate::external::{
    submodule_paths, tracking_ref, CommitOptions, MergeStrategy, ResetMode, VersionControl,
};
use crate::git::{submodules, GitError};
use crate::state::{StateStore, WorkflowKind, WorkflowState};
use crate::versions::RewriteOptions;

const DEV_BRANCHES_KEY: &str = "submodule_dev_branches";
const REL_BRANCHES_KEY: &str = "submodule_rel_branches";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseStep {
    PrepareDevelop,
    PrepareRelease,
    MergeRoot,
    MergeSubmodules,
    SetReleaseVersions,
    BuildDeploy,
    Tag,
    PushRelease,
    SwitchToDevelop,
    SetDevelopVersions,
    PushDevelop,
}

impl ReleaseStep {
    pub const ALL: [ReleaseStep; 11] = [
        ReleaseStep::PrepareDevelop,
        ReleaseStep::PrepareRelease,
        ReleaseStep::MergeRoot,
        ReleaseStep::MergeSubmodules,
        ReleaseStep::SetReleaseVersions,
        ReleaseStep::BuildDeploy,
        ReleaseStep::Tag,
        ReleaseStep::PushRelease,
        ReleaseStep::SwitchToDevelop,
        ReleaseStep::SetDevelopVersions,
        ReleaseStep::PushDevelop,
    ];

    pub fn description(self) -> &'static str {
        match self {
            ReleaseStep::PrepareDevelop => "prepare development branch",
            ReleaseStep::PrepareRelease => "prepare release branch",
            ReleaseStep::MergeRoot => "merge development branch into release branch",
            ReleaseStep::MergeSubmodules => {
                "for each submodule: merge development branch into release branch"
            }
            ReleaseStep::SetReleaseVersions => {
                "for each submodule: set version from the current development version to the next release version"
            }
            ReleaseStep::BuildDeploy => "build and deploy",
            ReleaseStep::Tag => "tag release submodules and repository",
            ReleaseStep::PushRelease => "push release submodules and repository",
            ReleaseStep::SwitchToDevelop => "switch to development branch",
            ReleaseStep::SetDevelopVersions => {
                "for each submodule: set version from the current development version to the next development version"
            }
            ReleaseStep::PushDevelop => "push development submodules and repository",
        }
    }
}

impl WorkflowStep for ReleaseStep {
    fn index(self) -> u32 {
        match self {
            ReleaseStep::PrepareDevelop => 0,
            ReleaseStep::PrepareRelease => 2,
            ReleaseStep::MergeRoot => 3,
            ReleaseStep::MergeSubmodules => 4,
            ReleaseStep::SetReleaseVersions => 5,
            ReleaseStep::BuildDeploy => 6,
            ReleaseStep::Tag => 7,
            ReleaseStep::PushRelease => 8,
            ReleaseStep::SwitchToDevelop => 9,
            ReleaseStep::SetDevelopVersions => 10,
            ReleaseStep::PushDevelop => 11,
        }
    }

    fn from_index(index: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.index() == index)
    }
}

impl fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.index(), self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    pub repo: PathBuf,
    pub release_branch: String,
    pub next_release_version: String,
    pub develop_branch: String,
    pub cur_develop_version: String,
    pub next_develop_version: Option<String>,
    /// Skip every push while still advancing the workflow.
    pub dry_run: bool,
    /// Root repository paths the merge must never overwrite, in addition to
    /// the submodule pointers.
    pub preserve_paths: Vec<String>,
    /// Deploy kind, credentials and StrategoXT flags for the release build.
    pub build: BuildOptions,
}

impl ReleaseConfig {
    pub fn tag_name(&self) -> String {
        format!("{}/{}", self.release_branch, self.next_release_version)
    }
}

pub struct ReleaseWorkflow<'a> {
    config: ReleaseConfig,
    collaborators: Collaborators<'a>,
}

impl<'a> ReleaseWorkflow<'a> {
    pub fn new(config: ReleaseConfig, collaborators: Collaborators<'a>) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    fn vcs(&self) -> &dyn VersionControl {
        self.collaborators.vcs
    }

    fn root(&self) -> &Path {
        &self.config.repo
    }

    /// Check out `branch` everywhere, pull, update submodules, and return the
    /// configured branch of every submodule.
    fn prepare_branch(&self, branch: &str) -> anyhow::Result<BTreeMap<String, String>> {
        let vcs = self.vcs();
        let root = self.root();
        vcs.checkout(root, branch)?;
        submodules::checkout_all(vcs, root, branch)?;
        vcs.pull(root)?;
        // Check out again in case .gitmodules changed.
        submodules::checkout_all(vcs, root, branch)?;
        submodules::update_all(vcs, root)?;

        Ok(vcs
            .submodules(root)?
            .into_iter()
            .filter_map(|s| s.branch.map(|branch| (s.name, branch)))
            .collect())
    }

    /// Make `release` identical to `develop` while keeping the release branch
    /// as first parent: merge with the ours strategy, move the index to the
    /// development tree, and amend the merge commit.
    fn merge_keeping_parentage(
        &self,
        repo: &Path,
        develop: &str,
        release: &str,
        preserve: &[String],
    ) -> Result<(), GitError> {
        let vcs = self.vcs();
        vcs.merge(repo, develop, MergeStrategy::Ours)?;
        vcs.checkout_detached(repo, develop)?;
        vcs.reset(repo, release, ResetMode::Soft)?;
        vcs.checkout(repo, release)?;
        vcs.restore_paths(repo, release, preserve)?;
        vcs.commit(repo, "", CommitOptions::amend().allow_empty())?;
        Ok(())
    }

    fn merge_root(&self, mode: ExecutionMode) -> anyhow::Result<Transition<ReleaseStep>> {
        let root = self.root();
        let mut preserve = self.config.preserve_paths.clone();
        preserve.extend(submodule_paths(root, &self.vcs().submodules(root)?));

        let next = Transition::Checkpoint {
            next: ReleaseStep::MergeSubmodules,
            message: "Please fix any conflicts and commit all changes in the root repository, then continue"
                .to_string(),
        };
        match self.merge_keeping_parentage(
            root,
            &self.config.develop_branch,
            &self.config.release_branch,
            &preserve,
        ) {
            Ok(()) => Ok(next),
            Err(GitError::MergeConflict { .. }) if mode.is_interactive() => {
                tracing::warn!("Automatic merge failed, resolve the conflicts manually");
                Ok(next)
            }
            Err(e) => Err(e).context("Merging the development branch into the release branch failed"),
        }
    }

    fn merge_submodules(
        &self,
        state: &WorkflowState,
        mode: ExecutionMode,
    ) -> anyhow::Result<Transition<ReleaseStep>> {
        let vcs = self.vcs();
        let root = self.root();
        if vcs.is_dirty(root)?
            && !check_guard(mode, self.collaborators.confirm, "You have uncommitted changes in the root repository")?
        {
            return Ok(Transition::Halt);
        }

        let dev_branches: BTreeMap<String, String> = state.get(DEV_BRANCHES_KEY)?.unwrap_or_default();
        let rel_branches: BTreeMap<String, String> = state.get(REL_BRANCHES_KEY)?.unwrap_or_default();

        let mut conflicts = Vec::new();
        let mut failures = Vec::new();
        for submodule in vcs.submodules(root)? {
            if !submodule.initialized {
                tracing::warn!(submodule = %submodule.name, "Skipping uninitialized submodule");
                continue;
            }
            let develop = branch_or_default(&dev_branches, &submodule.name, &self.config.develop_branch, "development");
            let release = branch_or_default(&rel_branches, &submodule.name, &self.config.release_branch, "release");

            tracing::info!(submodule = %submodule.name, "Merging submodule");
            match self.merge_keeping_parentage(&submodule.path, develop, release, &[]) {
                Ok(()) => {}
                Err(e) if !mode.is_interactive() => {
                    return Err(e).with_context(|| format!("Merging submodule {} failed", submodule.name));
                }
                Err(GitError::MergeConflict { .. }) => {
                    tracing::warn!(submodule = %submodule.name, "Automatic merge failed");
                    conflicts.push(submodule.name);
                }
                Err(e) => {
                    tracing::error!(submodule = %submodule.name, error = %e, "Merging submodule failed");
                    failures.push(format!("{}: {e}", submodule.name));
                }
            }
        }

        if !failures.is_empty() {
            anyhow::bail!("Merging failed in submodules: {}", failures.join("; "));
        }
        let message = if conflicts.is_empty() {
            "Please fix any conflicts and commit all changes in all submodules, then continue".to_string()
        } else {
            format!(
                "Please fix the conflicts in {} and commit all changes in all submodules, then continue",
                conflicts.join(", ")
            )
        };
        Ok(Transition::Checkpoint {
            next: ReleaseStep::SetReleaseVersions,
            message,
        })
    }

    /// Rewrite versions with commits in every submodule, then commit the new
    /// submodule revisions in the root repository.
    fn set_versions(&self, from: &str, to: &str) -> anyhow::Result<()> {
        let root = self.root();
        self.collaborators
            .versions
            .rewrite(root, from, to, RewriteOptions::commit())?;
        tracing::info!("Updating submodule revisions");
        self.vcs().add_all(root)?;
        self.vcs().commit(
            root,
            "Update submodule revisions",
            CommitOptions::default().allow_empty(),
        )?;
        Ok(())
    }

    fn set_release_versions(&self, mode: ExecutionMode) -> anyhow::Result<Transition<ReleaseStep>> {
        let dirty = submodules::dirty_submodules(self.vcs(), self.root())?;
        if !dirty.is_empty() {
            let warning = format!("You have uncommitted changes in submodules {}", dirty.join(", "));
            if !check_guard(mode, self.collaborators.confirm, &warning)? {
                return Ok(Transition::Halt);
            }
        }

        self.set_versions(&self.config.cur_develop_version, &self.config.next_release_version)?;
        Ok(Transition::Checkpoint {
            next: ReleaseStep::BuildDeploy,
            message: "Please check if versions have been set correctly, then continue".to_string(),
        })
    }

    fn build_deploy(&self) -> anyhow::Result<Transition<ReleaseStep>> {
        let mut options = self.config.build.clone();
        options.build_stratego = true;
        options.bintray_version = Some(self.config.next_release_version.clone());

        self.collaborators
            .builds
            .run_build(&[ALL_TARGET, "eclipse-instances"], &options)
            .context("Build and deploy failed, not continuing to the next step")?;
        Ok(Transition::Checkpoint {
            next: ReleaseStep::Tag,
            message: "Please check if building and deploying succeeded, then continue".to_string(),
        })
    }

    fn tag(&self) -> anyhow::Result<Transition<ReleaseStep>> {
        let name = self.config.tag_name();
        let message = format!("Tag for {} release", self.config.next_release_version);
        submodules::tag_all(self.vcs(), self.root(), &name, &message)?;
        tracing::info!(tag = %name, "Creating tag");
        self.vcs().tag(self.root(), &name, &message)?;
        Ok(Transition::Next(ReleaseStep::PushRelease))
    }

    fn push(&self, tags: bool) -> anyhow::Result<()> {
        if self.config.dry_run {
            tracing::info!(tags, "Dry run, not pushing");
            return Ok(());
        }
        let vcs = self.vcs();
        submodules::push_all(vcs, self.root(), false)?;
        if tags {
            submodules::push_all(vcs, self.root(), true)?;
        }
        tracing::info!("Pushing");
        vcs.push(self.root(), false)?;
        if tags {
            vcs.push(self.root(), true)?;
        }
        Ok(())
    }

    fn set_develop_versions(&self) -> anyhow::Result<Transition<ReleaseStep>> {
        match &self.config.next_develop_version {
            Some(next) => {
                self.set_versions(&self.config.cur_develop_version, next)?;
                Ok(Transition::Checkpoint {
                    next: ReleaseStep::PushDevelop,
                    message: "Please check if versions have been set correctly, then continue"
                        .to_string(),
                })
            }
            None => {
                tracing::info!("Skipping, no next development version has been set");
                Ok(Transition::Next(ReleaseStep::PushDevelop))
            }
        }
    }

    /// Force the release and then the development branch, in the root and
    /// every submodule, back to their remote tracking branches and remove
    /// untracked files. Every repository is attempted; the persisted state
    /// is always reset.
    pub fn revert(&self, store: &dyn StateStore) -> anyhow::Result<()> {
        let state = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable workflow state");
            WorkflowState::default()
        });
        let dev_branches: BTreeMap<String, String> =
            state.get(DEV_BRANCHES_KEY).ok().flatten().unwrap_or_default();
        let rel_branches: BTreeMap<String, String> =
            state.get(REL_BRANCHES_KEY).ok().flatten().unwrap_or_default();

        let mut failures = Vec::new();
        let mut attempt = |what: String, result: Result<(), GitError>| {
            if let Err(e) = result {
                tracing::error!(error = %e, "Reverting {what} failed");
                failures.push(format!("{what}: {e}"));
            }
        };

        let vcs = self.vcs();
        let root = self.root();
        let entries = vcs.submodules(root).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cannot list submodules, reverting root repository only");
            Vec::new()
        });
        for (branch, captured) in [
            (&self.config.release_branch, &rel_branches),
            (&self.config.develop_branch, &dev_branches),
        ] {
            tracing::info!(branch = %branch, "Reverting branch");
            attempt(format!("root repository ({branch})"), reset_to_remote(vcs, root, branch));
            for submodule in entries.iter().filter(|s| s.initialized) {
                // `entries` was read before the root checkout, its branches
                // belong to neither pass.
                let sub_branch = captured.get(&submodule.name).unwrap_or(branch);
                attempt(
                    format!("submodule {} ({sub_branch})", submodule.name),
                    reset_to_remote(vcs, &submodule.path, sub_branch),
                );
            }
        }

        store.reset()?;
        if failures.is_empty() {
            tracing::info!("Release reverted");
            Ok(())
        } else {
            anyhow::bail!("Reverting failed for {}", failures.join("; "))
        }
    }
}

fn reset_to_remote(vcs: &dyn VersionControl, repo: &Path, branch: &str) -> Result<(), GitError> {
    vcs.checkout(repo, branch)?;
    vcs.reset(repo, &tracking_ref(vcs, branch), ResetMode::Hard)?;
    vcs.clean(repo)
}

fn branch_or_default<'b>(
    captured: &'b BTreeMap<String, String>,
    submodule: &str,
    default: &'b str,
    kind: &str,
) -> &'b str {
    match captured.get(submodule) {
        Some(branch) => branch,
        None => {
            tracing::warn!(submodule, "Submodule does not have a {kind} branch, assuming {default}");
            default
        }
    }
}

impl Workflow for ReleaseWorkflow<'_> {
    type Step = ReleaseStep;

    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Release
    }

    fn execute(
        &self,
        step: ReleaseStep,
        state: &mut WorkflowState,
        mode: ExecutionMode,
    ) -> anyhow::Result<Transition<ReleaseStep>> {
        tracing::info!("Step {step}");
        match step {
            ReleaseStep::PrepareDevelop => {
                let branches = self.prepare_branch(&self.config.develop_branch)?;
                state.set(DEV_BRANCHES_KEY, &branches)?;
                Ok(Transition::Next(ReleaseStep::PrepareRelease))
            }
            ReleaseStep::PrepareRelease => {
                let branches = self.prepare_branch(&self.config.release_branch)?;
                state.set(REL_BRANCHES_KEY, &branches)?;
                Ok(Transition::Next(ReleaseStep::MergeRoot))
            }
            ReleaseStep::MergeRoot => self.merge_root(mode),
            ReleaseStep::MergeSubmodules => self.merge_submodules(state, mode),
            ReleaseStep::SetReleaseVersions => self.set_release_versions(mode),
            ReleaseStep::BuildDeploy => self.build_deploy(),
            ReleaseStep::Tag => self.tag(),
            ReleaseStep::PushRelease => {
                self.push(true)?;
                Ok(Transition::Next(ReleaseStep::SwitchToDevelop))
            }
            ReleaseStep::SwitchToDevelop => {
                self.vcs().checkout(self.root(), &self.config.develop_branch)?;
                submodules::checkout_all(self.vcs(), self.root(), &self.config.develop_branch)?;
                Ok(Transition::Next(ReleaseStep::SetDevelopVersions))
            }
            ReleaseStep::SetDevelopVersions => self.set_develop_versions(),
            ReleaseStep::PushDevelop => {
                self.push(false)?;
                Ok(Transition::Finished)
            }
        }
    }
}
