//! Bootstrap workflow
//!
//! Publishes a new baseline: sets a synthetic `-baseline-` version, test
//! builds and deploys the languages, then reverts to the development version
//! while moving the baseline pointer forward.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};

use super::runner::{check_guard, Collaborators, ExecutionMode, Transition, Workflow, WorkflowStep};
use crate::build::BuildOptions;
use crate::external::CommitOptions;
use crate::git::submodules;
use crate::state::{WorkflowKind, WorkflowState};
use crate::versions::RewriteOptions;

const BASELINE_KEY: &str = "version";
const BOOTSTRAP_TARGETS: [&str; 2] = ["languages", "spt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapStep {
    SetBaselineVersion,
    TestBuild,
    Deploy,
    RestoreVersions,
    Push,
}

impl BootstrapStep {
    pub const ALL: [BootstrapStep; 5] = [
        BootstrapStep::SetBaselineVersion,
        BootstrapStep::TestBuild,
        BootstrapStep::Deploy,
        BootstrapStep::RestoreVersions,
        BootstrapStep::Push,
    ];
}

impl WorkflowStep for BootstrapStep {
    fn index(self) -> u32 {
        self as u32
    }

    fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            BootstrapStep::SetBaselineVersion => {
                "for each submodule: set version from the current version to the next baseline version"
            }
            BootstrapStep::TestBuild => "test release build",
            BootstrapStep::Deploy => "perform release deployment",
            BootstrapStep::RestoreVersions => {
                "for each submodule: revert to the current version and update the baseline version"
            }
            BootstrapStep::Push => "push submodules and repository",
        };
        write!(f, "{} ({description})", self.index())
    }
}

/// `2.1.0-SNAPSHOT` at 2016-05-04 13:02:01 becomes
/// `2.1.0-baseline-20160504-130201`.
pub fn baseline_version(current: &str, now: DateTime<Local>) -> String {
    format!(
        "{}-baseline-{}",
        current.replace("-SNAPSHOT", ""),
        now.format("%Y%m%d-%H%M%S")
    )
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub repo: PathBuf,
    pub cur_version: String,
    pub cur_baseline_version: String,
    /// Deploy kind, credentials and Maven/Gradle settings shared by both builds.
    pub build: BuildOptions,
    /// Timestamp for a newly computed baseline version.
    pub now: DateTime<Local>,
}

pub struct BootstrapWorkflow<'a> {
    config: BootstrapConfig,
    collaborators: Collaborators<'a>,
}

impl<'a> BootstrapWorkflow<'a> {
    pub fn new(config: BootstrapConfig, collaborators: Collaborators<'a>) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    fn root(&self) -> &Path {
        &self.config.repo
    }

    fn baseline(state: &WorkflowState) -> anyhow::Result<String> {
        state
            .get_string(BASELINE_KEY)
            .map(str::to_string)
            .context("No baseline version recorded, reset the bootstrap state and start again")
    }

    fn rewrite(&self, from: &str, to: &str, commit: bool) -> anyhow::Result<()> {
        let options = RewriteOptions {
            dry_run: false,
            commit,
        };
        self.collaborators
            .versions
            .rewrite(self.root(), from, to, options)?;
        Ok(())
    }

    fn set_baseline_version(
        &self,
        state: &WorkflowState,
        mode: ExecutionMode,
    ) -> anyhow::Result<Transition<BootstrapStep>> {
        let dirty = submodules::dirty_submodules(self.collaborators.vcs, self.root())?;
        if !dirty.is_empty() {
            let warning = format!("You have uncommitted changes in submodules {}", dirty.join(", "));
            if !check_guard(mode, self.collaborators.confirm, &warning)? {
                return Ok(Transition::Halt);
            }
        }

        let baseline = Self::baseline(state)?;
        self.rewrite(&self.config.cur_version, &baseline, false)?;
        Ok(Transition::Checkpoint {
            next: BootstrapStep::TestBuild,
            message: "Please check if versions have been set correctly, then continue".to_string(),
        })
    }

    fn test_build(&self) -> anyhow::Result<Transition<BootstrapStep>> {
        let options = BuildOptions {
            deploy_kind: None,
            skip_tests: false,
            build_stratego: true,
            test_stratego: true,
            ..self.config.build.clone()
        };
        self.collaborators
            .builds
            .run_build(&BOOTSTRAP_TARGETS, &options)
            .context("Test release build failed, not continuing to the next step")?;
        Ok(Transition::Checkpoint {
            next: BootstrapStep::Deploy,
            message: "Please check if the built artifacts work, then continue".to_string(),
        })
    }

    fn deploy(&self, state: &WorkflowState) -> anyhow::Result<Transition<BootstrapStep>> {
        if self.config.build.deploy_kind.is_none() {
            anyhow::bail!("No deploy kind configured for the baseline deployment");
        }
        let options = BuildOptions {
            clean: false,
            skip_tests: true,
            build_stratego: true,
            test_stratego: false,
            bintray_version: Some(Self::baseline(state)?),
            ..self.config.build.clone()
        };
        self.collaborators
            .builds
            .run_build(&BOOTSTRAP_TARGETS, &options)
            .context("Baseline deployment failed")?;
        Ok(Transition::Checkpoint {
            next: BootstrapStep::RestoreVersions,
            message: "Please check if deploying succeeded, and manually deploy extra artifacts, then continue"
                .to_string(),
        })
    }

    fn restore_versions(&self, state: &WorkflowState) -> anyhow::Result<Transition<BootstrapStep>> {
        let baseline = Self::baseline(state)?;
        self.rewrite(&baseline, &self.config.cur_version, false)?;
        self.rewrite(&self.config.cur_baseline_version, &baseline, true)?;

        tracing::info!("Updating submodule revisions");
        let vcs = self.collaborators.vcs;
        vcs.add_all(self.root())?;
        vcs.commit(
            self.root(),
            "Update submodule revisions",
            CommitOptions::default().allow_empty(),
        )?;
        Ok(Transition::Checkpoint {
            next: BootstrapStep::Push,
            message: "Please check if versions have been set correctly, then continue".to_string(),
        })
    }

    fn push(&self) -> anyhow::Result<Transition<BootstrapStep>> {
        let vcs = self.collaborators.vcs;
        submodules::push_all(vcs, self.root(), false)?;
        tracing::info!("Pushing");
        vcs.push(self.root(), false)?;
        Ok(Transition::Finished)
    }
}

impl Workflow for BootstrapWorkflow<'_> {
    type Step = BootstrapStep;

    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Bootstrap
    }

    fn prepare(&self, state: &mut WorkflowState) -> anyhow::Result<bool> {
        if let Some(baseline) = state.get_string(BASELINE_KEY) {
            tracing::info!(baseline = %baseline, "Reusing baseline version");
            return Ok(false);
        }
        let baseline = baseline_version(&self.config.cur_version, self.config.now);
        tracing::info!(baseline = %baseline, "Next baseline version");
        state.set(BASELINE_KEY, &baseline)?;
        Ok(true)
    }

    fn execute(
        &self,
        step: BootstrapStep,
        state: &mut WorkflowState,
        mode: ExecutionMode,
    ) -> anyhow::Result<Transition<BootstrapStep>> {
        tracing::info!("Step {step}");
        match step {
            BootstrapStep::SetBaselineVersion => self.set_baseline_version(state, mode),
            BootstrapStep::TestBuild => self.test_build(),
            BootstrapStep::Deploy => self.deploy(state),
            BootstrapStep::RestoreVersions => self.restore_versions(state),
            BootstrapStep::Push => self.push(),
        }
    }
}
