use anyhow::Result;

use super::{CommandContext, Exit};
use crate::build::{BuildOptions, BuildRunner, RelengBuilder};
use crate::deploy::{BintrayCredentials, DeployKind};
use crate::external::VersionControl;
use crate::state::{StateStore, WorkflowKind};
use crate::versions::{TreeVersionRewriter, VersionRewriter};
use crate::workflows::{
    Collaborators, Confirm, ExecutionMode, ReleaseConfig, ReleaseWorkflow, RunOutcome,
    StdinConfirm, WorkflowRunner,
};

/// Performs a release of the develop branch onto the release branch.
pub struct ReleaseCommand {
    pub release_branch: String,
    pub next_release_version: String,
    pub develop_branch: String,
    pub cur_develop_version: String,
    pub deploy_kind: String,
    pub next_develop_version: Option<String>,
    pub non_interactive: bool,
    pub dry_run: bool,
    pub reset_release: bool,
    pub revert_release: bool,
    pub bootstrap_stratego: bool,
    pub test_stratego: bool,
    pub bintray_username: Option<String>,
    pub bintray_key: Option<String>,
}

impl ReleaseCommand {
    pub fn new(
        release_branch: impl Into<String>,
        next_release_version: impl Into<String>,
        develop_branch: impl Into<String>,
        cur_develop_version: impl Into<String>,
        deploy_kind: impl Into<String>,
    ) -> Self {
        Self {
            release_branch: release_branch.into(),
            next_release_version: next_release_version.into(),
            develop_branch: develop_branch.into(),
            cur_develop_version: cur_develop_version.into(),
            deploy_kind: deploy_kind.into(),
            next_develop_version: None,
            non_interactive: false,
            dry_run: false,
            reset_release: false,
            revert_release: false,
            bootstrap_stratego: false,
            test_stratego: true,
            bintray_username: None,
            bintray_key: None,
        }
    }

    pub fn with_next_develop_version(mut self, version: Option<String>) -> Self {
        self.next_develop_version = version;
        self
    }

    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_reset(mut self, reset_release: bool) -> Self {
        self.reset_release = reset_release;
        self
    }

    pub fn with_revert(mut self, revert_release: bool) -> Self {
        self.revert_release = revert_release;
        self
    }

    pub fn with_stratego(mut self, bootstrap: bool, test: bool) -> Self {
        self.bootstrap_stratego = bootstrap;
        self.test_stratego = test;
        self
    }

    pub fn with_bintray_credentials(mut self, username: Option<String>, key: Option<String>) -> Self {
        self.bintray_username = username;
        self.bintray_key = key;
        self
    }

    pub fn execute(&self, context: &CommandContext) -> Result<Exit> {
        let store = context.state_store(WorkflowKind::Release)?;
        if self.reset_release {
            store.reset()?;
            println!("🧹 Release state at {} reset", store.location());
            return Ok(Exit::Success);
        }

        let mut lock = context.state_lock(WorkflowKind::Release)?;
        let _guard = match lock.as_mut() {
            Some(lock) => Some(lock.try_acquire()?),
            None => None,
        };

        let vcs = context.git();
        let versions = TreeVersionRewriter::new(&vcs);
        let builds = RelengBuilder::new(context.repo(), context.executor.clone())?
            .with_instance_generator(context.config.packaging.clone());
        let confirm = StdinConfirm;

        self.run(context, &store, &vcs, &versions, &builds, &confirm)
    }

    /// Everything after state reset and locking, against the given collaborators.
    pub fn run(
        &self,
        context: &CommandContext,
        store: &dyn StateStore,
        vcs: &dyn VersionControl,
        versions: &dyn VersionRewriter,
        builds: &dyn BuildRunner,
        confirm: &dyn Confirm,
    ) -> Result<Exit> {
        let collaborators = Collaborators {
            vcs,
            versions,
            builds,
            confirm,
        };

        // Reverting only touches branches, it needs no deploy configuration.
        if self.revert_release {
            let workflow = ReleaseWorkflow::new(
                self.workflow_config(context, context.config.build_options()),
                collaborators,
            );
            println!("⏪ Reverting release");
            workflow.revert(store)?;
            println!("✅ Release reverted, state cleared");
            return Ok(Exit::Success);
        }

        let config = match self.release_config(context) {
            Ok(config) => config,
            Err(e) => {
                println!("❌ {e:#}");
                return Ok(Exit::Failure);
            }
        };
        let workflow = ReleaseWorkflow::new(config, collaborators);

        println!("🚀 Performing release");
        let mode = ExecutionMode::from_flag(self.non_interactive);
        let outcome = WorkflowRunner::new(store, mode).run(&workflow)?;
        Ok(report(outcome))
    }

    /// Deploy kind and credential checks run before any repository is touched.
    fn release_config(&self, context: &CommandContext) -> Result<ReleaseConfig> {
        let kind = DeployKind::lookup(&context.config.deploy.kinds, &self.deploy_kind)?;
        let credentials = BintrayCredentials::resolve(
            self.bintray_username.clone().or(context.config.bintray.username.clone()),
            self.bintray_key.clone().or(context.config.bintray.key.clone()),
        );
        kind.check_releasable(credentials.as_ref())?;

        let mut build = context.config.build_options();
        build.deploy_kind = Some(kind);
        build.bintray_credentials = credentials;
        build.bootstrap_stratego = self.bootstrap_stratego;
        build.test_stratego = self.test_stratego;

        Ok(self.workflow_config(context, build))
    }

    fn workflow_config(&self, context: &CommandContext, build: BuildOptions) -> ReleaseConfig {
        ReleaseConfig {
            repo: context.repo.clone(),
            release_branch: self.release_branch.clone(),
            next_release_version: self.next_release_version.clone(),
            develop_branch: self.develop_branch.clone(),
            cur_develop_version: self.cur_develop_version.clone(),
            next_develop_version: self.next_develop_version.clone(),
            dry_run: self.dry_run,
            preserve_paths: context.config.git.preserve_paths.clone(),
            build,
        }
    }
}

/// Print the outcome of a workflow run and map it to an exit status.
pub fn report(outcome: RunOutcome) -> Exit {
    match outcome {
        RunOutcome::Completed => {
            println!("🎉 Workflow completed");
            Exit::Success
        }
        RunOutcome::Paused { next_step, message } => {
            println!("⏸️  {message}");
            println!("   Run the same command again to continue with step {next_step}");
            Exit::Success
        }
        RunOutcome::Declined => {
            println!("🛑 Stopped, confirmation declined");
            Exit::Failure
        }
        RunOutcome::Failed { step, error } => {
            println!("❌ Step {step} failed: {error}");
            println!("   Fix the problem and run the same command again to retry the step");
            Exit::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelengConfig;
    use crate::state::{MemoryStateStore, WorkflowState};
    use crate::testing::{GitCall, MockVersionControl, RecordingBuilds, RecordingRewriter, ScriptedConfirm};

    const ROOT: &str = "/work/spoofax-releng";

    fn context_with_credentials() -> CommandContext {
        let mut config = RelengConfig::default();
        config.bintray.username = Some("releaser".to_string());
        config.bintray.key = Some("secret".to_string());
        CommandContext::new(ROOT, config)
    }

    fn command(kind: &str) -> ReleaseCommand {
        ReleaseCommand::new("master", "2.0.0", "develop", "2.0.0-SNAPSHOT", kind)
    }

    #[test]
    fn test_snapshot_kind_is_rejected_before_any_effect() {
        let vcs = MockVersionControl::new(ROOT);
        let store = MemoryStateStore::new();
        let exit = command("snapshot")
            .run(
                &context_with_credentials(),
                &store,
                &vcs,
                &RecordingRewriter::default(),
                &RecordingBuilds::default(),
                &ScriptedConfirm::new([]),
            )
            .unwrap();

        assert_eq!(exit, Exit::Failure);
        assert!(vcs.calls().is_empty());
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let vcs = MockVersionControl::new(ROOT);
        let exit = command("nightly")
            .run(
                &context_with_credentials(),
                &MemoryStateStore::new(),
                &vcs,
                &RecordingRewriter::default(),
                &RecordingBuilds::default(),
                &ScriptedConfirm::new([]),
            )
            .unwrap();

        assert_eq!(exit, Exit::Failure);
        assert!(vcs.calls().is_empty());
    }

    #[test]
    fn test_release_config_carries_kind_and_stratego_flags() {
        let config = command("release")
            .with_stratego(true, false)
            .with_dry_run(true)
            .release_config(&context_with_credentials())
            .unwrap();

        let kind = config.build.deploy_kind.as_ref().unwrap();
        assert_eq!(kind.name, "release");
        assert!(config.build.bootstrap_stratego);
        assert!(!config.build.test_stratego);
        assert!(config.dry_run);
        assert_eq!(config.preserve_paths, vec![".gitmodules"]);
        assert_eq!(config.build.bintray_credentials.unwrap().username, "releaser");
    }

    #[test]
    fn test_first_interactive_run_pauses_after_root_merge() {
        let vcs = MockVersionControl::new(ROOT);
        let store = MemoryStateStore::new();
        let exit = command("release")
            .run(
                &context_with_credentials(),
                &store,
                &vcs,
                &RecordingRewriter::default(),
                &RecordingBuilds::default(),
                &ScriptedConfirm::new([]),
            )
            .unwrap();

        assert_eq!(exit, Exit::Success);
        assert!(vcs.calls().contains(&GitCall::Checkout(ROOT.into(), "develop".to_string())));
        assert_eq!(store.snapshot().unwrap().current_step, 4);
    }

    #[test]
    fn test_revert_clears_state() {
        let vcs = MockVersionControl::new(ROOT);
        let store = MemoryStateStore::with_state(WorkflowState::at_step(6));
        let exit = command("release")
            .with_revert(true)
            .run(
                &context_with_credentials(),
                &store,
                &vcs,
                &RecordingRewriter::default(),
                &RecordingBuilds::default(),
                &ScriptedConfirm::new([]),
            )
            .unwrap();

        assert_eq!(exit, Exit::Success);
        assert!(store.snapshot().is_none());
        assert_eq!(vcs.calls()[0], GitCall::Checkout(ROOT.into(), "master".to_string()));
    }

    #[test]
    fn test_revert_needs_no_deploy_credentials() {
        let vcs = MockVersionControl::new(ROOT);
        let store = MemoryStateStore::with_state(WorkflowState::at_step(6));
        let exit = command("release")
            .with_revert(true)
            .run(
                &CommandContext::new(ROOT, RelengConfig::default()),
                &store,
                &vcs,
                &RecordingRewriter::default(),
                &RecordingBuilds::default(),
                &ScriptedConfirm::new([]),
            )
            .unwrap();

        assert_eq!(exit, Exit::Success);
        assert!(store.snapshot().is_none());
        assert!(vcs.calls().contains(&GitCall::Checkout(ROOT.into(), "develop".to_string())));
    }

    #[test]
    fn test_report_exit_statuses() {
        assert_eq!(report(RunOutcome::Completed), Exit::Success);
        assert_eq!(
            report(RunOutcome::Paused {
                next_step: 5,
                message: "Check the merge".to_string()
            }),
            Exit::Success
        );
        assert_eq!(report(RunOutcome::Declined), Exit::Failure);
        assert_eq!(
            report(RunOutcome::Failed {
                step: 6,
                error: "build failed".to_string()
            }),
            Exit::Failure
        );
    }
}
