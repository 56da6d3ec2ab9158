use anyhow::Result;
use chrono::Local;

use super::release::report;
use super::{CommandContext, Exit};
use crate::build::{BuildRunner, RelengBuilder};
use crate::deploy::DeployKind;
use crate::external::VersionControl;
use crate::state::{StateStore, WorkflowKind};
use crate::versions::{TreeVersionRewriter, VersionRewriter};
use crate::workflows::{
    BootstrapConfig, BootstrapWorkflow, Collaborators, Confirm, ExecutionMode, StdinConfirm,
    WorkflowRunner,
};

/// Performs an interactive bootstrap to deploy a new baseline.
pub struct BootstrapCommand {
    cur_version: String,
    cur_baseline_version: String,
    deploy_kind: String,
    reset: bool,
}

impl BootstrapCommand {
    pub fn new(cur_version: impl Into<String>, cur_baseline_version: impl Into<String>) -> Self {
        Self {
            cur_version: cur_version.into(),
            cur_baseline_version: cur_baseline_version.into(),
            deploy_kind: "release".to_string(),
            reset: false,
        }
    }

    pub fn with_deploy_kind(mut self, deploy_kind: impl Into<String>) -> Self {
        self.deploy_kind = deploy_kind.into();
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn execute(&self, context: &CommandContext) -> Result<Exit> {
        let store = context.state_store(WorkflowKind::Bootstrap)?;
        if self.reset {
            store.reset()?;
            println!("🧹 Bootstrap state at {} reset", store.location());
            return Ok(Exit::Success);
        }

        let mut lock = context.state_lock(WorkflowKind::Bootstrap)?;
        let _guard = match lock.as_mut() {
            Some(lock) => Some(lock.try_acquire()?),
            None => None,
        };

        let vcs = context.git();
        let versions = TreeVersionRewriter::new(&vcs);
        let builds = RelengBuilder::new(context.repo(), context.executor.clone())?
            .with_instance_generator(context.config.packaging.clone());

        self.run(context, &store, &vcs, &versions, &builds, &StdinConfirm)
    }

    pub fn run(
        &self,
        context: &CommandContext,
        store: &dyn StateStore,
        vcs: &dyn VersionControl,
        versions: &dyn VersionRewriter,
        builds: &dyn BuildRunner,
        confirm: &dyn Confirm,
    ) -> Result<Exit> {
        let kind = match DeployKind::lookup(&context.config.deploy.kinds, &self.deploy_kind) {
            Ok(kind) => kind,
            Err(e) => {
                println!("❌ {e}");
                return Ok(Exit::Failure);
            }
        };
        let mut build = context.config.build_options();
        build.deploy_kind = Some(kind);

        let workflow = BootstrapWorkflow::new(
            BootstrapConfig {
                repo: context.repo.clone(),
                cur_version: self.cur_version.clone(),
                cur_baseline_version: self.cur_baseline_version.clone(),
                build,
                now: Local::now(),
            },
            Collaborators {
                vcs,
                versions,
                builds,
                confirm,
            },
        );

        println!("🥾 Performing interactive bootstrap");
        let outcome = WorkflowRunner::new(store, ExecutionMode::Interactive).run(&workflow)?;
        Ok(report(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelengConfig;
    use crate::state::MemoryStateStore;
    use crate::testing::{MockVersionControl, RecordingBuilds, RecordingRewriter, ScriptedConfirm};

    const ROOT: &str = "/work/spoofax-releng";

    #[test]
    fn test_first_run_sets_baseline_and_pauses() {
        let context = CommandContext::new(ROOT, RelengConfig::default());
        let store = MemoryStateStore::new();
        let versions = RecordingRewriter::default();

        let exit = BootstrapCommand::new("2.1.0-SNAPSHOT", "2.0.0-baseline-20160101-000000")
            .run(
                &context,
                &store,
                &MockVersionControl::new(ROOT),
                &versions,
                &RecordingBuilds::default(),
                &ScriptedConfirm::new([]),
            )
            .unwrap();

        assert_eq!(exit, Exit::Success);
        let rewrites = versions.rewrites();
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].0, "2.1.0-SNAPSHOT");
        assert!(rewrites[0].1.starts_with("2.1.0-baseline-"));

        let state = store.snapshot().unwrap();
        assert_eq!(state.current_step, 1);
        assert_eq!(state.get_string("version"), Some(rewrites[0].1.as_str()));
    }

    #[test]
    fn test_unknown_deploy_kind_fails() {
        let context = CommandContext::new(ROOT, RelengConfig::default());
        let store = MemoryStateStore::new();

        let exit = BootstrapCommand::new("2.1.0-SNAPSHOT", "2.0.0-baseline-20160101-000000")
            .with_deploy_kind("nightly")
            .run(
                &context,
                &store,
                &MockVersionControl::new(ROOT),
                &RecordingRewriter::default(),
                &RecordingBuilds::default(),
                &ScriptedConfirm::new([]),
            )
            .unwrap();

        assert_eq!(exit, Exit::Failure);
        assert!(store.snapshot().is_none());
    }
}
