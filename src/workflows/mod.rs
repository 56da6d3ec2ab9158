//! Resumable release and bootstrap workflows
//!
//! Both workflows persist their step index after every transition, so an
//! interrupted or paused run continues where it stopped on the next
//! invocation.

pub mod bootstrap;
pub mod prompt;
pub mod release;
pub mod runner;

pub use bootstrap::{baseline_version, BootstrapConfig, BootstrapStep, BootstrapWorkflow};
pub use prompt::{Confirm, FixedConfirm, StdinConfirm};
pub use release::{ReleaseConfig, ReleaseStep, ReleaseWorkflow};
pub use runner::{
    check_guard, Collaborators, ExecutionMode, RunOutcome, Transition, Workflow, WorkflowError,
    WorkflowRunner, WorkflowStep,
};
