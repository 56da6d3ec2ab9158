//! Drive loop shared by the resumable workflows.
//!
//! A workflow is a fixed sequence of steps. The runner loads the persisted
//! step index, executes steps until one pauses or the workflow finishes, and
//! saves the state after every transition.

use std::fmt;

use thiserror::Error;
use tracing::info_span;

use super::prompt::Confirm;
use crate::build::BuildRunner;
use crate::external::VersionControl;
use crate::state::{StateError, StateStore, WorkflowKind, WorkflowState};
use crate::telemetry::generate_correlation_id;
use crate::versions::VersionRewriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Pause at checkpoints and ask before overriding guards.
    Interactive,
    /// Chain every step; any failure or guard violation is fatal.
    NonInteractive,
}

impl ExecutionMode {
    pub fn from_flag(non_interactive: bool) -> Self {
        if non_interactive {
            ExecutionMode::NonInteractive
        } else {
            ExecutionMode::Interactive
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, ExecutionMode::Interactive)
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{workflow} step {step} failed: {source:#}")]
    StepFailed {
        workflow: WorkflowKind,
        step: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{reason}")]
    GuardRejected { reason: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    State(#[from] StateError),
}

/// What happens after a step completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S> {
    /// Continue with `S`.
    Next(S),
    /// Continue with `next`, but in interactive mode stop first so the
    /// operator can check the result.
    Checkpoint { next: S, message: String },
    /// Stop without advancing; values captured by the step are kept.
    Halt,
    /// The last step completed; the persisted state is deleted.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Paused { next_step: u32, message: String },
    /// A confirmation was declined.
    Declined,
    /// A step failed in interactive mode; rerun to retry it.
    Failed { step: u32, error: String },
}

/// The steps of a workflow, identified by their persisted index.
pub trait WorkflowStep: Copy + fmt::Display {
    fn index(self) -> u32;
    fn from_index(index: u32) -> Option<Self>;
}

pub trait Workflow {
    type Step: WorkflowStep;

    fn kind(&self) -> WorkflowKind;

    /// Runs once per invocation before the first step. Returns whether the
    /// state was changed and must be saved.
    fn prepare(&self, _state: &mut WorkflowState) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn execute(
        &self,
        step: Self::Step,
        state: &mut WorkflowState,
        mode: ExecutionMode,
    ) -> anyhow::Result<Transition<Self::Step>>;
}

/// External collaborators the workflows act through.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub vcs: &'a dyn VersionControl,
    pub versions: &'a dyn VersionRewriter,
    pub builds: &'a dyn BuildRunner,
    pub confirm: &'a dyn Confirm,
}

/// Warn about a guard violation. Interactive mode asks whether to continue;
/// non-interactive mode fails.
pub fn check_guard(
    mode: ExecutionMode,
    confirm: &dyn Confirm,
    warning: &str,
) -> anyhow::Result<bool> {
    tracing::warn!("{warning}");
    match mode {
        ExecutionMode::Interactive => Ok(confirm.confirm("Continue anyway?")?),
        ExecutionMode::NonInteractive => Err(WorkflowError::GuardRejected {
            reason: warning.to_string(),
        }
        .into()),
    }
}

pub struct WorkflowRunner<'a> {
    store: &'a dyn StateStore,
    mode: ExecutionMode,
}

impl<'a> WorkflowRunner<'a> {
    pub fn new(store: &'a dyn StateStore, mode: ExecutionMode) -> Self {
        Self { store, mode }
    }

    pub fn run<W: Workflow>(&self, workflow: &W) -> Result<RunOutcome, WorkflowError> {
        let run_id = generate_correlation_id();
        let span = info_span!("workflow", kind = %workflow.kind(), run.id = %run_id);
        let _guard = span.enter();

        let mut state = self.store.load()?;
        if state.current_step > 0 {
            tracing::info!(
                step = state.current_step,
                location = %self.store.location(),
                "Resuming workflow"
            );
        }
        if workflow.prepare(&mut state).map_err(|source| WorkflowError::StepFailed {
            workflow: workflow.kind(),
            step: "prepare".to_string(),
            source,
        })? {
            self.store.save(&state)?;
        }

        loop {
            let step = W::Step::from_index(state.current_step).ok_or_else(|| StateError::Corrupt {
                path: self.store.location().into(),
                reason: format!(
                    "step {} is not a step of the {} workflow",
                    state.current_step,
                    workflow.kind()
                ),
            })?;
            let step_span = info_span!("workflow_step", step = %step);
            let _step_guard = step_span.enter();

            let mut working = state.clone();
            let transition = match workflow.execute(step, &mut working, self.mode) {
                Ok(transition) => transition,
                Err(source) => return self.fail(workflow.kind(), step, source),
            };

            match transition {
                Transition::Next(next) => {
                    working.current_step = next.index();
                    self.store.save(&working)?;
                    state = working;
                }
                Transition::Checkpoint { next, message } => {
                    working.current_step = next.index();
                    self.store.save(&working)?;
                    tracing::info!("{message}");
                    if self.mode.is_interactive() {
                        return Ok(RunOutcome::Paused {
                            next_step: working.current_step,
                            message,
                        });
                    }
                    state = working;
                }
                Transition::Halt => {
                    self.store.save(&working)?;
                    return Ok(RunOutcome::Declined);
                }
                Transition::Finished => {
                    self.store.reset()?;
                    tracing::info!("All done!");
                    return Ok(RunOutcome::Completed);
                }
            }
        }
    }

    fn fail<S: WorkflowStep>(
        &self,
        workflow: WorkflowKind,
        step: S,
        source: anyhow::Error,
    ) -> Result<RunOutcome, WorkflowError> {
        match self.mode {
            ExecutionMode::Interactive => {
                tracing::error!(error = %format!("{source:#}"), "Step failed, fix the problem and run the same command again");
                Ok(RunOutcome::Failed {
                    step: step.index(),
                    error: format!("{source:#}"),
                })
            }
            ExecutionMode::NonInteractive => Err(WorkflowError::StepFailed {
                workflow,
                step: step.to_string(),
                source,
            }),
        }
    }
}
