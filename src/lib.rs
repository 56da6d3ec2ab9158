// Releng Library - dependency-ordered builds and resumable release workflows
// This exposes the core components for testing and integration

pub mod build;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod external;
pub mod git;
pub mod state;
pub mod telemetry;
pub mod versions;
pub mod workflows;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types for easy access
pub use build::{
    Artifact, BuildError, BuildOptions, BuildResult, BuildRunner, GraphError, Orchestrator,
    RelengBuilder, StepGraph, StepResult,
};
pub use crate::config::{config, RelengConfig};
pub use deploy::{BintrayCredentials, DeployError, DeployKind};
pub use external::{CommandExecutor, GitClient, ProcessCommandExecutor, VersionControl};
pub use git::{create_now_qualifier, create_qualifier, GitError};
pub use state::{FileStateStore, StateError, StateStore, WorkflowKind, WorkflowState};
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use versions::{TreeVersionRewriter, VersionError, VersionRewriter};
pub use workflows::{
    BootstrapWorkflow, ExecutionMode, ReleaseWorkflow, RunOutcome, WorkflowError, WorkflowRunner,
};
