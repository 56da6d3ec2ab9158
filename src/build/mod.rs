//! Dependency-ordered build orchestration
//!
//! [`StepGraph`] holds named steps and their dependencies, [`Orchestrator`]
//! runs a linearised request against a context, and [`RelengBuilder`] wires
//! the releng step catalogue to Maven, Gradle and the deployers.

pub mod artifact;
pub mod builder;
pub mod context;
pub mod graph;
pub mod orchestrator;
pub mod steps;

pub use artifact::{Artifact, BuildResult, StepResult};
pub use builder::{clean_local_repo, BuildOptions, BuildRunner, RelengBuilder};
pub use context::{BuildContext, InstanceGenerator};
pub use graph::{GraphError, StepAction, StepGraph, StepHandle, StepInput};
pub use orchestrator::{BuildError, Orchestrator};
pub use steps::{glob_one, releng_graph, ALL_TARGET};
