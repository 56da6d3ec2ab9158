use std::collections::BTreeMap;

use thiserror::Error;
use tracing::info_span;

use super::artifact::BuildResult;
use super::graph::{GraphError, StepGraph, StepInput};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Build step '{step}' failed: {source:#}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BuildError {
    /// Identifier of the step that failed, if a step failed.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            BuildError::StepFailed { step, .. } => Some(step),
            BuildError::Graph(_) => None,
        }
    }
}

/// Runs the steps of a [`StepGraph`] in dependency order.
pub struct Orchestrator<C> {
    graph: StepGraph<C>,
    dependency_analysis: bool,
}

impl<C> Orchestrator<C> {
    pub fn new(graph: StepGraph<C>) -> Self {
        Self {
            graph,
            dependency_analysis: true,
        }
    }

    /// When disabled, only the requested steps run and their dependencies are
    /// assumed to be built already.
    pub fn with_dependency_analysis(mut self, enabled: bool) -> Self {
        self.dependency_analysis = enabled;
        self
    }

    pub fn graph(&self) -> &StepGraph<C> {
        &self.graph
    }

    /// Steps that `build(requested)` would run, in order.
    pub fn plan(&self, requested: &[&str]) -> Result<Vec<String>, GraphError> {
        Ok(self
            .graph
            .order(requested, self.dependency_analysis)?
            .into_iter()
            .map(|handle| self.graph.id(handle).to_string())
            .collect())
    }

    /// Execute the requested steps and targets. Stops at the first failing
    /// step; no later step runs.
    pub fn build(&self, requested: &[&str], context: &C) -> Result<BuildResult, BuildError> {
        let order = self.graph.order(requested, self.dependency_analysis)?;
        tracing::info!(
            steps = ?order.iter().map(|h| self.graph.id(*h)).collect::<Vec<_>>(),
            "Executing build steps"
        );

        let mut produced = BTreeMap::new();
        let mut result = BuildResult::default();
        for handle in order {
            let step = self.graph.id(handle).to_string();
            let span = info_span!("build_step", step = %step);
            let _guard = span.enter();

            tracing::info!("Running build step");
            let input = StepInput {
                context,
                produced: &produced,
            };
            let output = self.graph.run_step(handle, &input).map_err(|source| {
                tracing::error!(error = %format!("{source:#}"), "Build step failed");
                BuildError::StepFailed {
                    step: step.clone(),
                    source,
                }
            })?;

            produced.insert(step.clone(), output.clone());
            result.push(step, output);
        }
        Ok(result)
    }
}
