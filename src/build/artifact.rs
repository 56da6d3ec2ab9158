use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A build output: where it was produced and where it goes when copied or
/// deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    /// File or directory produced by the build.
    pub location: PathBuf,
    /// Destination, relative to the directory artifacts are copied to.
    pub target: PathBuf,
    /// Package identifier in the binary repository, when the artifact is
    /// deployed there.
    pub package: Option<String>,
}

impl Artifact {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            target: target.into(),
            package: None,
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Copy this artifact to `dir.join(target)`, recursively for directories.
    pub fn copy_to(&self, dir: &Path) -> io::Result<PathBuf> {
        let destination = dir.join(&self.target);
        if self.location.is_dir() {
            for entry in WalkDir::new(&self.location) {
                let entry = entry.map_err(io::Error::other)?;
                let relative = entry
                    .path()
                    .strip_prefix(&self.location)
                    .map_err(io::Error::other)?;
                let path = destination.join(relative);
                if entry.file_type().is_dir() {
                    fs::create_dir_all(&path)?;
                } else {
                    fs::copy(entry.path(), &path)?;
                }
            }
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&self.location, &destination)?;
        }
        Ok(destination)
    }
}

/// Artifacts produced by a single step, in production order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepResult {
    pub artifacts: Vec<Artifact>,
}

impl StepResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_artifacts(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts }
    }
}

/// Aggregate of a build: the executed steps in order and their results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    steps: Vec<(String, StepResult)>,
}

impl BuildResult {
    pub(crate) fn push(&mut self, step: String, result: StepResult) {
        self.steps.push((step, result));
    }

    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.steps
            .iter()
            .find(|(step, _)| step == id)
            .map(|(_, result)| result)
    }

    /// All artifacts, in step execution order.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.steps
            .iter()
            .flat_map(|(_, result)| result.artifacts.iter())
    }

    pub fn copy_to(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        self.artifacts()
            .map(|artifact| {
                tracing::info!(artifact = %artifact.name, target = %artifact.target.display(), "Copying artifact");
                artifact.copy_to(dir)
            })
            .collect()
    }
}
