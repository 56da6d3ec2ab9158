use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::deploy::MavenDeployer;
use crate::external::{CommandExecutor, Gradle, Maven};

/// External generator producing the packaged IDE instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGenerator {
    pub program: String,
    pub args: Vec<String>,
    /// Directory, relative to the repository root, the archives are written to.
    pub output_dir: PathBuf,
    /// File name prefix of the generated archives.
    pub archive_prefix: String,
}

impl Default for InstanceGenerator {
    fn default() -> Self {
        Self {
            program: "eclipsegen".to_string(),
            args: [
                "generate",
                "--spoofax",
                "--local-repo",
                "--all-platforms",
                "--fix-ini",
                "--add-jre",
                "--archive-jre-separately",
                "--archive-prefix",
                "spoofax",
                "--dest",
                "dist/eclipse",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            output_dir: PathBuf::from("dist/eclipse"),
            archive_prefix: "spoofax".to_string(),
        }
    }
}

/// Read-only configuration shared by every build step of one build.
#[derive(Clone)]
pub struct BuildContext {
    pub basedir: PathBuf,
    /// Deploy instead of install.
    pub deploy: bool,
    pub skip_tests: bool,
    pub qualifier: String,
    pub build_stratego: bool,
    pub bootstrap_stratego: bool,
    pub test_stratego: bool,
    pub maven: Maven,
    pub gradle: Gradle,
    pub maven_deployer: Option<MavenDeployer>,
    pub instance_generator: InstanceGenerator,
    pub executor: Arc<dyn CommandExecutor>,
}

impl BuildContext {
    pub fn new(basedir: impl Into<PathBuf>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            basedir: basedir.into(),
            deploy: false,
            skip_tests: false,
            qualifier: String::new(),
            build_stratego: false,
            bootstrap_stratego: false,
            test_stratego: true,
            maven: Maven::new(),
            gradle: Gradle::new(),
            maven_deployer: None,
            instance_generator: InstanceGenerator::default(),
            executor,
        }
    }

    /// Maven goal for steps that publish their artifacts.
    pub fn deploy_goal(&self) -> &'static str {
        if self.deploy {
            "deploy"
        } else {
            "install"
        }
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.basedir.join(relative)
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("basedir", &self.basedir)
            .field("deploy", &self.deploy)
            .field("skip_tests", &self.skip_tests)
            .field("qualifier", &self.qualifier)
            .field("build_stratego", &self.build_stratego)
            .field("bootstrap_stratego", &self.bootstrap_stratego)
            .field("test_stratego", &self.test_stratego)
            .finish_non_exhaustive()
    }
}
