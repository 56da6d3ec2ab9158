use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use super::artifact::BuildResult;
use super::context::{BuildContext, InstanceGenerator};
use super::graph::GraphError;
use super::orchestrator::Orchestrator;
use super::steps::releng_graph;
use crate::deploy::{
    ArtifactPublisher, BintrayCredentials, BintrayDeployer, DeployKind, MavenDeployer,
};
use crate::external::{CommandExecutor, Gradle, Maven};
use crate::git::create_qualifier;

/// Maven profiles that are always disabled, so builds never resolve
/// artifacts from snapshot repositories or remote update sites.
const ISOLATION_PROFILES: [&str; 2] = ["!add-metaborg-snapshot-repos", "!add-spoofax-eclipse-repos"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub clean: bool,
    pub skip_tests: bool,
    pub offline: bool,
    pub debug: bool,
    pub quiet: bool,
    /// Eclipse qualifier. Derived from the latest submodule commit when unset.
    pub qualifier: Option<String>,
    pub copy_artifacts_to: Option<PathBuf>,
    pub generate_javadoc: bool,
    pub build_stratego: bool,
    /// Implies `build_stratego`.
    pub bootstrap_stratego: bool,
    pub test_stratego: bool,
    pub maven_settings_file: Option<PathBuf>,
    pub maven_global_settings_file: Option<PathBuf>,
    pub maven_local_repo: Option<PathBuf>,
    pub maven_opts: Option<String>,
    pub maven_clean_local_repo: bool,
    pub gradle_no_native: bool,
    pub gradle_daemon: Option<bool>,
    pub deploy_kind: Option<DeployKind>,
    pub bintray_organization: Option<String>,
    pub bintray_credentials: Option<BintrayCredentials>,
    pub bintray_version: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            clean: true,
            skip_tests: false,
            offline: false,
            debug: false,
            quiet: false,
            qualifier: None,
            copy_artifacts_to: None,
            generate_javadoc: false,
            build_stratego: false,
            bootstrap_stratego: false,
            test_stratego: true,
            maven_settings_file: None,
            maven_global_settings_file: None,
            maven_local_repo: None,
            maven_opts: None,
            maven_clean_local_repo: false,
            gradle_no_native: false,
            gradle_daemon: None,
            deploy_kind: None,
            bintray_organization: None,
            bintray_credentials: None,
            bintray_version: None,
        }
    }
}

/// Runs builds for the workflows.
pub trait BuildRunner {
    fn run_build(&self, targets: &[&str], options: &BuildOptions) -> anyhow::Result<BuildResult>;
}

/// Builds the releng step catalogue for one repository.
pub struct RelengBuilder {
    repo: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    orchestrator: Orchestrator<BuildContext>,
    instance_generator: InstanceGenerator,
}

impl RelengBuilder {
    pub fn new(repo: impl Into<PathBuf>, executor: Arc<dyn CommandExecutor>) -> Result<Self, GraphError> {
        Ok(Self {
            repo: repo.into(),
            executor,
            orchestrator: Orchestrator::new(releng_graph()?),
            instance_generator: InstanceGenerator::default(),
        })
    }

    /// Disable to build only the requested steps, without their dependencies.
    pub fn with_dependency_analysis(mut self, enabled: bool) -> Self {
        self.orchestrator = self.orchestrator.with_dependency_analysis(enabled);
        self
    }

    pub fn with_instance_generator(mut self, generator: InstanceGenerator) -> Self {
        self.instance_generator = generator;
        self
    }

    /// Step identifiers in registration order.
    pub fn steps(&self) -> Vec<&str> {
        self.orchestrator.graph().step_ids().collect()
    }

    pub fn targets(&self) -> Vec<&str> {
        self.orchestrator.graph().target_names().collect()
    }

    pub fn plan(&self, targets: &[&str]) -> Result<Vec<String>, GraphError> {
        self.orchestrator.plan(targets)
    }

    fn maven(&self, options: &BuildOptions, deployer: Option<&MavenDeployer>) -> Maven {
        let mut maven = Maven::new();
        maven
            .env
            .insert("CYGWIN".to_string(), "nodosfilewarning".to_string());
        if options.clean {
            maven.pre_goals.push("clean".to_string());
        }
        maven.skip_tests = options.skip_tests;
        maven.offline = options.offline;
        maven.debug = options.debug;
        maven.quiet = options.quiet;
        if options.generate_javadoc {
            maven
                .properties
                .insert("generate-javadoc".to_string(), "true".to_string());
        }
        maven.settings_file = options.maven_settings_file.clone();
        maven.global_settings_file = options.maven_global_settings_file.clone();
        if let Some(deployer) = deployer {
            for (key, value) in deployer.local_deploy_properties() {
                maven.properties.insert(key.to_string(), value);
            }
            if !deployer.kind().snapshot {
                maven.profiles.push("release".to_string());
            }
        }
        maven
            .profiles
            .extend(ISOLATION_PROFILES.iter().map(|p| p.to_string()));
        maven.local_repo = options.maven_local_repo.clone();
        maven.opts = options.maven_opts.clone();
        maven
    }

    fn gradle(&self, options: &BuildOptions) -> Gradle {
        Gradle {
            offline: options.offline,
            debug: options.debug,
            quiet: options.quiet,
            maven_local_repo: options.maven_local_repo.clone(),
            no_native: options.gradle_no_native,
            daemon: options.gradle_daemon,
            ..Gradle::new()
        }
    }

    fn publish_artifacts(&self, result: &BuildResult, options: &BuildOptions, kind: &DeployKind) -> anyhow::Result<()> {
        let (Some(credentials), Some(version), Some(repository)) = (
            options.bintray_credentials.clone(),
            options.bintray_version.clone(),
            kind.bintray_repo.clone(),
        ) else {
            tracing::warn!("Not deploying artifacts to the binary repository: username, key, repository, or version was not set");
            return Ok(());
        };

        tracing::info!("Deploying other artifacts");
        let publisher = BintrayDeployer::new(
            Arc::clone(&self.executor),
            options.bintray_organization.clone(),
            Some(repository),
            Some(version),
            credentials,
        );
        for artifact in result.artifacts() {
            publisher
                .publish(artifact)
                .with_context(|| format!("Failed to deploy artifact '{}'", artifact.name))?;
        }
        Ok(())
    }
}

impl BuildRunner for RelengBuilder {
    fn run_build(&self, targets: &[&str], options: &BuildOptions) -> anyhow::Result<BuildResult> {
        let deployer = options
            .deploy_kind
            .clone()
            .map(|kind| MavenDeployer::new(&self.repo, kind));

        let qualifier = match &options.qualifier {
            Some(qualifier) => qualifier.clone(),
            None => create_qualifier(&self.repo, None).context("Cannot create qualifier")?,
        };
        tracing::info!(qualifier = %qualifier, "Using Eclipse qualifier");

        let maven = self.maven(options, deployer.as_ref());
        if let Some(deployer) = &deployer {
            // Always deploy locally first; the remote merge happens after a successful build.
            deployer.clean_local()?;
        }

        if options.maven_clean_local_repo {
            clean_local_repo(options.maven_local_repo.as_deref())?;
        }

        let context = BuildContext {
            basedir: self.repo.clone(),
            deploy: deployer.is_some(),
            skip_tests: options.skip_tests,
            qualifier,
            build_stratego: options.build_stratego || options.bootstrap_stratego,
            bootstrap_stratego: options.bootstrap_stratego,
            test_stratego: options.test_stratego,
            maven: maven.clone(),
            gradle: self.gradle(options),
            maven_deployer: deployer.clone(),
            instance_generator: self.instance_generator.clone(),
            executor: Arc::clone(&self.executor),
        };

        tracing::info!(targets = ?targets, "Building");
        let result = self.orchestrator.build(targets, &context)?;

        if let (Some(deployer), Some(kind)) = (&deployer, &options.deploy_kind) {
            tracing::info!("Deploying Maven artifacts");
            deployer.deploy_remote(self.executor.as_ref(), &maven)?;
            self.publish_artifacts(&result, options, kind)?;
        }

        if let Some(dir) = &options.copy_artifacts_to {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                self.repo.join(dir)
            };
            tracing::info!(dir = %dir.display(), "Copying artifacts");
            result
                .copy_to(&dir)
                .with_context(|| format!("Cannot copy artifacts to {}", dir.display()))?;
        }

        Ok(result)
    }
}

/// Remove Metaborg artifacts and the Tycho cache from a local Maven repository
/// (default `~/.m2/repository`).
pub fn clean_local_repo(local_repo: Option<&Path>) -> anyhow::Result<()> {
    let repo = match local_repo {
        Some(repo) => repo.to_path_buf(),
        None => dirs::home_dir()
            .context("Cannot determine home directory for the local Maven repository")?
            .join(".m2/repository"),
    };
    tracing::info!(repo = %repo.display(), "Cleaning artifacts from local repository");
    for relative in ["org/metaborg", ".cache/tycho"] {
        let path = repo.join(relative);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "Deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Cannot delete {}", path.display())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;
    use std::fs;

    fn options() -> BuildOptions {
        BuildOptions {
            qualifier: Some("20160504-130201-develop".to_string()),
            ..BuildOptions::default()
        }
    }

    fn builder(root: &Path, executor: Arc<RecordingExecutor>) -> RelengBuilder {
        RelengBuilder::new(root, executor)
            .unwrap()
            .with_dependency_analysis(false)
    }

    #[test]
    fn test_lists_steps_and_targets() {
        let builder = RelengBuilder::new("/repo", Arc::new(RecordingExecutor::new())).unwrap();
        assert_eq!(builder.steps().first(), Some(&"poms"));
        assert!(builder.steps().contains(&"eclipse-instances"));
        assert_eq!(builder.targets(), vec!["all"]);
    }

    #[test]
    fn test_maven_setup_isolates_and_cleans() {
        let temp = tempfile::tempdir().unwrap();
        let executor = Arc::new(RecordingExecutor::new());

        builder(temp.path(), executor.clone())
            .run_build(&["poms"], &options())
            .unwrap();

        let commands = executor.commands();
        assert_eq!(commands.len(), 1);
        let spec = &commands[0];
        assert!(spec
            .args
            .contains(&"-P!add-metaborg-snapshot-repos,!add-spoofax-eclipse-repos".to_string()));
        assert_eq!(&spec.args[spec.args.len() - 2..], ["clean", "install"]);
        assert_eq!(spec.env.get("CYGWIN").map(String::as_str), Some("nodosfilewarning"));
    }

    #[test]
    fn test_deploying_build_stages_locally_then_merges() {
        let temp = tempfile::tempdir().unwrap();
        let staging = temp.path().join(crate::deploy::LOCAL_DEPLOY_DIR);
        fs::create_dir_all(staging.join("stale")).unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let options = BuildOptions {
            deploy_kind: DeployKind::defaults().remove("release"),
            ..options()
        };

        builder(temp.path(), executor.clone())
            .run_build(&["poms"], &options)
            .unwrap();

        assert!(!staging.exists());
        let lines = executor.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("-Prelease,!add-metaborg-snapshot-repos"));
        assert!(lines[0].contains("-DaltDeploymentRepository=local::default::file:"));
        assert!(lines[0].ends_with("clean deploy"));
        assert!(lines[1].contains("-Dwagon.targetId=metaborg-nexus"));
        assert!(!lines[1].contains(" clean "));
    }

    #[test]
    fn test_failed_step_skips_deployment() {
        let temp = tempfile::tempdir().unwrap();
        let executor = Arc::new(RecordingExecutor::new().failing_on(|spec| spec.program == "mvn"));
        let options = BuildOptions {
            deploy_kind: DeployKind::defaults().remove("release"),
            ..options()
        };

        let err = builder(temp.path(), executor.clone())
            .run_build(&["poms"], &options)
            .unwrap_err();

        assert!(err.to_string().contains("poms"));
        assert_eq!(executor.commands().len(), 1);
    }

    #[test]
    fn test_copies_artifacts_relative_to_repository() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp
            .path()
            .join("spoofax/org.metaborg.spoofax.core.uber/target/org.metaborg.spoofax.core.uber-2.1.0.jar");
        fs::create_dir_all(jar.parent().unwrap()).unwrap();
        fs::write(&jar, b"jar").unwrap();
        let options = BuildOptions {
            copy_artifacts_to: Some(PathBuf::from("dist/artifacts")),
            ..options()
        };

        builder(temp.path(), Arc::new(RecordingExecutor::new()))
            .run_build(&["java-uber"], &options)
            .unwrap();

        assert_eq!(
            fs::read(temp.path().join("dist/artifacts/spoofax/core-uber.jar")).unwrap(),
            b"jar"
        );
    }

    #[test]
    fn test_clean_local_repo_removes_metaborg_artifacts() {
        let temp = tempfile::tempdir().unwrap();
        let repo = temp.path();
        fs::create_dir_all(repo.join("org/metaborg/spoofax")).unwrap();
        fs::create_dir_all(repo.join("org/apache")).unwrap();

        clean_local_repo(Some(repo)).unwrap();

        assert!(!repo.join("org/metaborg").exists());
        assert!(repo.join("org/apache").exists());
    }
}
