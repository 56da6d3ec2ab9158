//! Artifact deployment
//!
//! Maven artifacts are always deployed to a local staging repository first
//! (`<root>/.local-deploy-repository`) and merged into the remote repository
//! only after the whole build succeeded. Other artifacts that carry package
//! metadata are uploaded to a generic binary repository.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::Artifact;
use crate::external::{run_checked, CommandError, CommandExecutor, CommandSpec, Maven, Secret};

pub const LOCAL_DEPLOY_DIR: &str = ".local-deploy-repository";

const WAGON_MERGE_GOAL: &str = "org.codehaus.mojo:wagon-maven-plugin:1.0:merge-maven-repos";

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Unknown deploy kind '{name}', choose from: {available}")]
    UnknownKind { name: String, available: String },
    #[error("Cannot release snapshots, deploy kind '{name}' is a snapshot kind")]
    SnapshotRelease { name: String },
    #[error("No binary repository is set for deploy kind '{name}', choose a different deploy kind")]
    NoBinaryRepository { name: String },
    #[error("No binary repository username and/or key was set, cannot deploy")]
    MissingCredentials,
    #[error("Cannot clean local deploy repository {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Deployment command failed: {0}")]
    Command(#[from] CommandError),
}

/// A named deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployKind {
    #[serde(default)]
    pub name: String,
    /// Server id used to look up credentials in the Maven settings.
    pub identifier: String,
    pub url: String,
    pub snapshot: bool,
    #[serde(default)]
    pub bintray_repo: Option<String>,
}

impl DeployKind {
    pub fn defaults() -> BTreeMap<String, DeployKind> {
        let kinds = [
            DeployKind {
                name: "snapshot".to_string(),
                identifier: "metaborg-nexus".to_string(),
                url: "http://artifacts.metaborg.org/content/repositories/snapshots/".to_string(),
                snapshot: true,
                bintray_repo: None,
            },
            DeployKind {
                name: "release".to_string(),
                identifier: "metaborg-nexus".to_string(),
                url: "http://artifacts.metaborg.org/content/repositories/releases/".to_string(),
                snapshot: false,
                bintray_repo: Some("spoofax-release".to_string()),
            },
            DeployKind {
                name: "milestone".to_string(),
                identifier: "metaborg-nexus".to_string(),
                url: "http://artifacts.metaborg.org/content/repositories/milestones/".to_string(),
                snapshot: false,
                bintray_repo: Some("spoofax-milestone".to_string()),
            },
        ];
        kinds.into_iter().map(|k| (k.name.clone(), k)).collect()
    }

    /// Look up `name`, filling in the kind's name from its key.
    pub fn lookup(kinds: &BTreeMap<String, DeployKind>, name: &str) -> Result<DeployKind, DeployError> {
        kinds
            .get(name)
            .map(|kind| DeployKind {
                name: name.to_string(),
                ..kind.clone()
            })
            .ok_or_else(|| DeployError::UnknownKind {
                name: name.to_string(),
                available: kinds.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    /// Checks a release deployment must pass before any external effect.
    pub fn check_releasable(&self, credentials: Option<&BintrayCredentials>) -> Result<(), DeployError> {
        if self.bintray_repo.is_none() {
            return Err(DeployError::NoBinaryRepository {
                name: self.name.clone(),
            });
        }
        if self.snapshot {
            return Err(DeployError::SnapshotRelease {
                name: self.name.clone(),
            });
        }
        if credentials.is_none() {
            return Err(DeployError::MissingCredentials);
        }
        Ok(())
    }
}

/// Deploys Maven artifacts through a local staging repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenDeployer {
    root: PathBuf,
    kind: DeployKind,
}

impl MavenDeployer {
    pub fn new(root: impl Into<PathBuf>, kind: DeployKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    pub fn kind(&self) -> &DeployKind {
        &self.kind
    }

    pub fn local_deploy_path(&self) -> PathBuf {
        self.root.join(LOCAL_DEPLOY_DIR)
    }

    /// Properties that redirect `mvn deploy` to the staging repository.
    pub fn local_deploy_properties(&self) -> Vec<(&'static str, String)> {
        vec![(
            "altDeploymentRepository",
            format!("local::default::file:{}", self.local_deploy_path().display()),
        )]
    }

    /// Properties that redirect `deploy:deploy-file` to the staging repository.
    pub fn local_file_deploy_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("repositoryId", "local".to_string()),
            ("url", format!("file:{}", self.local_deploy_path().display())),
        ]
    }

    pub fn clean_local(&self) -> Result<(), DeployError> {
        let path = self.local_deploy_path();
        match std::fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DeployError::Io { path, source }),
        }
    }

    /// Merge the staging repository into the remote repository.
    pub fn deploy_remote(
        &self,
        executor: &dyn CommandExecutor,
        maven: &Maven,
    ) -> Result<(), DeployError> {
        let source = format!("file:{}", self.local_deploy_path().display());
        tracing::info!(target_repo = %self.kind.url, "Merging locally deployed Maven artifacts");
        let properties = [
            ("wagon.sourceId", "local".to_string()),
            ("wagon.source", source),
            ("wagon.targetId", self.kind.identifier.clone()),
            ("wagon.target", self.kind.url.clone()),
        ];
        maven
            .without_clean()
            .run_in_dir(executor, &self.root, WAGON_MERGE_GOAL, &properties)?;
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BintrayCredentials {
    pub username: String,
    pub key: String,
}

impl std::fmt::Debug for BintrayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BintrayCredentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl BintrayCredentials {
    /// Credentials from explicit values, falling back to the
    /// `BINTRAY_USERNAME` and `BINTRAY_KEY` environment variables.
    pub fn resolve(username: Option<String>, key: Option<String>) -> Option<Self> {
        let username = username.or_else(|| std::env::var("BINTRAY_USERNAME").ok())?;
        let key = key.or_else(|| std::env::var("BINTRAY_KEY").ok())?;
        if username.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self { username, key })
    }
}

/// Sink for the artifacts of a finished build.
pub trait ArtifactPublisher {
    fn publish(&self, artifact: &Artifact) -> Result<(), DeployError>;
}

/// Uploads artifacts to a generic Bintray repository with `curl`.
pub struct BintrayDeployer {
    executor: Arc<dyn CommandExecutor>,
    api_url: String,
    organization: Option<String>,
    repository: Option<String>,
    version: Option<String>,
    credentials: BintrayCredentials,
}

impl BintrayDeployer {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        organization: Option<String>,
        repository: Option<String>,
        version: Option<String>,
        credentials: BintrayCredentials,
    ) -> Self {
        Self {
            executor,
            api_url: "https://api.bintray.com".to_string(),
            organization,
            repository,
            version,
            credentials,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn upload_command(
        &self,
        organization: &str,
        repository: &str,
        package: &str,
        version: &str,
        location: &Path,
        target: &Path,
    ) -> CommandSpec {
        let url = format!(
            "{}/content/{}/{}/{}/{}/{}?publish=1&override=1",
            self.api_url,
            organization,
            repository,
            package,
            version,
            target.to_string_lossy().replace('\\', "/")
        );
        CommandSpec::new("curl")
            .args(["--fail", "--silent", "--show-error", "--config", "-", "-T"])
            .arg(location.to_string_lossy())
            .arg(url)
            .stdin(self.curl_config())
    }

    /// Credentials as a curl config file, read by `--config -` so the key
    /// stays off the command line.
    fn curl_config(&self) -> Secret {
        let quote = |value: &str| value.replace('\\', "\\\\").replace('"', "\\\"");
        Secret::new(format!(
            "user = \"{}:{}\"\n",
            quote(&self.credentials.username),
            quote(&self.credentials.key)
        ))
    }
}

impl ArtifactPublisher for BintrayDeployer {
    fn publish(&self, artifact: &Artifact) -> Result<(), DeployError> {
        let (Some(organization), Some(repository), Some(package), Some(version)) = (
            self.organization.as_deref(),
            self.repository.as_deref(),
            artifact.package.as_deref(),
            self.version.as_deref(),
        ) else {
            tracing::warn!(
                artifact = %artifact.name,
                "Skipping deployment: no organization, repository, package name, or version was set"
            );
            return Ok(());
        };

        tracing::info!(artifact = %artifact.name, package, version, "Uploading artifact");
        let spec = self.upload_command(
            organization,
            repository,
            package,
            version,
            &artifact.location,
            &artifact.target,
        );
        run_checked(self.executor.as_ref(), &spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::{CommandOutput, MockCommandExecutor};

    fn credentials() -> BintrayCredentials {
        BintrayCredentials {
            username: "ci".to_string(),
            key: "secret".to_string(),
        }
    }

    #[test]
    fn test_lookup_unknown_kind_lists_available() {
        let err = DeployKind::lookup(&DeployKind::defaults(), "nightly").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown deploy kind 'nightly', choose from: milestone, release, snapshot"
        );
    }

    #[test]
    fn test_release_preconditions() {
        let kinds = DeployKind::defaults();
        let snapshot = DeployKind::lookup(&kinds, "snapshot").unwrap();
        let release = DeployKind::lookup(&kinds, "release").unwrap();

        assert!(matches!(
            snapshot.check_releasable(Some(&credentials())),
            Err(DeployError::NoBinaryRepository { .. })
        ));
        assert!(matches!(
            release.check_releasable(None),
            Err(DeployError::MissingCredentials)
        ));
        assert!(release.check_releasable(Some(&credentials())).is_ok());

        let snapshot_with_repo = DeployKind {
            bintray_repo: Some("nightly".to_string()),
            ..snapshot
        };
        assert!(matches!(
            snapshot_with_repo.check_releasable(Some(&credentials())),
            Err(DeployError::SnapshotRelease { .. })
        ));
    }

    #[test]
    fn test_local_deploy_properties_point_at_staging_repository() {
        let deployer = MavenDeployer::new("/repo", DeployKind::defaults()["release"].clone());
        assert_eq!(
            deployer.local_deploy_properties(),
            vec![(
                "altDeploymentRepository",
                "local::default::file:/repo/.local-deploy-repository".to_string()
            )]
        );
    }

    #[test]
    fn test_clean_local_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let deployer = MavenDeployer::new(temp.path(), DeployKind::defaults()["release"].clone());
        std::fs::create_dir_all(deployer.local_deploy_path().join("org")).unwrap();

        deployer.clean_local().unwrap();
        assert!(!deployer.local_deploy_path().exists());
        deployer.clean_local().unwrap();
    }

    #[test]
    fn test_remote_deploy_runs_wagon_merge() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|spec| {
                spec.args.last().map(String::as_str) == Some(WAGON_MERGE_GOAL)
                    && spec.args.contains(&"-Dwagon.targetId=metaborg-nexus".to_string())
                    && !spec.args.contains(&"clean".to_string())
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::ok()));

        let mut maven = Maven::new();
        maven.pre_goals.push("clean".to_string());
        let deployer = MavenDeployer::new("/repo", DeployKind::defaults()["release"].clone());
        deployer.deploy_remote(&mock, &maven).unwrap();
    }

    #[test]
    fn test_publish_skips_artifacts_without_package() {
        let mock = MockCommandExecutor::new();
        let deployer = BintrayDeployer::new(
            Arc::new(mock),
            Some("metaborg".to_string()),
            Some("spoofax-release".to_string()),
            Some("2.0.0".to_string()),
            credentials(),
        );
        let artifact = Artifact::new("Update site", "/repo/site.zip", "spoofax-eclipse.zip");
        deployer.publish(&artifact).unwrap();
    }

    #[test]
    fn test_publish_uploads_to_package_version() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|spec| {
                spec.program == "curl"
                    && spec.args.last().map(String::as_str)
                        == Some("https://api.bintray.com/content/metaborg/spoofax-release/spoofax-sunshine/2.0.0/spoofax/sunshine.jar?publish=1&override=1")
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::ok()));

        let deployer = BintrayDeployer::new(
            Arc::new(mock),
            Some("metaborg".to_string()),
            Some("spoofax-release".to_string()),
            Some("2.0.0".to_string()),
            credentials(),
        );
        let artifact = Artifact::new("Sunshine JAR", "/repo/sunshine.jar", "spoofax/sunshine.jar")
            .with_package("spoofax-sunshine");
        deployer.publish(&artifact).unwrap();
    }

    #[test]
    fn test_upload_passes_key_on_stdin_only() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|spec| {
                spec.args.iter().all(|arg| !arg.contains("secret"))
                    && spec.args.windows(2).any(|pair| pair[0] == "--config" && pair[1] == "-")
                    && spec.stdin.as_ref().map(Secret::expose) == Some("user = \"ci:secret\"\n")
            })
            .times(1)
            .returning(|_| {
                Ok(CommandOutput {
                    status_code: 22,
                    stdout: String::new(),
                    stderr: "curl: (22) The requested URL returned error: 401\n".to_string(),
                })
            });

        let deployer = BintrayDeployer::new(
            Arc::new(mock),
            Some("metaborg".to_string()),
            Some("spoofax-release".to_string()),
            Some("2.0.0".to_string()),
            credentials(),
        );
        let artifact = Artifact::new("Sunshine JAR", "/repo/sunshine.jar", "spoofax/sunshine.jar")
            .with_package("spoofax-sunshine");
        let err = deployer.publish(&artifact).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("401"));
        assert!(!message.contains("secret"));
        assert!(!format!("{:?}", credentials()).contains("secret"));
    }

    #[test]
    fn test_curl_config_escapes_quotes() {
        let deployer = BintrayDeployer::new(
            Arc::new(MockCommandExecutor::new()),
            None,
            None,
            None,
            BintrayCredentials {
                username: "ci".to_string(),
                key: r#"a"b\c"#.to_string(),
            },
        );
        assert_eq!(deployer.curl_config().expose(), "user = \"ci:a\\\"b\\\\c\"\n");
    }
}
