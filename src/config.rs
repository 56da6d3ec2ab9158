use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::build::{BuildOptions, InstanceGenerator};
use crate::deploy::{BintrayCredentials, DeployKind};
use crate::state::WorkflowKind;

/// Main configuration structure for releng
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelengConfig {
    pub git: GitConfig,
    /// Where workflow state is persisted
    pub state: StateConfig,
    pub maven: MavenConfig,
    pub gradle: GradleConfig,
    pub deploy: DeployConfig,
    pub bintray: BintrayConfig,
    /// Eclipse instance generation
    pub packaging: InstanceGenerator,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GitConfig {
    /// Remote that is pulled from and pushed to
    pub remote: String,
    /// Root repository paths a release merge never overwrites
    pub preserve_paths: Vec<String>,
    /// Commit identity used when the repositories have none configured
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StateConfig {
    /// Directory holding the state files, the home directory when unset
    pub directory: Option<PathBuf>,
    pub release_file: String,
    pub bootstrap_file: String,
    /// Take an exclusive lock on the state file while a workflow runs
    pub lock: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MavenConfig {
    pub settings_file: Option<PathBuf>,
    pub global_settings_file: Option<PathBuf>,
    pub local_repo: Option<PathBuf>,
    /// Value for `MAVEN_OPTS`
    pub opts: Option<String>,
    pub offline: bool,
    pub debug: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GradleConfig {
    pub no_native: bool,
    pub daemon: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeployConfig {
    pub kinds: BTreeMap<String, DeployKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BintrayConfig {
    pub organization: Option<String>,
    /// Falls back to `BINTRAY_USERNAME`
    pub username: Option<String>,
    /// Falls back to `BINTRAY_KEY`
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
}

impl Default for RelengConfig {
    fn default() -> Self {
        Self {
            git: GitConfig {
                remote: "origin".to_string(),
                preserve_paths: vec![".gitmodules".to_string()],
                user_name: None,
                user_email: None,
            },
            state: StateConfig {
                directory: None,
                release_file: ".releng-release-state".to_string(),
                bootstrap_file: ".releng-bootstrap-state".to_string(),
                lock: true,
            },
            maven: MavenConfig {
                opts: Some("-Xss16M -Xms2G -Xmx2G".to_string()),
                ..MavenConfig::default()
            },
            gradle: GradleConfig::default(),
            deploy: DeployConfig {
                kinds: DeployKind::defaults(),
            },
            bintray: BintrayConfig {
                organization: Some("metaborg".to_string()),
                ..BintrayConfig::default()
            },
            packaging: InstanceGenerator::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "pretty".to_string(),
            },
        }
    }
}

impl RelengConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `releng.toml` in the working directory
    /// 3. `~/.config/releng/releng.toml`
    /// 4. Environment variables (`RELENG_MAVEN__LOCAL_REPO=...`)
    pub fn load() -> Result<Self> {
        let mut files = vec![PathBuf::from("releng.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            files.push(config_dir.join("releng").join("releng.toml"));
        }
        Self::load_from(&files)
    }

    /// Load defaults overridden by whichever of `files` exist, in order, and
    /// then by the environment.
    pub fn load_from(files: &[PathBuf]) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&RelengConfig::default()).context("Cannot serialize default configuration")?,
        );

        for file in files.iter().filter(|f| f.is_file()) {
            tracing::debug!(file = %file.display(), "Loading configuration file");
            builder = builder.add_source(File::from(file.as_path()));
        }

        builder = builder.add_source(
            Environment::with_prefix("RELENG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        let mut releng_config: RelengConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;

        // Kinds declared in a file only carry their name as the table key.
        for (name, kind) in releng_config.deploy.kinds.iter_mut() {
            if kind.name.is_empty() {
                kind.name = name.clone();
            }
        }

        Ok(releng_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Persisted state file of a workflow kind.
    pub fn state_path(&self, kind: WorkflowKind) -> Result<PathBuf> {
        let directory = match &self.state.directory {
            Some(directory) => directory.clone(),
            None => dirs::home_dir().context("Cannot determine the home directory for workflow state")?,
        };
        let file = match kind {
            WorkflowKind::Release => &self.state.release_file,
            WorkflowKind::Bootstrap => &self.state.bootstrap_file,
        };
        Ok(directory.join(file))
    }

    pub fn bintray_credentials(&self) -> Option<BintrayCredentials> {
        BintrayCredentials::resolve(self.bintray.username.clone(), self.bintray.key.clone())
    }

    /// Build options seeded from the Maven, Gradle and Bintray sections.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            offline: self.maven.offline,
            debug: self.maven.debug,
            quiet: self.maven.quiet,
            maven_settings_file: self.maven.settings_file.clone(),
            maven_global_settings_file: self.maven.global_settings_file.clone(),
            maven_local_repo: self.maven.local_repo.clone(),
            maven_opts: self.maven.opts.clone(),
            gradle_no_native: self.gradle.no_native,
            gradle_daemon: self.gradle.daemon,
            bintray_organization: self.bintray.organization.clone(),
            bintray_credentials: self.bintray_credentials(),
            ..BuildOptions::default()
        }
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<RelengConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = RelengConfig::load_env_file();
        RelengConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static RelengConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {:#}", e))
}
