use anyhow::Result;

use super::{CommandContext, Exit};
use crate::build::{BuildOptions, BuildRunner, RelengBuilder};
use crate::deploy::{BintrayCredentials, DeployKind};
use crate::git::create_now_qualifier;

/// Builds one or more components of the repository.
pub struct BuildCommand {
    components: Vec<String>,
    options: BuildOptions,
    build_deps: bool,
    deploy_kind: Option<String>,
    now_qualifier: bool,
    bintray_username: Option<String>,
    bintray_key: Option<String>,
}

impl BuildCommand {
    pub fn new(components: Vec<String>, options: BuildOptions) -> Self {
        Self {
            components,
            options,
            build_deps: true,
            deploy_kind: None,
            now_qualifier: false,
            bintray_username: None,
            bintray_key: None,
        }
    }

    pub fn with_dependencies(mut self, build_deps: bool) -> Self {
        self.build_deps = build_deps;
        self
    }

    pub fn with_deploy_kind(mut self, deploy_kind: Option<String>) -> Self {
        self.deploy_kind = deploy_kind;
        self
    }

    /// Use the current time instead of the latest commit date as qualifier.
    pub fn with_now_qualifier(mut self, now_qualifier: bool) -> Self {
        self.now_qualifier = now_qualifier;
        self
    }

    pub fn with_bintray_credentials(mut self, username: Option<String>, key: Option<String>) -> Self {
        self.bintray_username = username;
        self.bintray_key = key;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn execute(&self, context: &CommandContext) -> Result<Exit> {
        let builder = RelengBuilder::new(context.repo(), context.executor.clone())?
            .with_dependency_analysis(self.build_deps)
            .with_instance_generator(context.config.packaging.clone());

        if self.components.is_empty() {
            println!("No components specified, pass one or more of the following components to build:");
            println!("  Targets: {}", builder.targets().join(", "));
            println!("  Steps:   {}", builder.steps().join(", "));
            return Ok(Exit::Failure);
        }

        let options = match self.resolve_options(context) {
            Ok(options) => options,
            Err(e) => {
                println!("❌ {e:#}");
                return Ok(Exit::Failure);
            }
        };

        let targets: Vec<&str> = self.components.iter().map(String::as_str).collect();
        println!("🔨 Building {}", targets.join(", "));
        match builder.run_build(&targets, &options) {
            Ok(result) => {
                println!("✅ Build succeeded: {}", result.executed_steps().join(", "));
                if let Some(dir) = &options.copy_artifacts_to {
                    println!("📦 Artifacts copied to {}", dir.display());
                }
                Ok(Exit::Success)
            }
            Err(e) => {
                println!("❌ {e:#}");
                Ok(Exit::Failure)
            }
        }
    }

    fn resolve_options(&self, context: &CommandContext) -> Result<BuildOptions> {
        let mut options = self.options.clone();
        if let Some(name) = &self.deploy_kind {
            options.deploy_kind = Some(DeployKind::lookup(&context.config.deploy.kinds, name)?);
        }
        if options.qualifier.is_none() && self.now_qualifier {
            options.qualifier = Some(create_now_qualifier(context.repo(), None)?);
        }
        if self.bintray_username.is_some() || self.bintray_key.is_some() {
            let username = self.bintray_username.clone().or(context.config.bintray.username.clone());
            let key = self.bintray_key.clone().or(context.config.bintray.key.clone());
            options.bintray_credentials = BintrayCredentials::resolve(username, key);
        }
        Ok(options)
    }
}

/// Maven JVM options from stack and heap sizes.
pub fn maven_opts(stack: &str, min_heap: &str, max_heap: &str) -> String {
    format!("-Xss{stack} -Xms{min_heap} -Xmx{max_heap}")
}
