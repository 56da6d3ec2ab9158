//! Maven driver
//!
//! [`Maven`] is an immutable description of how to invoke `mvn`. Build steps
//! derive variants of it (`without_clean`, `with_profile_removed`) instead of
//! mutating a shared instance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::command::{run_checked, CommandError, CommandExecutor, CommandSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maven {
    pub program: String,
    /// Goals run before the requested goal, e.g. `clean`.
    pub pre_goals: Vec<String>,
    pub profiles: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub skip_tests: bool,
    pub offline: bool,
    pub debug: bool,
    pub quiet: bool,
    pub batch: bool,
    pub errors: bool,
    pub settings_file: Option<PathBuf>,
    pub global_settings_file: Option<PathBuf>,
    pub local_repo: Option<PathBuf>,
    /// Value for `MAVEN_OPTS`.
    pub opts: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for Maven {
    fn default() -> Self {
        Self {
            program: "mvn".to_string(),
            pre_goals: Vec::new(),
            profiles: Vec::new(),
            properties: BTreeMap::new(),
            skip_tests: false,
            offline: false,
            debug: false,
            quiet: false,
            batch: true,
            errors: true,
            settings_file: None,
            global_settings_file: None,
            local_repo: None,
            opts: None,
            env: BTreeMap::new(),
        }
    }
}

impl Maven {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleans(&self) -> bool {
        self.pre_goals.iter().any(|g| g == "clean")
    }

    pub fn without_clean(&self) -> Self {
        let mut maven = self.clone();
        maven.pre_goals.retain(|g| g != "clean");
        maven
    }

    pub fn with_clean_first(&self) -> Self {
        if self.cleans() {
            return self.clone();
        }
        let mut maven = self.clone();
        maven.pre_goals.insert(0, "clean".to_string());
        maven
    }

    pub fn with_profile_removed(&self, profile: &str) -> Self {
        let mut maven = self.clone();
        maven.profiles.retain(|p| p != profile);
        maven
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Command line for running `goal` on `pom_file` (default `pom.xml`) in `cwd`.
    pub fn command(
        &self,
        cwd: &Path,
        pom_file: Option<&str>,
        goal: &str,
        properties: &[(&str, String)],
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program).current_dir(cwd).streaming();

        if let Some(pom_file) = pom_file {
            spec = spec.args(["-f", pom_file]);
        }
        if let Some(settings) = &self.settings_file {
            spec = spec.arg("--settings").arg(settings.to_string_lossy());
        }
        if let Some(settings) = &self.global_settings_file {
            spec = spec.arg("--global-settings").arg(settings.to_string_lossy());
        }
        if self.batch {
            spec = spec.arg("-B");
        }
        if self.errors {
            spec = spec.arg("-e");
        }
        if self.offline {
            spec = spec.arg("-o");
        }
        if self.debug {
            spec = spec.arg("-X");
        } else if self.quiet {
            spec = spec.arg("-q");
        }
        if let Some(repo) = &self.local_repo {
            spec = spec.arg(format!("-Dmaven.repo.local={}", repo.display()));
        }
        if !self.profiles.is_empty() {
            spec = spec.arg(format!("-P{}", self.profiles.join(",")));
        }
        if self.skip_tests {
            spec = spec.arg("-DskipTests=true");
        }

        let mut merged = self.properties.clone();
        for (key, value) in properties {
            merged.insert((*key).to_string(), value.clone());
        }
        for (key, value) in &merged {
            spec = spec.arg(format!("-D{key}={value}"));
        }

        spec = spec.args(self.pre_goals.iter().cloned()).arg(goal);

        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        if let Some(opts) = &self.opts {
            spec = spec.env("MAVEN_OPTS", opts);
        }
        spec
    }

    pub fn run_in_dir(
        &self,
        executor: &dyn CommandExecutor,
        cwd: &Path,
        goal: &str,
        properties: &[(&str, String)],
    ) -> Result<(), CommandError> {
        self.run(executor, cwd, None, goal, properties)
    }

    pub fn run(
        &self,
        executor: &dyn CommandExecutor,
        cwd: &Path,
        pom_file: Option<&str>,
        goal: &str,
        properties: &[(&str, String)],
    ) -> Result<(), CommandError> {
        let spec = self.command(cwd, pom_file, goal, properties);
        tracing::info!(cwd = %cwd.display(), command = %spec, "Running Maven");
        run_checked(executor, &spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_layout() {
        let mut maven = Maven::new();
        maven.pre_goals.push("clean".to_string());
        maven.profiles = vec!["release".to_string(), "!add-metaborg-snapshot-repos".to_string()];
        maven.local_repo = Some(PathBuf::from("/m2"));
        maven.opts = Some("-Xmx2G".to_string());

        let spec = maven.command(
            Path::new("/repo/releng/build/java"),
            None,
            "deploy",
            &[("forceContextQualifier", "20160307-140509-master".to_string())],
        );

        assert_eq!(
            spec.args,
            vec![
                "-B",
                "-e",
                "-Dmaven.repo.local=/m2",
                "-Prelease,!add-metaborg-snapshot-repos",
                "-DforceContextQualifier=20160307-140509-master",
                "clean",
                "deploy",
            ]
        );
        assert_eq!(spec.env.get("MAVEN_OPTS").map(String::as_str), Some("-Xmx2G"));
        assert!(spec.inherit_output);
    }

    #[test]
    fn test_pom_file_and_debug_flag() {
        let mut maven = Maven::new();
        maven.debug = true;
        maven.quiet = true;

        let spec = maven.command(Path::new("/repo"), Some("build-pom.xml"), "install", &[]);
        assert_eq!(spec.args, vec!["-f", "build-pom.xml", "-B", "-e", "-X", "install"]);
    }

    #[test]
    fn test_derived_variants_leave_original_untouched() {
        let mut maven = Maven::new();
        maven.pre_goals.push("clean".to_string());
        maven.profiles.push("!add-metaborg-snapshot-repos".to_string());

        assert!(!maven.without_clean().cleans());
        assert!(maven
            .with_profile_removed("!add-metaborg-snapshot-repos")
            .profiles
            .is_empty());
        assert!(maven.cleans());
        assert_eq!(maven.profiles.len(), 1);
        assert_eq!(maven.without_clean().with_clean_first().pre_goals, vec!["clean"]);
    }

    #[test]
    fn test_call_properties_override_defaults() {
        let maven = Maven::new().with_property("generate-javadoc", "true");
        let spec = maven.command(
            Path::new("/repo"),
            None,
            "install",
            &[("generate-javadoc", "false".to_string())],
        );
        assert!(spec.args.contains(&"-Dgenerate-javadoc=false".to_string()));
        assert!(!spec.args.contains(&"-Dgenerate-javadoc=true".to_string()));
    }
}
