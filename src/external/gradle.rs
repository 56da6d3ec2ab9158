use std::path::{Path, PathBuf};

use super::command::{run_checked, CommandError, CommandExecutor, CommandSpec};

/// Gradle driver. Uses the project's `gradlew` wrapper when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gradle {
    pub stacktrace: bool,
    pub info: bool,
    pub offline: bool,
    pub debug: bool,
    pub quiet: bool,
    pub maven_local_repo: Option<PathBuf>,
    /// Disable the native integration (`-Dorg.gradle.native=false`).
    pub no_native: bool,
    /// `Some(true)` for `--daemon`, `Some(false)` for `--no-daemon`.
    pub daemon: Option<bool>,
}

impl Gradle {
    pub fn new() -> Self {
        Self {
            stacktrace: true,
            info: true,
            ..Default::default()
        }
    }

    pub fn command(&self, cwd: &Path, task: &str) -> CommandSpec {
        let wrapper = cwd.join("gradlew");
        let program = if wrapper.is_file() {
            wrapper.to_string_lossy().to_string()
        } else {
            "gradle".to_string()
        };

        let mut spec = CommandSpec::new(program).current_dir(cwd).streaming().arg(task);
        if self.stacktrace {
            spec = spec.arg("--stacktrace");
        }
        if self.debug {
            spec = spec.arg("--debug");
        } else if self.quiet {
            spec = spec.arg("--quiet");
        } else if self.info {
            spec = spec.arg("--info");
        }
        if self.offline {
            spec = spec.arg("--offline");
        }
        if let Some(repo) = &self.maven_local_repo {
            spec = spec.arg(format!("-Dmaven.repo.local={}", repo.display()));
        }
        if self.no_native {
            spec = spec.arg("-Dorg.gradle.native=false");
        }
        match self.daemon {
            Some(true) => spec = spec.arg("--daemon"),
            Some(false) => spec = spec.arg("--no-daemon"),
            None => {}
        }
        spec
    }

    pub fn run_in_dir(
        &self,
        executor: &dyn CommandExecutor,
        cwd: &Path,
        task: &str,
    ) -> Result<(), CommandError> {
        let spec = self.command(cwd, task);
        tracing::info!(cwd = %cwd.display(), command = %spec, "Running Gradle");
        run_checked(executor, &spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falls_back_to_gradle_without_wrapper() {
        let temp = tempfile::tempdir().unwrap();
        let spec = Gradle::new().command(temp.path(), "buildPlugin");
        assert_eq!(spec.program, "gradle");
        assert_eq!(spec.args, vec!["buildPlugin", "--stacktrace", "--info"]);
    }

    #[test]
    fn test_uses_wrapper_and_flags() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("gradlew"), "#!/bin/sh\n").unwrap();

        let gradle = Gradle {
            quiet: true,
            offline: true,
            no_native: true,
            daemon: Some(false),
            ..Gradle::new()
        };
        let spec = gradle.command(temp.path(), "install");

        assert!(spec.program.ends_with("gradlew"));
        assert_eq!(
            spec.args,
            vec![
                "install",
                "--stacktrace",
                "--quiet",
                "--offline",
                "-Dorg.gradle.native=false",
                "--no-daemon"
            ]
        );
    }
}
