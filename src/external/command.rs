//! Base command execution abstraction
//!
//! Provides the foundational trait for executing external commands (git, mvn,
//! gradle, upload tools), enabling dependency injection for testing.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    pub fn ok() -> Self {
        Self {
            status_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command `{command}` failed with exit code {status_code}: {stderr}")]
    ExecutionFailed {
        command: String,
        status_code: i32,
        stderr: String,
    },
    #[error("Command not found: {command}")]
    CommandNotFound { command: String },
    #[error("IO error while running `{command}`: {message}")]
    Io { command: String, message: String },
}

/// Text that must never show up in logs or error messages.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// A fully described invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Stream stdout/stderr to the terminal instead of capturing them.
    pub inherit_output: bool,
    /// Written to the child's stdin, then closed.
    pub stdin: Option<Secret>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn streaming(mut self) -> Self {
        self.inherit_output = true;
        self
    }

    pub fn stdin(mut self, input: Secret) -> Self {
        self.stdin = Some(input);
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Trait for executing external commands
///
/// This abstraction allows the rest of the codebase to execute commands
/// without directly depending on std::process::Command, enabling testing
/// with mock implementations.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Run the command and report its exit status. A non-zero exit is not an
    /// error at this level; see [`run_checked`].
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Run a command and turn a non-zero exit code into [`CommandError::ExecutionFailed`].
pub fn run_checked(
    executor: &dyn CommandExecutor,
    spec: &CommandSpec,
) -> Result<CommandOutput, CommandError> {
    let output = executor.execute(spec)?;
    if !output.success() {
        return Err(CommandError::ExecutionFailed {
            command: spec.to_string(),
            status_code: output.status_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Real implementation using std::process::Command
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command = %spec, cwd = ?spec.cwd, "Running external command");

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let map_err = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CommandError::CommandNotFound {
                    command: spec.program.clone(),
                }
            } else {
                CommandError::Io {
                    command: spec.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let stdout = if spec.inherit_output { Stdio::inherit() } else { Stdio::piped() };
        let stderr = if spec.inherit_output { Stdio::inherit() } else { Stdio::piped() };
        let stdin = match (&spec.stdin, spec.inherit_output) {
            (Some(_), _) => Stdio::piped(),
            (None, true) => Stdio::inherit(),
            (None, false) => Stdio::null(),
        };

        let mut child = command
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(map_err)?;
        if let (Some(input), Some(mut pipe)) = (&spec.stdin, child.stdin.take()) {
            pipe.write_all(input.expose().as_bytes()).map_err(map_err)?;
        }

        let output = child.wait_with_output().map_err(map_err)?;
        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_command_executor_success() {
        let executor = ProcessCommandExecutor;
        let result = executor.execute(&CommandSpec::new("echo").arg("hello"));

        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[test]
    fn test_process_command_executor_command_not_found() {
        let executor = ProcessCommandExecutor;
        let result = executor.execute(&CommandSpec::new("nonexistent_command_xyz"));

        assert!(matches!(
            result.unwrap_err(),
            CommandError::CommandNotFound { .. }
        ));
    }

    #[test]
    fn test_process_command_executor_respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessCommandExecutor;
        let output = executor
            .execute(&CommandSpec::new("pwd").current_dir(dir.path()))
            .unwrap();

        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_run_checked_reports_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(|_| {
            Ok(CommandOutput {
                status_code: 2,
                stdout: String::new(),
                stderr: "boom\n".to_string(),
            })
        });

        let err = run_checked(&mock, &CommandSpec::new("mvn").arg("install")).unwrap_err();
        assert_eq!(
            err,
            CommandError::ExecutionFailed {
                command: "mvn install".to_string(),
                status_code: 2,
                stderr: "boom".to_string(),
            }
        );
    }

    #[test]
    fn test_process_command_executor_feeds_stdin() {
        let executor = ProcessCommandExecutor;
        let output = executor
            .execute(&CommandSpec::new("cat").stdin(Secret::new("user = \"ci:secret\"\n")))
            .unwrap();

        assert_eq!(output.stdout, "user = \"ci:secret\"\n");
    }

    #[test]
    fn test_stdin_is_redacted_from_debug_and_display() {
        let spec = CommandSpec::new("curl")
            .args(["--config", "-"])
            .stdin(Secret::new("user = \"ci:secret\""));

        assert_eq!(spec.to_string(), "curl --config -");
        assert!(!format!("{spec:?}").contains("secret"));
    }

    #[test]
    fn test_spec_display_joins_arguments() {
        let spec = CommandSpec::new("git").args(["push", "--tags"]);
        assert_eq!(spec.to_string(), "git push --tags");
    }
}
