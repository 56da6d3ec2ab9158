//! Git command abstractions
//!
//! Provides the [`VersionControl`] trait used by the release and bootstrap
//! workflows, and [`GitClient`], its implementation over the `git` CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::command::{CommandExecutor, CommandOutput, CommandSpec};
use crate::git::{GitError, RepositoryInspector, SubmoduleEntry};

/// Merge strategy selection for [`VersionControl::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// Plain `git merge`.
    Default,
    /// `--strategy=ours`: record the merge, keep the current tree.
    Ours,
    /// `--strategy=recursive --strategy-option=theirs`.
    RecursiveTheirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetMode {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommitOptions {
    /// `--amend -C HEAD`: rewrite HEAD, reusing its message.
    pub amend: bool,
    pub allow_empty: bool,
}

impl CommitOptions {
    pub fn amend() -> Self {
        Self {
            amend: true,
            allow_empty: false,
        }
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

/// Version control operations needed by the workflows.
///
/// Every operation names the working tree it applies to, which is either the
/// root repository or one of its submodules.
pub trait VersionControl {
    /// Name of the remote that is pulled from and pushed to.
    fn remote_name(&self) -> &str;

    fn submodules(&self, repo: &Path) -> Result<Vec<SubmoduleEntry>, GitError>;

    fn current_branch(&self, repo: &Path) -> Result<Option<String>, GitError>;

    fn is_dirty(&self, repo: &Path) -> Result<bool, GitError>;

    fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    fn checkout_detached(&self, repo: &Path, rev: &str) -> Result<(), GitError>;

    /// Restore `paths` in the index and working tree from `rev`.
    fn restore_paths(&self, repo: &Path, rev: &str, paths: &[String]) -> Result<(), GitError>;

    fn pull(&self, repo: &Path) -> Result<(), GitError>;

    /// Initialize and update one submodule of `repo` from its remote branch.
    fn update_submodule(&self, repo: &Path, submodule: &SubmoduleEntry) -> Result<(), GitError>;

    fn merge(&self, repo: &Path, branch: &str, strategy: MergeStrategy) -> Result<(), GitError>;

    fn reset(&self, repo: &Path, rev: &str, mode: ResetMode) -> Result<(), GitError>;

    fn add_all(&self, repo: &Path) -> Result<(), GitError>;

    fn commit(&self, repo: &Path, message: &str, options: CommitOptions) -> Result<(), GitError>;

    /// Create an annotated tag at HEAD.
    fn tag(&self, repo: &Path, name: &str, message: &str) -> Result<(), GitError>;

    /// Push the current branch, or all tags when `tags` is set.
    fn push(&self, repo: &Path, tags: bool) -> Result<(), GitError>;

    /// Remove untracked and ignored files, keeping Eclipse project metadata.
    fn clean(&self, repo: &Path) -> Result<(), GitError>;
}

/// Generated by Eclipse and needed to reopen the workspace after a clean.
const CLEAN_KEEPS: [&str; 4] = [".project", ".classpath", ".settings", "META-INF"];

/// Real Git implementation
pub struct GitClient {
    executor: Arc<dyn CommandExecutor>,
    inspector: RepositoryInspector,
    remote: String,
    identity: Option<(String, String)>,
}

impl GitClient {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            inspector: RepositoryInspector,
            remote: "origin".to_string(),
            identity: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Commit identity used when the repository configuration has none.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    fn execute_git_command(&self, repo: &Path, args: &[&str]) -> Result<String, GitError> {
        let mut spec = CommandSpec::new("git").current_dir(repo);
        if let Some((name, email)) = &self.identity {
            spec = spec
                .arg("-c")
                .arg(format!("user.name={name}"))
                .arg("-c")
                .arg(format!("user.email={email}"));
        }
        let spec = spec.args(args.iter().copied());
        tracing::debug!(repo = %repo.display(), command = %spec, "git");
        let output = self.executor.execute(&spec)?;

        if !output.success() {
            return Err(self.classify_git_error(repo, &output, args));
        }

        Ok(output.stdout.trim().to_string())
    }

    fn classify_git_error(&self, repo: &Path, output: &CommandOutput, args: &[&str]) -> GitError {
        let stderr = output.stderr.as_str();
        if stderr.contains("not a git repository") {
            GitError::RepositoryNotFound {
                path: repo.to_path_buf(),
            }
        } else if args.first() == Some(&"checkout")
            && (stderr.contains("did not match any") || stderr.contains("invalid reference"))
        {
            GitError::BranchNotFound {
                branch: args.last().unwrap_or(&"unknown").to_string(),
            }
        } else if [stderr, output.stdout.as_str()]
            .iter()
            .any(|text| text.contains("CONFLICT") || text.contains("merge conflict"))
        {
            GitError::MergeConflict {
                repo: repo.to_path_buf(),
            }
        } else {
            GitError::CommandFailed {
                message: format!(
                    "git {} in {}: {}",
                    args.join(" "),
                    repo.display(),
                    stderr.trim()
                ),
            }
        }
    }
}

impl VersionControl for GitClient {
    fn remote_name(&self) -> &str {
        &self.remote
    }

    fn submodules(&self, repo: &Path) -> Result<Vec<SubmoduleEntry>, GitError> {
        self.inspector.submodules(repo)
    }

    fn current_branch(&self, repo: &Path) -> Result<Option<String>, GitError> {
        self.inspector.current_branch(repo)
    }

    fn is_dirty(&self, repo: &Path) -> Result<bool, GitError> {
        self.inspector.is_dirty(repo)
    }

    fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.execute_git_command(repo, &["checkout", branch])?;
        Ok(())
    }

    fn checkout_detached(&self, repo: &Path, rev: &str) -> Result<(), GitError> {
        self.execute_git_command(repo, &["checkout", "--detach", rev])?;
        Ok(())
    }

    fn restore_paths(&self, repo: &Path, rev: &str, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["checkout", rev, "--"];
        args.extend(paths.iter().map(String::as_str));
        self.execute_git_command(repo, &args)?;
        Ok(())
    }

    fn pull(&self, repo: &Path) -> Result<(), GitError> {
        self.execute_git_command(repo, &["pull", &self.remote])?;
        Ok(())
    }

    fn update_submodule(&self, repo: &Path, submodule: &SubmoduleEntry) -> Result<(), GitError> {
        let mut args = vec!["submodule", "update", "--init", "--recursive", "--remote"];
        if !submodule.initialized {
            tracing::info!(submodule = %submodule.name, "Initializing submodule");
        } else {
            match self.inspector.current_branch(&submodule.path)? {
                Some(branch) => {
                    tracing::info!(
                        submodule = %submodule.name,
                        "Updating from {}/{}", self.remote, branch
                    );
                    args.push("--rebase");
                }
                None => tracing::info!(submodule = %submodule.name, "Updating detached submodule"),
            }
        }
        args.push("--");
        args.push(&submodule.name);
        self.execute_git_command(repo, &args)?;
        Ok(())
    }

    fn merge(&self, repo: &Path, branch: &str, strategy: MergeStrategy) -> Result<(), GitError> {
        let mut args = vec!["merge"];
        match strategy {
            MergeStrategy::Default => {}
            MergeStrategy::Ours => args.push("--strategy=ours"),
            MergeStrategy::RecursiveTheirs => {
                args.push("--strategy=recursive");
                args.push("--strategy-option=theirs");
            }
        }
        args.push(branch);
        self.execute_git_command(repo, &args)?;
        Ok(())
    }

    fn reset(&self, repo: &Path, rev: &str, mode: ResetMode) -> Result<(), GitError> {
        let flag = match mode {
            ResetMode::Soft => "--soft",
            ResetMode::Hard => "--hard",
        };
        self.execute_git_command(repo, &["reset", flag, rev])?;
        Ok(())
    }

    fn add_all(&self, repo: &Path) -> Result<(), GitError> {
        self.execute_git_command(repo, &["add", "--all"])?;
        Ok(())
    }

    fn commit(&self, repo: &Path, message: &str, options: CommitOptions) -> Result<(), GitError> {
        let mut args = vec!["commit"];
        if options.amend {
            args.extend(["--amend", "-C", "HEAD"]);
        } else {
            args.extend(["-m", message]);
        }
        if options.allow_empty {
            args.push("--allow-empty");
        }
        self.execute_git_command(repo, &args)?;
        Ok(())
    }

    fn tag(&self, repo: &Path, name: &str, message: &str) -> Result<(), GitError> {
        self.execute_git_command(repo, &["tag", "-a", name, "-m", message])?;
        Ok(())
    }

    fn push(&self, repo: &Path, tags: bool) -> Result<(), GitError> {
        if tags {
            self.execute_git_command(repo, &["push", &self.remote, "--tags"])?;
        } else {
            self.execute_git_command(repo, &["push", &self.remote])?;
        }
        Ok(())
    }

    fn clean(&self, repo: &Path) -> Result<(), GitError> {
        let mut args = vec!["clean", "-dfx"];
        for kept in CLEAN_KEEPS {
            args.extend(["-e", kept]);
        }
        self.execute_git_command(repo, &args)?;
        Ok(())
    }
}

/// Remote-tracking reference for `branch`, e.g. `origin/develop`.
pub fn tracking_ref(vcs: &dyn VersionControl, branch: &str) -> String {
    format!("{}/{}", vcs.remote_name(), branch)
}

/// Working tree paths of every submodule, relative to `root`.
pub fn submodule_paths(root: &Path, submodules: &[SubmoduleEntry]) -> Vec<String> {
    submodules
        .iter()
        .map(|s| {
            s.path
                .strip_prefix(root)
                .map(PathBuf::from)
                .unwrap_or_else(|_| s.path.clone())
                .to_string_lossy()
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::{CommandOutput, MockCommandExecutor};
    use mockall::predicate::function;

    fn ok_output() -> Result<crate::external::CommandOutput, crate::external::CommandError> {
        Ok(CommandOutput::ok())
    }

    fn expect_git(mock: &mut MockCommandExecutor, expected: &'static [&'static str]) {
        mock.expect_execute()
            .with(function(move |spec: &CommandSpec| {
                spec.program == "git" && spec.args == expected
            }))
            .times(1)
            .returning(|_| ok_output());
    }

    #[test]
    fn test_merge_with_ours_strategy() {
        let mut mock = MockCommandExecutor::new();
        expect_git(&mut mock, &["merge", "--strategy=ours", "develop"]);

        let client = GitClient::new(Arc::new(mock));
        client
            .merge(Path::new("/repo"), "develop", MergeStrategy::Ours)
            .unwrap();
    }

    #[test]
    fn test_amend_commit_reuses_head_message() {
        let mut mock = MockCommandExecutor::new();
        expect_git(&mut mock, &["commit", "--amend", "-C", "HEAD", "--allow-empty"]);

        let client = GitClient::new(Arc::new(mock));
        client
            .commit(
                Path::new("/repo"),
                "ignored",
                CommitOptions::amend().allow_empty(),
            )
            .unwrap();
    }

    #[test]
    fn test_push_tags_uses_configured_remote() {
        let mut mock = MockCommandExecutor::new();
        expect_git(&mut mock, &["push", "upstream", "--tags"]);

        let client = GitClient::new(Arc::new(mock)).with_remote("upstream");
        client.push(Path::new("/repo"), true).unwrap();
    }

    #[test]
    fn test_identity_is_passed_as_config_overrides() {
        let mut mock = MockCommandExecutor::new();
        expect_git(
            &mut mock,
            &[
                "-c",
                "user.name=Release Bot",
                "-c",
                "user.email=releng@example.org",
                "tag",
                "-a",
                "master/2.0.0",
                "-m",
                "Tag for 2.0.0 release",
            ],
        );

        let client = GitClient::new(Arc::new(mock)).with_identity("Release Bot", "releng@example.org");
        client
            .tag(Path::new("/repo"), "master/2.0.0", "Tag for 2.0.0 release")
            .unwrap();
    }

    #[test]
    fn test_restore_paths_without_paths_is_noop() {
        let mock = MockCommandExecutor::new();
        let client = GitClient::new(Arc::new(mock));
        client.restore_paths(Path::new("/repo"), "HEAD", &[]).unwrap();
    }

    #[test]
    fn test_commands_run_in_repository_directory() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .with(function(|spec: &CommandSpec| {
                spec.cwd.as_deref() == Some(Path::new("/repo/sub"))
            }))
            .times(1)
            .returning(|_| ok_output());

        let client = GitClient::new(Arc::new(mock));
        client.clean(Path::new("/repo/sub")).unwrap();
    }

    #[test]
    fn test_merge_conflict_is_classified() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(|_| {
            Ok(CommandOutput {
                status_code: 1,
                stdout: String::new(),
                stderr: "CONFLICT (content): Merge conflict in pom.xml".to_string(),
            })
        });

        let client = GitClient::new(Arc::new(mock));
        let err = client
            .merge(Path::new("/repo"), "develop", MergeStrategy::Default)
            .unwrap_err();
        assert!(matches!(err, GitError::MergeConflict { .. }));
    }

    #[test]
    fn test_unknown_branch_is_classified() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(|_| {
            Ok(CommandOutput {
                status_code: 1,
                stdout: String::new(),
                stderr: "error: pathspec 'nope' did not match any file(s) known to git".to_string(),
            })
        });

        let client = GitClient::new(Arc::new(mock));
        let err = client.checkout(Path::new("/repo"), "nope").unwrap_err();
        assert!(matches!(err, GitError::BranchNotFound { branch } if branch == "nope"));
    }

    #[test]
    fn test_submodule_paths_are_relative_to_root() {
        let root = Path::new("/repo");
        let entries = vec![
            SubmoduleEntry::new("strategoxt", "/repo/strategoxt"),
            SubmoduleEntry::new("nested", "/repo/lang/nested"),
        ];
        assert_eq!(
            submodule_paths(root, &entries),
            vec!["strategoxt".to_string(), "lang/nested".to_string()]
        );
    }

    #[test]
    fn test_clean_keeps_eclipse_metadata() {
        let mut mock = MockCommandExecutor::new();
        expect_git(
            &mut mock,
            &[
                "clean", "-dfx", "-e", ".project", "-e", ".classpath", "-e", ".settings", "-e",
                "META-INF",
            ],
        );

        let client = GitClient::new(Arc::new(mock));
        client.clean(Path::new("/repo")).unwrap();
    }
}
