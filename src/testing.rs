//! Recording test doubles for the collaborator seams.
//!
//! Each double keeps a journal of the calls it received so tests can assert
//! on the exact sequence of external effects.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;

use crate::build::{BuildOptions, BuildResult, BuildRunner};
use crate::external::{
    CommandError, CommandExecutor, CommandOutput, CommandSpec, CommitOptions, MergeStrategy,
    ResetMode, VersionControl,
};
use crate::git::{GitError, SubmoduleEntry};
use crate::versions::{RewriteOptions, RewriteReport, VersionError, VersionRewriter};
use crate::workflows::Confirm;

/// A mutating version control call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Checkout(PathBuf, String),
    CheckoutDetached(PathBuf, String),
    RestorePaths(PathBuf, String, Vec<String>),
    Pull(PathBuf),
    UpdateSubmodule(PathBuf, String),
    Merge(PathBuf, String, MergeStrategy),
    Reset(PathBuf, String, ResetMode),
    AddAll(PathBuf),
    Commit(PathBuf, String),
    AmendCommit(PathBuf),
    Tag(PathBuf, String),
    Push(PathBuf, bool),
    Clean(PathBuf),
}

type CallPredicate = Rc<dyn Fn(&GitCall) -> bool>;

/// In-memory repository tree: one root with a fixed list of submodules.
/// Queries are answered from the fixture; mutations are recorded.
#[derive(Clone)]
pub struct MockVersionControl {
    root: PathBuf,
    submodules: Vec<SubmoduleEntry>,
    dirty: BTreeSet<PathBuf>,
    conflicting: BTreeSet<PathBuf>,
    fail_on: Option<CallPredicate>,
    calls: RefCell<Vec<GitCall>>,
}

impl MockVersionControl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            submodules: Vec::new(),
            dirty: BTreeSet::new(),
            conflicting: BTreeSet::new(),
            fail_on: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_submodule(mut self, submodule: SubmoduleEntry) -> Self {
        self.submodules.push(submodule);
        self
    }

    pub fn with_dirty(mut self, repo: impl Into<PathBuf>) -> Self {
        self.dirty.insert(repo.into());
        self
    }

    /// Merges in `repo` report a conflict.
    pub fn conflicting_in(mut self, repo: impl Into<PathBuf>) -> Self {
        self.conflicting.insert(repo.into());
        self
    }

    /// Calls matching `predicate` are recorded and then fail.
    pub fn failing_on(mut self, predicate: impl Fn(&GitCall) -> bool + 'static) -> Self {
        self.fail_on = Some(Rc::new(predicate));
        self
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: GitCall) -> Result<(), GitError> {
        let fails = self.fail_on.as_ref().is_some_and(|predicate| predicate(&call));
        let conflict = match &call {
            GitCall::Merge(repo, _, _) if self.conflicting.contains(repo) => Some(repo.clone()),
            _ => None,
        };
        let message = format!("{call:?} failed");
        self.calls.borrow_mut().push(call);
        if let Some(repo) = conflict {
            return Err(GitError::MergeConflict { repo });
        }
        if fails {
            return Err(GitError::CommandFailed { message });
        }
        Ok(())
    }
}

impl VersionControl for MockVersionControl {
    fn remote_name(&self) -> &str {
        "origin"
    }

    fn submodules(&self, repo: &Path) -> Result<Vec<SubmoduleEntry>, GitError> {
        if repo == self.root {
            Ok(self.submodules.clone())
        } else {
            Ok(Vec::new())
        }
    }

    fn current_branch(&self, _repo: &Path) -> Result<Option<String>, GitError> {
        Ok(None)
    }

    fn is_dirty(&self, repo: &Path) -> Result<bool, GitError> {
        Ok(self.dirty.contains(repo))
    }

    fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(GitCall::Checkout(repo.to_path_buf(), branch.to_string()))
    }

    fn checkout_detached(&self, repo: &Path, rev: &str) -> Result<(), GitError> {
        self.record(GitCall::CheckoutDetached(repo.to_path_buf(), rev.to_string()))
    }

    fn restore_paths(&self, repo: &Path, rev: &str, paths: &[String]) -> Result<(), GitError> {
        self.record(GitCall::RestorePaths(
            repo.to_path_buf(),
            rev.to_string(),
            paths.to_vec(),
        ))
    }

    fn pull(&self, repo: &Path) -> Result<(), GitError> {
        self.record(GitCall::Pull(repo.to_path_buf()))
    }

    fn update_submodule(&self, repo: &Path, submodule: &SubmoduleEntry) -> Result<(), GitError> {
        self.record(GitCall::UpdateSubmodule(repo.to_path_buf(), submodule.name.clone()))
    }

    fn merge(&self, repo: &Path, branch: &str, strategy: MergeStrategy) -> Result<(), GitError> {
        self.record(GitCall::Merge(repo.to_path_buf(), branch.to_string(), strategy))
    }

    fn reset(&self, repo: &Path, rev: &str, mode: ResetMode) -> Result<(), GitError> {
        self.record(GitCall::Reset(repo.to_path_buf(), rev.to_string(), mode))
    }

    fn add_all(&self, repo: &Path) -> Result<(), GitError> {
        self.record(GitCall::AddAll(repo.to_path_buf()))
    }

    fn commit(&self, repo: &Path, message: &str, options: CommitOptions) -> Result<(), GitError> {
        if options.amend {
            self.record(GitCall::AmendCommit(repo.to_path_buf()))
        } else {
            self.record(GitCall::Commit(repo.to_path_buf(), message.to_string()))
        }
    }

    fn tag(&self, repo: &Path, name: &str, _message: &str) -> Result<(), GitError> {
        self.record(GitCall::Tag(repo.to_path_buf(), name.to_string()))
    }

    fn push(&self, repo: &Path, tags: bool) -> Result<(), GitError> {
        self.record(GitCall::Push(repo.to_path_buf(), tags))
    }

    fn clean(&self, repo: &Path) -> Result<(), GitError> {
        self.record(GitCall::Clean(repo.to_path_buf()))
    }
}

/// Records version rewrites without touching the file system.
#[derive(Default)]
pub struct RecordingRewriter {
    rewrites: RefCell<Vec<(String, String, RewriteOptions)>>,
}

impl RecordingRewriter {
    pub fn rewrites(&self) -> Vec<(String, String)> {
        self.rewrites
            .borrow()
            .iter()
            .map(|(from, to, _)| (from.clone(), to.clone()))
            .collect()
    }

    pub fn options(&self) -> Vec<RewriteOptions> {
        self.rewrites.borrow().iter().map(|(_, _, o)| *o).collect()
    }
}

impl VersionRewriter for RecordingRewriter {
    fn rewrite(
        &self,
        _repo: &Path,
        from: &str,
        to: &str,
        options: RewriteOptions,
    ) -> Result<RewriteReport, VersionError> {
        self.rewrites
            .borrow_mut()
            .push((from.to_string(), to.to_string(), options));
        Ok(RewriteReport::default())
    }
}

/// Records build requests; optionally fails every build.
#[derive(Default)]
pub struct RecordingBuilds {
    requests: RefCell<Vec<(Vec<String>, BuildOptions)>>,
    failure: Option<String>,
}

impl RecordingBuilds {
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests
            .borrow()
            .iter()
            .map(|(targets, _)| targets.clone())
            .collect()
    }

    pub fn last_options(&self) -> Option<BuildOptions> {
        self.requests.borrow().last().map(|(_, options)| options.clone())
    }
}

impl BuildRunner for RecordingBuilds {
    fn run_build(&self, targets: &[&str], options: &BuildOptions) -> anyhow::Result<BuildResult> {
        self.requests.borrow_mut().push((
            targets.iter().map(|t| t.to_string()).collect(),
            options.clone(),
        ));
        match &self.failure {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(BuildResult::default()),
        }
    }
}

/// Answers confirmations from a script; an exhausted script declines.
pub struct ScriptedConfirm {
    answers: RefCell<VecDeque<bool>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            questions: RefCell::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        self.questions.borrow_mut().push(question.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}

type SpecPredicate = Box<dyn Fn(&CommandSpec) -> bool + Send>;

/// Records every command and reports success, or a non-zero exit for
/// commands matching the failure predicate.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<CommandSpec>>,
    fail_on: Option<SpecPredicate>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, predicate: impl Fn(&CommandSpec) -> bool + Send + 'static) -> Self {
        self.fail_on = Some(Box::new(predicate));
        self
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    /// Commands rendered as `program arg...`.
    pub fn command_lines(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(spec.clone());
        }
        if self.fail_on.as_ref().is_some_and(|predicate| predicate(spec)) {
            return Ok(CommandOutput {
                status_code: 1,
                stdout: String::new(),
                stderr: format!("{} failed", spec.program),
            });
        }
        Ok(CommandOutput::ok())
    }
}
