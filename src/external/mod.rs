//! External tool abstractions
//!
//! Trait-based wrappers around the command line tools this crate drives
//! (git, Maven, Gradle, upload tools). Decisions stay in the callers, the
//! effects go through a [`CommandExecutor`] so tests can substitute it.

pub mod command;
pub mod git;
pub mod gradle;
pub mod maven;

pub use command::{
    run_checked, CommandError, CommandExecutor, CommandOutput, CommandSpec, ProcessCommandExecutor,
    Secret,
};
pub use git::{
    submodule_paths, tracking_ref, CommitOptions, GitClient, MergeStrategy, ResetMode,
    VersionControl,
};
pub use gradle::Gradle;
pub use maven::Maven;
