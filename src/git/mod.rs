//! Git operations module
//!
//! Read-only repository inspection through libgit2, qualifier creation, and
//! helpers that apply a [`VersionControl`](crate::external::VersionControl)
//! operation to every submodule of a repository.

pub mod error;
pub mod operations;
pub mod qualifier;
pub mod submodules;

pub use error::GitError;
pub use operations::{RepositoryInspector, SubmoduleEntry};
pub use qualifier::{create_now_qualifier, create_qualifier, format_qualifier};
