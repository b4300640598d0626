//! Version-control capability consumed by the orchestrator.
//!
//! The orchestrator never touches a process-wide working directory. Every
//! operation goes through an explicit [`Repository`] handle, obtained per
//! module from a [`RepositoryHost`].

mod git;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{CommitRef, ModuleId};

pub use git::{GitRepository, GitWorkspace};

/// Errors reported by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("No repository at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Reference '{name}' could not be resolved")]
    UnresolvedRef { name: String },

    #[error("Nothing to undo: HEAD has no parent commit")]
    NothingToUndo,

    #[error("git {op} failed: {message}")]
    Git { op: &'static str, message: String },
}

impl RepositoryError {
    pub fn git(op: &'static str, err: impl std::fmt::Display) -> Self {
        RepositoryError::Git {
            op,
            message: err.to_string(),
        }
    }
}

/// A single version-controlled tree.
///
/// Implementations are blocking; each call runs to completion before
/// returning.
pub trait Repository {
    /// Resolve a tag, branch, or commit name to a concrete commit.
    fn resolve_ref(&self, name: &str) -> Result<CommitRef, RepositoryError>;

    /// Commit currently checked out.
    fn current_ref(&self) -> Result<CommitRef, RepositoryError>;

    /// True when there are no staged, unstaged, or untracked changes.
    fn is_clean(&self) -> Result<bool, RepositoryError>;

    /// Check out a local branch, or detach at any other resolvable reference.
    fn checkout(&self, reference: &str) -> Result<(), RepositoryError>;

    /// Record a commit of HEAD's tree plus the working-tree state of `paths`.
    ///
    /// Anything else already staged is neither committed nor discarded. A
    /// failed commit leaves the index as it was.
    fn commit(&self, paths: &[&Path], message: &str) -> Result<CommitRef, RepositoryError>;

    /// Move HEAD back to the first parent of the current commit and unstage
    /// what that commit recorded.
    fn undo_last_commit(&self) -> Result<(), RepositoryError>;

    fn tag_exists(&self, name: &str) -> Result<bool, RepositoryError>;

    /// Local branch HEAD is attached to, `None` when detached.
    fn current_branch(&self) -> Result<Option<String>, RepositoryError>;

    /// Nearest tag reachable from HEAD, or `"HEAD"` when there is none.
    fn current_version(&self) -> Result<String, RepositoryError>;

    /// Root of the checked-out files, if the repository has one.
    fn workdir(&self) -> Option<&Path>;
}

/// Opens the enclosing repository and the repositories of its modules.
pub trait RepositoryHost {
    fn parent(&self) -> &dyn Repository;

    fn open_module(&self, module: &ModuleId) -> Result<Box<dyn Repository>, RepositoryError>;
}
