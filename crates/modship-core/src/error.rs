//! Error taxonomy for update attempts.
//!
//! [`ValidationError`] aborts before anything is mutated. [`UpdateError`]
//! covers failures after the rollback point was taken and is always recovered
//! by restoring it. Restore failures are reported as
//! [`RollbackError`](crate::rollback::RollbackError), which is never retried.

use thiserror::Error;

use crate::quality::FactsError;
use crate::repo::RepositoryError;
use crate::types::{CommitRef, ModuleId};

/// A precondition of the update was not met. Nothing was changed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid update request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Module '{module}' not found: {source}")]
    ModuleNotFound {
        module: ModuleId,
        source: RepositoryError,
    },

    #[error("Module '{module}' has uncommitted local changes")]
    DirtyWorkingTree { module: ModuleId },

    #[error("Target version '{target}' of module '{module}' does not resolve: {source}")]
    UnresolvedTarget {
        module: ModuleId,
        target: String,
        source: RepositoryError,
    },

    #[error("Repository error while validating '{module}': {source}")]
    Repository {
        module: ModuleId,
        source: RepositoryError,
    },

    #[error("Could not evaluate module '{module}': {source}")]
    Evaluation { module: ModuleId, source: FactsError },

    #[error("Could not record rollback point for '{module}': {source}")]
    Snapshot {
        module: ModuleId,
        source: RepositoryError,
    },
}

/// A failure after the rollback point was recorded.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Quality gates failed for '{module}' (score {score:.1}): {}", failures.join("; "))]
    GateFailure {
        module: ModuleId,
        score: f64,
        failures: Vec<String>,
    },

    #[error("Breaking contract changes in '{module}': {}", breaking_changes.join("; "))]
    Compatibility {
        module: ModuleId,
        breaking_changes: Vec<String>,
    },

    #[error("Module '{module}' is at {actual} after switching, expected {expected}")]
    ApplyMismatch {
        module: ModuleId,
        expected: CommitRef,
        actual: CommitRef,
    },

    #[error("Failed to switch module '{module}': {source}")]
    Apply {
        module: ModuleId,
        source: RepositoryError,
    },

    #[error("Could not evaluate updated module '{module}': {source}")]
    Evaluation { module: ModuleId, source: FactsError },

    #[error("Failed to record update of '{module}': {source}")]
    Commit {
        module: ModuleId,
        source: RepositoryError,
    },
}
