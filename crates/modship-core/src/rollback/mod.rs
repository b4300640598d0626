//! Rollback points and their restoration.
//!
//! A [`RollbackPoint`] is taken once per update attempt before anything is
//! mutated, and kept on a LIFO stack until the attempt either commits
//! (released) or is restored (popped).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::repo::{Repository, RepositoryError};
use crate::types::{CommitRef, ModuleId};
use crate::update::{AttemptId, UpdateContext};

/// Restore failed; the repository needs manual attention.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("No rollback point recorded for '{module}'")]
    NoRollbackPoint { module: ModuleId },

    #[error("Rollback of '{module}' failed while {step}: {source}")]
    Repository {
        module: ModuleId,
        step: &'static str,
        source: RepositoryError,
    },

    #[error("Rollback of '{module}' left the {target} at {actual}, expected {expected}")]
    Diverged {
        module: ModuleId,
        target: &'static str,
        expected: CommitRef,
        actual: CommitRef,
    },
}

/// Recorded pre-mutation state of one update attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub attempt: AttemptId,
    pub module: ModuleId,
    pub module_ref: CommitRef,
    pub parent_ref: CommitRef,
    /// Branch the module was on, `None` when HEAD was detached.
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// Both repositories were already at the snapshot.
    AlreadyRestored,
}

#[derive(Debug, Default)]
pub struct RollbackManager {
    stack: Vec<RollbackPoint>,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state of the module and its parent.
    pub fn snapshot(
        &mut self,
        ctx: &UpdateContext,
        module_repo: &dyn Repository,
        parent: &dyn Repository,
    ) -> Result<RollbackPoint, RepositoryError> {
        let point = RollbackPoint {
            attempt: ctx.attempt,
            module: ctx.module.clone(),
            module_ref: module_repo.current_ref()?,
            parent_ref: parent.current_ref()?,
            branch: module_repo.current_branch()?,
            created_at: Utc::now(),
        };
        info!(
            module = %point.module,
            module_ref = %point.module_ref.short(),
            parent_ref = %point.parent_ref.short(),
            "recorded rollback point"
        );
        self.stack.push(point.clone());
        Ok(point)
    }

    /// Put the module and parent back to the context's rollback point.
    ///
    /// Safe to call again after a successful restore.
    pub fn restore(
        &mut self,
        ctx: &UpdateContext,
        module_repo: &dyn Repository,
        parent: &dyn Repository,
    ) -> Result<RestoreOutcome, RollbackError> {
        let point = ctx
            .rollback_point
            .as_ref()
            .ok_or_else(|| RollbackError::NoRollbackPoint {
                module: ctx.module.clone(),
            })?;
        let module = &point.module;
        let repo_err = |step: &'static str| {
            move |source: RepositoryError| RollbackError::Repository {
                module: module.clone(),
                step,
                source,
            }
        };

        let module_at = module_repo
            .current_ref()
            .map_err(repo_err("reading module HEAD"))?;
        let parent_at = parent
            .current_ref()
            .map_err(repo_err("reading parent HEAD"))?;

        if module_at == point.module_ref && parent_at == point.parent_ref {
            self.release(point.attempt);
            return Ok(RestoreOutcome::AlreadyRestored);
        }

        if module_at != point.module_ref {
            let target = match &point.branch {
                Some(branch)
                    if module_repo.resolve_ref(branch).ok().as_ref() == Some(&point.module_ref) =>
                {
                    branch.as_str()
                }
                _ => point.module_ref.as_str(),
            };
            module_repo
                .checkout(target)
                .map_err(repo_err("checking out module"))?;
            let now = module_repo
                .current_ref()
                .map_err(repo_err("reading module HEAD"))?;
            if now != point.module_ref {
                return Err(RollbackError::Diverged {
                    module: module.clone(),
                    target: "module",
                    expected: point.module_ref.clone(),
                    actual: now,
                });
            }
        }

        if parent_at != point.parent_ref {
            warn!(module = %module, parent_ref = %parent_at.short(), "undoing parent commit");
            parent
                .undo_last_commit()
                .map_err(repo_err("undoing parent commit"))?;
            let now = parent
                .current_ref()
                .map_err(repo_err("reading parent HEAD"))?;
            if now != point.parent_ref {
                return Err(RollbackError::Diverged {
                    module: module.clone(),
                    target: "parent repository",
                    expected: point.parent_ref.clone(),
                    actual: now,
                });
            }
        }

        self.release(point.attempt);
        info!(module = %module, module_ref = %point.module_ref.short(), "restored rollback point");
        Ok(RestoreOutcome::Restored)
    }

    /// Drop the rollback point of a finished attempt.
    pub fn release(&mut self, attempt: AttemptId) -> Option<RollbackPoint> {
        let idx = self.stack.iter().rposition(|p| p.attempt == attempt)?;
        Some(self.stack.remove(idx))
    }

    /// Outstanding rollback points, oldest first.
    pub fn pending(&self) -> &[RollbackPoint] {
        &self.stack
    }
}
