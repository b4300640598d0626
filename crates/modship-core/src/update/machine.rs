//! The update state machine.
//!
//! One call to [`UpdateStateMachine::update`] drives one module through
//! pre-validation, snapshot, switch, post-validation, and commit. Any failure
//! after the snapshot restores it; only a failed restore is fatal.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use super::context::{AttemptId, UpdateContext, UpdateRequest};
use super::message::commit_message;
use super::state::UpdateState;
use crate::error::{UpdateError, ValidationError};
use crate::quality::{ContractDocument, QualityEngine, QualityReport};
use crate::repo::{Repository, RepositoryError, RepositoryHost};
use crate::rollback::{RollbackError, RollbackManager};
use crate::types::{CommitRef, ModuleId};
use crate::version::{UpdateType, classify};

pub const DEFAULT_COMMIT_PREFIX: &str = "chore(modules)";

#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub commit_prefix: String,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            commit_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
        }
    }
}

/// Coarse outcome of an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Success,
    RejectedNeedsApproval,
    ValidationFailed,
    RolledBack,
    FatalManualInterventionRequired,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::RejectedNeedsApproval => "rejected-needs-approval",
            OutcomeKind::ValidationFailed => "validation-failed",
            OutcomeKind::RolledBack => "rolled-back",
            OutcomeKind::FatalManualInterventionRequired => "fatal-manual-intervention-required",
        }
    }

    /// Process exit code used by the command line.
    pub fn exit_code(self) -> i32 {
        match self {
            OutcomeKind::Success => 0,
            OutcomeKind::RejectedNeedsApproval => 2,
            OutcomeKind::ValidationFailed => 3,
            OutcomeKind::RolledBack => 4,
            OutcomeKind::FatalManualInterventionRequired => 5,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum UpdateStatus {
    Success { commit: CommitRef },
    Rejected { update_type: UpdateType },
    ValidationFailed(ValidationError),
    RolledBack(UpdateError),
    /// The attempt failed and so did restoring its rollback point.
    Fatal {
        cause: UpdateError,
        rollback: RollbackError,
    },
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub status: UpdateStatus,
    pub context: UpdateContext,
}

impl UpdateOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match &self.status {
            UpdateStatus::Success { .. } => OutcomeKind::Success,
            UpdateStatus::Rejected { .. } => OutcomeKind::RejectedNeedsApproval,
            UpdateStatus::ValidationFailed(_) => OutcomeKind::ValidationFailed,
            UpdateStatus::RolledBack(_) => OutcomeKind::RolledBack,
            UpdateStatus::Fatal { .. } => OutcomeKind::FatalManualInterventionRequired,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind() == OutcomeKind::Success
    }

    /// Human-readable reason for any outcome other than success.
    pub fn reason(&self) -> Option<String> {
        match &self.status {
            UpdateStatus::Success { .. } => None,
            UpdateStatus::Rejected { update_type } => Some(format!(
                "{update_type} update of '{}' requires approval",
                self.context.module
            )),
            UpdateStatus::ValidationFailed(err) => Some(err.to_string()),
            UpdateStatus::RolledBack(err) => Some(err.to_string()),
            UpdateStatus::Fatal { cause, rollback } => Some(format!(
                "{cause}; rollback failed: {rollback}; manual intervention required"
            )),
        }
    }
}

/// State carried from pre-validation into the mutating steps.
struct Prepared {
    repo: Box<dyn Repository>,
    baseline: Option<ContractDocument>,
}

pub struct UpdateStateMachine {
    host: Box<dyn RepositoryHost>,
    quality: QualityEngine,
    rollback: RollbackManager,
    settings: UpdateSettings,
    next_attempt: u64,
}

impl fmt::Debug for UpdateStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateStateMachine")
            .field("settings", &self.settings)
            .field("pending_rollbacks", &self.rollback.pending().len())
            .finish_non_exhaustive()
    }
}

impl UpdateStateMachine {
    pub fn new(
        host: Box<dyn RepositoryHost>,
        quality: QualityEngine,
        settings: UpdateSettings,
    ) -> Self {
        Self {
            host,
            quality,
            rollback: RollbackManager::new(),
            settings,
            next_attempt: 1,
        }
    }

    pub fn host(&self) -> &dyn RepositoryHost {
        self.host.as_ref()
    }

    pub fn rollback_manager(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Evaluate a module's quality gates as currently checked out.
    pub fn evaluate(&self, module: &ModuleId) -> Result<QualityReport, ValidationError> {
        let repo = self
            .host
            .open_module(module)
            .map_err(|source| ValidationError::ModuleNotFound {
                module: module.clone(),
                source,
            })?;
        let assessment = self
            .quality
            .assess(module, repo.as_ref(), None)
            .map_err(|source| ValidationError::Evaluation {
                module: module.clone(),
                source,
            })?;
        Ok(assessment.report)
    }

    /// Classify a request against the module's current version.
    ///
    /// A module that cannot be opened classifies as a major update.
    pub fn classify_request(&self, request: &UpdateRequest) -> UpdateType {
        let current = self
            .host
            .open_module(&request.module)
            .and_then(|repo| repo.current_version())
            .unwrap_or_else(|_| "HEAD".to_string());
        classify(&current, &request.target_version)
    }

    /// Run one update attempt to completion.
    pub fn update(&mut self, request: UpdateRequest) -> UpdateOutcome {
        let attempt = AttemptId(self.next_attempt);
        self.next_attempt += 1;

        let mut ctx = UpdateContext::new(attempt, request);
        info!(
            module = %ctx.module,
            target = %ctx.target_version,
            attempt = %attempt,
            "starting update"
        );

        ctx.advance(UpdateState::PreValidating);
        let prepared = match self.pre_validate(&mut ctx) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(module = %ctx.module, error = %err, "pre-validation failed");
                ctx.advance(UpdateState::Aborted);
                return finish(ctx, UpdateStatus::ValidationFailed(err));
            }
        };

        let update_type = ctx.update_type.unwrap_or(UpdateType::Major);
        let strategy = update_type.strategy();
        if strategy.requires_approval && !ctx.approved {
            info!(module = %ctx.module, update_type = %update_type, "update requires approval");
            ctx.advance(UpdateState::Rejected);
            return finish(ctx, UpdateStatus::Rejected { update_type });
        }
        ctx.advance(UpdateState::Approved);

        let Prepared { repo, baseline } = prepared;
        match self
            .rollback
            .snapshot(&ctx, repo.as_ref(), self.host.parent())
        {
            Ok(point) => ctx.rollback_point = Some(point),
            Err(source) => {
                let err = ValidationError::Snapshot {
                    module: ctx.module.clone(),
                    source,
                };
                warn!(module = %ctx.module, error = %err, "snapshot failed");
                ctx.advance(UpdateState::Aborted);
                return finish(ctx, UpdateStatus::ValidationFailed(err));
            }
        }
        ctx.advance(UpdateState::Snapshotted);

        match self.apply_and_commit(&mut ctx, repo.as_ref(), baseline.as_ref()) {
            Ok(commit) => {
                self.rollback.release(ctx.attempt);
                ctx.advance(UpdateState::Done);
                info!(module = %ctx.module, commit = %commit.short(), "update committed");
                finish(ctx, UpdateStatus::Success { commit })
            }
            Err(cause) => self.roll_back(ctx, repo.as_ref(), cause),
        }
    }

    fn pre_validate(&self, ctx: &mut UpdateContext) -> Result<Prepared, ValidationError> {
        let module = ctx.module.clone();
        let repo_err = |source: RepositoryError| ValidationError::Repository {
            module: module.clone(),
            source,
        };

        let repo =
            self.host
                .open_module(&module)
                .map_err(|source| ValidationError::ModuleNotFound {
                    module: module.clone(),
                    source,
                })?;

        if !repo.is_clean().map_err(repo_err)? {
            return Err(ValidationError::DirtyWorkingTree {
                module: module.clone(),
            });
        }

        let target_ref = repo.resolve_ref(&ctx.target_version).map_err(|source| {
            ValidationError::UnresolvedTarget {
                module: module.clone(),
                target: ctx.target_version.clone(),
                source,
            }
        })?;
        let previous_ref = repo.current_ref().map_err(repo_err)?;
        let current_version = repo.current_version().map_err(repo_err)?;
        let update_type = classify(&current_version, &ctx.target_version);

        let assessment = self
            .quality
            .assess(&module, repo.as_ref(), None)
            .map_err(|source| ValidationError::Evaluation {
                module: module.clone(),
                source,
            })?;

        info!(
            module = %module,
            from = %current_version,
            to = %ctx.target_version,
            update_type = %update_type,
            score = assessment.report.overall_score,
            "pre-validation passed"
        );

        ctx.target_ref = Some(target_ref);
        ctx.previous_ref = Some(previous_ref);
        ctx.current_version = Some(current_version);
        ctx.update_type = Some(update_type);
        ctx.strategy = Some(update_type.strategy());
        ctx.pre_validation = Some(assessment.report);

        Ok(Prepared {
            repo,
            baseline: assessment.contract,
        })
    }

    fn apply_and_commit(
        &self,
        ctx: &mut UpdateContext,
        repo: &dyn Repository,
        baseline: Option<&ContractDocument>,
    ) -> Result<CommitRef, UpdateError> {
        let module = ctx.module.clone();

        ctx.advance(UpdateState::Applying);
        let Some(expected) = ctx.target_ref.clone() else {
            return Err(UpdateError::Apply {
                module,
                source: RepositoryError::UnresolvedRef {
                    name: ctx.target_version.clone(),
                },
            });
        };
        let apply_err = |source| UpdateError::Apply {
            module: module.clone(),
            source,
        };
        repo.checkout(expected.as_str()).map_err(apply_err)?;
        let actual = repo.current_ref().map_err(apply_err)?;
        if actual != expected {
            return Err(UpdateError::ApplyMismatch {
                module,
                expected,
                actual,
            });
        }

        ctx.advance(UpdateState::PostValidating);
        let assessment = self
            .quality
            .assess(&module, repo, baseline)
            .map_err(|source| UpdateError::Evaluation {
                module: module.clone(),
                source,
            })?;
        let report = assessment.report;
        let comparison = assessment.comparison;
        let failed_gates = report.has_critical_failure();
        let score = report.overall_score;
        let failures = report.critical_failures.clone();
        ctx.post_validation = Some(report);
        ctx.compatibility = Some(comparison.clone());

        if failed_gates {
            return Err(UpdateError::GateFailure {
                module,
                score,
                failures,
            });
        }

        let requires_compatibility = ctx
            .strategy
            .map(|s| s.requires_compatibility_test)
            .unwrap_or(true);
        if requires_compatibility && !comparison.breaking_changes.is_empty() {
            return Err(UpdateError::Compatibility {
                module,
                breaking_changes: comparison.breaking_changes,
            });
        }

        ctx.advance(UpdateState::Committing);
        let message = commit_message(&self.settings.commit_prefix, ctx);
        let commit = self
            .host
            .parent()
            .commit(&[module.as_path()], &message)
            .map_err(|source| UpdateError::Commit {
                module: module.clone(),
                source,
            })?;
        ctx.committed_ref = Some(commit.clone());
        Ok(commit)
    }

    fn roll_back(
        &mut self,
        mut ctx: UpdateContext,
        repo: &dyn Repository,
        cause: UpdateError,
    ) -> UpdateOutcome {
        warn!(module = %ctx.module, state = %ctx.state, error = %cause, "update failed, rolling back");
        ctx.advance(UpdateState::RollingBack);

        match self.rollback.restore(&ctx, repo, self.host.parent()) {
            Ok(_) => {
                ctx.advance(UpdateState::RolledBack);
                info!(module = %ctx.module, "rolled back");
                finish(ctx, UpdateStatus::RolledBack(cause))
            }
            Err(rollback) => {
                error!(
                    module = %ctx.module,
                    error = %rollback,
                    "rollback failed, manual intervention required"
                );
                ctx.advance(UpdateState::Failed);
                finish(ctx, UpdateStatus::Fatal { cause, rollback })
            }
        }
    }
}

fn finish(context: UpdateContext, status: UpdateStatus) -> UpdateOutcome {
    UpdateOutcome { status, context }
}
