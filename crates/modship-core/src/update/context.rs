use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::state::UpdateState;
use crate::error::ValidationError;
use crate::quality::{ContractComparison, QualityReport};
use crate::rollback::RollbackPoint;
use crate::types::{CommitRef, ModuleId};
use crate::version::{UpdateStrategy, UpdateType};

/// Identifies one update attempt within a state machine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request to move one module to a target version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub module: ModuleId,
    pub target_version: String,
    pub approved: bool,
}

impl UpdateRequest {
    pub fn new(
        module: &str,
        target_version: &str,
        approved: bool,
    ) -> Result<Self, ValidationError> {
        let module = ModuleId::new(module)?;
        let target_version = target_version.trim();
        if target_version.is_empty() {
            return Err(ValidationError::InvalidRequest {
                reason: format!("target version for '{module}' must not be empty"),
            });
        }
        Ok(Self {
            module,
            target_version: target_version.to_string(),
            approved,
        })
    }

    /// Parse `module@version`.
    pub fn parse(spec: &str, approved: bool) -> Result<Self, ValidationError> {
        let Some((module, version)) = spec.rsplit_once('@') else {
            return Err(ValidationError::InvalidRequest {
                reason: format!("expected <module>@<version>, got '{spec}'"),
            });
        };
        Self::new(module, version, approved)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: UpdateState,
    pub to: UpdateState,
    pub at: DateTime<Utc>,
}

/// Transient record of one update attempt.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateContext {
    pub attempt: AttemptId,
    pub module: ModuleId,
    pub target_version: String,
    pub approved: bool,
    pub current_version: Option<String>,
    pub previous_ref: Option<CommitRef>,
    pub target_ref: Option<CommitRef>,
    pub update_type: Option<UpdateType>,
    pub strategy: Option<UpdateStrategy>,
    pub pre_validation: Option<QualityReport>,
    pub post_validation: Option<QualityReport>,
    pub compatibility: Option<ContractComparison>,
    pub rollback_point: Option<RollbackPoint>,
    pub committed_ref: Option<CommitRef>,
    pub state: UpdateState,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl UpdateContext {
    pub fn new(attempt: AttemptId, request: UpdateRequest) -> Self {
        Self {
            attempt,
            module: request.module,
            target_version: request.target_version,
            approved: request.approved,
            current_version: None,
            previous_ref: None,
            target_ref: None,
            update_type: None,
            strategy: None,
            pre_validation: None,
            post_validation: None,
            compatibility: None,
            rollback_point: None,
            committed_ref: None,
            state: UpdateState::Idle,
            transitions: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `next`, recording the transition. Transitions outside the
    /// state table are reported and still recorded.
    pub fn advance(&mut self, next: UpdateState) {
        if !self.state.can_transition_to(next) {
            error!(
                module = %self.module,
                attempt = %self.attempt,
                from = %self.state,
                to = %next,
                "illegal state transition"
            );
            debug_assert!(false, "illegal transition {} -> {}", self.state, next);
        }
        let at = Utc::now();
        debug!(module = %self.module, attempt = %self.attempt, from = %self.state, to = %next, "transition");
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            at,
        });
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(at);
        }
    }

    /// States visited so far, starting with `Idle`.
    pub fn path(&self) -> Vec<UpdateState> {
        let mut path = vec![UpdateState::Idle];
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }
}
