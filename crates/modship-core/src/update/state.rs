use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateState {
    Idle,
    PreValidating,
    Approved,
    Rejected,
    /// Precondition failed before anything was mutated.
    Aborted,
    Snapshotted,
    Applying,
    PostValidating,
    Committing,
    Done,
    RollingBack,
    RolledBack,
    Failed,
}

impl UpdateState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UpdateState::Rejected
                | UpdateState::Aborted
                | UpdateState::Done
                | UpdateState::RolledBack
                | UpdateState::Failed
        )
    }

    pub fn can_transition_to(self, next: UpdateState) -> bool {
        use UpdateState::*;

        matches!(
            (self, next),
            (Idle, PreValidating)
                | (PreValidating, Approved | Rejected | Aborted)
                | (Approved, Snapshotted | Aborted)
                | (Snapshotted, Applying | RollingBack)
                | (Applying, PostValidating | RollingBack)
                | (PostValidating, Committing | RollingBack)
                | (Committing, Done | RollingBack)
                | (RollingBack, RolledBack | Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::PreValidating => "pre-validating",
            UpdateState::Approved => "approved",
            UpdateState::Rejected => "rejected",
            UpdateState::Aborted => "aborted",
            UpdateState::Snapshotted => "snapshotted",
            UpdateState::Applying => "applying",
            UpdateState::PostValidating => "post-validating",
            UpdateState::Committing => "committing",
            UpdateState::Done => "done",
            UpdateState::RollingBack => "rolling-back",
            UpdateState::RolledBack => "rolled-back",
            UpdateState::Failed => "failed",
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
