//! Modship Core Library
//!
//! Safe, gated updates of versioned modules (git submodules) inside a parent
//! repository: classification, quality gates, snapshot and rollback, and
//! risk-ordered batches.

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod quality;
pub mod repo;
pub mod rollback;
pub mod types;
pub mod update;
pub mod version;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, ModshipConfig};
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{UpdateError, ValidationError};
    pub use crate::rollback::RollbackError;

    // Repository access
    pub use crate::repo::{GitRepository, GitWorkspace, Repository, RepositoryError, RepositoryHost};
    pub use crate::types::{CommitRef, ModuleId};

    // Quality gates
    pub use crate::quality::{
        ContractComparator, FsFactProbe, Gate, HeuristicContractComparator, ModuleFacts,
        QualityEngine, QualityReport,
    };

    // Updates
    pub use crate::batch::{BatchOptions, BatchResult, BatchScheduler};
    pub use crate::update::{
        OutcomeKind, UpdateOutcome, UpdateRequest, UpdateState, UpdateStateMachine, UpdateStatus,
    };
    pub use crate::version::{RiskLevel, UpdateStrategy, UpdateType, classify};
}
