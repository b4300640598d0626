//! Raw inputs to the gate evaluators and the capability that supplies them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repo::{Repository, RepositoryError};
use crate::types::ModuleId;

#[derive(Debug, Error)]
pub enum FactsError {
    #[error("Module '{module}' has no working directory")]
    NoWorkdir { module: ModuleId },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityFacts {
    pub security_policy: bool,
    pub safe_ignore_rules: bool,
    pub secrets_example: bool,
    pub no_hardcoded_secrets: bool,
    pub https_enforced: bool,
    pub auth_present: bool,
    /// Known vulnerabilities; `None` when no audit result is available.
    pub vulnerability_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityFacts {
    pub stable_tag: bool,
    pub tests_exist: bool,
    /// Line coverage percentage, 0-100.
    pub test_coverage: f64,
    pub build_passes: bool,
    pub error_handling: bool,
    pub rollback_capability: bool,
    pub health_endpoint: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceFacts {
    pub bundle_size_bytes: u64,
    pub build_time_secs: f64,
    pub dependency_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFacts {
    pub package_manifest: bool,
    pub build_script: bool,
    pub start_script: bool,
    pub deployment_config: bool,
    pub env_config: bool,
    pub health_check_script: bool,
    pub production_ready: bool,
}

/// Contract gate inputs, assembled from the document and its comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractFacts {
    pub has_contract: bool,
    pub is_valid: bool,
    pub compatibility_score: f64,
    pub has_version: bool,
    pub breaking_changes: usize,
}

/// Everything a [`ModuleFacts`] source measures about one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSheet {
    pub security: SecurityFacts,
    pub stability: StabilityFacts,
    pub performance: PerformanceFacts,
    pub deployment: DeploymentFacts,
}

/// A module's external contract as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDocument {
    pub path: PathBuf,
    pub content: String,
}

/// Supplies measured facts about a module's current checkout.
pub trait ModuleFacts {
    fn collect(&self, module: &ModuleId, repo: &dyn Repository) -> Result<FactSheet, FactsError>;

    fn contract_document(
        &self,
        module: &ModuleId,
        repo: &dyn Repository,
    ) -> Result<Option<ContractDocument>, FactsError>;
}
