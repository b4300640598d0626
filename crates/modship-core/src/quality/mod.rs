//! Quality gates: per-dimension scoring and the deployability decision.
//!
//! Facts about a module come from a [`ModuleFacts`] collaborator and a
//! [`ContractComparator`]; [`evaluator`] turns them into one [`GateResult`]
//! per [`Gate`], and [`aggregate`] folds those into a [`QualityReport`].

pub mod aggregate;
pub mod contract;
pub mod evaluator;
pub mod facts;
pub mod probe;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::repo::Repository;
use crate::types::ModuleId;

pub use aggregate::{DEPLOY_THRESHOLD, QualityReport, aggregate, weighted_mean};
pub use contract::{ContractComparator, ContractComparison, HeuristicContractComparator};
pub use evaluator::evaluate_all;
pub use facts::{
    ContractDocument, ContractFacts, DeploymentFacts, FactSheet, FactsError, ModuleFacts,
    PerformanceFacts, SecurityFacts, StabilityFacts,
};
pub use probe::FsFactProbe;

/// One quality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Security,
    Stability,
    Performance,
    Contract,
    Deployment,
}

impl Gate {
    pub const ALL: [Gate; 5] = [
        Gate::Security,
        Gate::Stability,
        Gate::Performance,
        Gate::Contract,
        Gate::Deployment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Gate::Security => "security",
            Gate::Stability => "stability",
            Gate::Performance => "performance",
            Gate::Contract => "contract",
            Gate::Deployment => "deployment",
        }
    }

    /// Share of the overall score, out of 100 across all gates.
    pub fn weight(self) -> u32 {
        match self {
            Gate::Security => 25,
            Gate::Stability => 20,
            Gate::Performance => 15,
            Gate::Contract => 20,
            Gate::Deployment => 20,
        }
    }

    /// A failing critical gate vetoes deployment on its own.
    pub fn is_critical(self) -> bool {
        !matches!(self, Gate::Performance)
    }

    pub fn pass_threshold(self) -> f64 {
        match self {
            Gate::Performance => 70.0,
            _ => 90.0,
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value recorded for a single check inside a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckValue {
    Flag(bool),
    Number(f64),
}

impl From<bool> for CheckValue {
    fn from(value: bool) -> Self {
        CheckValue::Flag(value)
    }
}

impl From<f64> for CheckValue {
    fn from(value: f64) -> Self {
        CheckValue::Number(value)
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub score: f64,
    pub passed: bool,
    pub checks: BTreeMap<String, CheckValue>,
    /// Unmet checks, only populated when the gate failed.
    pub issues: Vec<String>,
}

/// Result of evaluating a module: the report plus the contract inputs used.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub report: QualityReport,
    pub comparison: ContractComparison,
    /// Contract document as found in the module, kept as the baseline for
    /// comparing a later version.
    pub contract: Option<ContractDocument>,
}

/// Runs fact collection, contract comparison, scoring, and aggregation.
pub struct QualityEngine {
    facts: Box<dyn ModuleFacts>,
    comparator: Box<dyn ContractComparator>,
}

impl fmt::Debug for QualityEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityEngine").finish_non_exhaustive()
    }
}

impl QualityEngine {
    pub fn new(facts: Box<dyn ModuleFacts>, comparator: Box<dyn ContractComparator>) -> Self {
        Self { facts, comparator }
    }

    /// Evaluate a module as currently checked out.
    ///
    /// When `baseline` is given the contract is compared against it;
    /// otherwise the contract is compared against itself.
    pub fn assess(
        &self,
        module: &ModuleId,
        repo: &dyn Repository,
        baseline: Option<&ContractDocument>,
    ) -> Result<Assessment, FactsError> {
        let sheet = self.facts.collect(module, repo)?;
        let contract = self.facts.contract_document(module, repo)?;

        let current_text = contract.as_ref().map(|doc| doc.content.as_str());
        let baseline_text = match baseline {
            Some(doc) => Some(doc.content.as_str()),
            None => current_text,
        };
        let comparison = self.comparator.compare(baseline_text, current_text);

        let contract_facts = ContractFacts {
            has_contract: contract.is_some(),
            is_valid: comparison.is_valid,
            compatibility_score: comparison.compatibility_score,
            has_version: contract
                .as_ref()
                .map(|doc| contract::declares_version(&doc.content))
                .unwrap_or(false),
            breaking_changes: comparison.breaking_changes.len(),
        };

        let results = evaluate_all(&sheet, &contract_facts);
        let report = aggregate(&results);
        debug!(
            module = %module,
            score = report.overall_score,
            can_deploy = report.can_deploy,
            "assessed module"
        );

        Ok(Assessment {
            report,
            comparison,
            contract,
        })
    }
}
