//! Risk-ordered execution of many module updates.
//!
//! Requests are classified up front and stable-sorted from low to high risk,
//! then run one at a time. A failure never undoes updates that already
//! committed.

use serde::Serialize;
use tracing::{info, warn};

use crate::types::{CommitRef, ModuleId};
use crate::update::{OutcomeKind, UpdateOutcome, UpdateRequest, UpdateStateMachine, UpdateStatus};
use crate::version::{RiskLevel, UpdateType};

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Skip the remaining requests after the first failed one.
    pub stop_on_error: bool,
}

/// A request with its classification, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpdate {
    pub request: UpdateRequest,
    pub update_type: UpdateType,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum BatchItemStatus {
    Succeeded { commit: CommitRef },
    Failed { kind: OutcomeKind, reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub module: ModuleId,
    pub target_version: String,
    pub update_type: UpdateType,
    pub risk: RiskLevel,
    #[serde(flatten)]
    pub status: BatchItemStatus,
}

/// Results in execution (risk-sorted) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub items: Vec<BatchItem>,
}

impl BatchResult {
    pub fn successes(&self) -> impl Iterator<Item = &BatchItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.status, BatchItemStatus::Succeeded { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.status, BatchItemStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &BatchItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.status, BatchItemStatus::Skipped { .. }))
    }

    pub fn has_fatal(&self) -> bool {
        self.items.iter().any(|i| {
            matches!(
                i.status,
                BatchItemStatus::Failed {
                    kind: OutcomeKind::FatalManualInterventionRequired,
                    ..
                }
            )
        })
    }

    /// 5 if any update needs manual intervention, 1 if any failed, else 0.
    pub fn exit_code(&self) -> i32 {
        if self.has_fatal() {
            5
        } else if self.failures().next().is_some() {
            1
        } else {
            0
        }
    }
}

/// Runs batches through a borrowed state machine.
pub struct BatchScheduler<'m> {
    machine: &'m mut UpdateStateMachine,
}

impl<'m> BatchScheduler<'m> {
    pub fn new(machine: &'m mut UpdateStateMachine) -> Self {
        Self { machine }
    }

    /// Classify and stable-sort requests by ascending risk.
    pub fn plan(&self, requests: Vec<UpdateRequest>) -> Vec<PlannedUpdate> {
        let mut planned: Vec<PlannedUpdate> = requests
            .into_iter()
            .map(|request| {
                let update_type = self.machine.classify_request(&request);
                PlannedUpdate {
                    request,
                    update_type,
                    risk: update_type.strategy().risk_level,
                }
            })
            .collect();
        planned.sort_by_key(|p| p.risk);
        planned
    }

    pub fn run(&mut self, requests: Vec<UpdateRequest>, options: BatchOptions) -> BatchResult {
        let planned = self.plan(requests);
        info!(count = planned.len(), stop_on_error = options.stop_on_error, "starting batch");

        let mut result = BatchResult::default();
        let mut halted: Option<String> = None;

        for plan in planned {
            let module = plan.request.module.clone();
            let target_version = plan.request.target_version.clone();

            let status = match &halted {
                Some(reason) => BatchItemStatus::Skipped {
                    reason: reason.clone(),
                },
                None => {
                    let outcome = self.machine.update(plan.request);
                    let status = item_status(&outcome);
                    if let Some(reason) = halt_reason(&outcome, options) {
                        warn!(module = %module, reason = %reason, "halting batch");
                        halted = Some(reason);
                    }
                    status
                }
            };

            result.items.push(BatchItem {
                module,
                target_version,
                update_type: plan.update_type,
                risk: plan.risk,
                status,
            });
        }

        info!(
            succeeded = result.successes().count(),
            failed = result.failures().count(),
            skipped = result.skipped().count(),
            "batch finished"
        );
        result
    }
}

fn item_status(outcome: &UpdateOutcome) -> BatchItemStatus {
    match &outcome.status {
        UpdateStatus::Success { commit } => BatchItemStatus::Succeeded {
            commit: commit.clone(),
        },
        _ => BatchItemStatus::Failed {
            kind: outcome.kind(),
            reason: outcome.reason().unwrap_or_default(),
        },
    }
}

/// Why the rest of the batch should not run, if it should not.
///
/// A fatal outcome always halts. Rejections are not errors and never halt.
fn halt_reason(outcome: &UpdateOutcome, options: BatchOptions) -> Option<String> {
    let module = &outcome.context.module;
    match outcome.kind() {
        OutcomeKind::FatalManualInterventionRequired => Some(format!(
            "'{module}' requires manual intervention"
        )),
        OutcomeKind::ValidationFailed | OutcomeKind::RolledBack if options.stop_on_error => {
            Some(format!("stopped after '{module}' failed"))
        }
        _ => None,
    }
}
