//! Fold gate results into a single deployability decision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Gate, GateResult};

/// Minimum weighted score for a module to be deployable.
pub const DEPLOY_THRESHOLD: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub can_deploy: bool,
    pub gate_results: BTreeMap<Gate, GateResult>,
    pub critical_failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl QualityReport {
    pub fn failed_critical_gates(&self) -> Vec<Gate> {
        self.gate_results
            .iter()
            .filter(|(gate, result)| gate.is_critical() && !result.passed)
            .map(|(gate, _)| *gate)
            .collect()
    }

    pub fn has_critical_failure(&self) -> bool {
        !self.critical_failures.is_empty()
    }
}

/// Weighted mean of `(score, weight)` pairs. Zero total weight yields 0.
pub fn weighted_mean(entries: impl IntoIterator<Item = (f64, u32)>) -> f64 {
    let (sum, weight) = entries
        .into_iter()
        .fold((0.0, 0u32), |(sum, weight), (score, w)| {
            (sum + score * f64::from(w), weight + w)
        });
    if weight == 0 {
        return 0.0;
    }
    sum / f64::from(weight)
}

/// Combine gate results into a [`QualityReport`].
///
/// Gates without a result are left out of the weighted mean. A critical gate
/// that failed or produced no result blocks deployment regardless of score.
pub fn aggregate(results: &BTreeMap<Gate, GateResult>) -> QualityReport {
    let overall_score = weighted_mean(
        results
            .iter()
            .map(|(gate, result)| (result.score, gate.weight())),
    );

    let mut critical_failures = Vec::new();
    let mut warnings = Vec::new();
    let mut critical_ok = true;

    for gate in Gate::ALL {
        let Some(result) = results.get(&gate) else {
            if gate.is_critical() {
                critical_ok = false;
                critical_failures.push(format!("{gate}: gate was not evaluated"));
            }
            continue;
        };

        if gate.is_critical() {
            if result.passed {
                if result.score < 100.0 {
                    warnings.push(format!("{gate}: scored {:.1}/100", result.score));
                }
            } else {
                critical_ok = false;
                if result.issues.is_empty() {
                    critical_failures.push(format!("{gate}: scored {:.1}/100", result.score));
                }
                critical_failures.extend(result.issues.iter().map(|i| format!("{gate}: {i}")));
            }
        } else {
            warnings.extend(result.issues.iter().map(|i| format!("{gate}: {i}")));
        }
    }

    QualityReport {
        overall_score,
        can_deploy: critical_ok && overall_score >= DEPLOY_THRESHOLD,
        gate_results: results.clone(),
        critical_failures,
        warnings,
    }
}
