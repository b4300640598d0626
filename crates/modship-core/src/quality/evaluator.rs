//! Per-gate scoring rules.
//!
//! Each evaluator is a pure function of its facts. Scores are clamped to
//! 0-100 and `issues` is only filled in when the gate fails.

use std::collections::BTreeMap;

use super::facts::{
    ContractFacts, DeploymentFacts, FactSheet, PerformanceFacts, SecurityFacts, StabilityFacts,
};
use super::{CheckValue, Gate, GateResult};

const VULNERABILITY_PENALTY: f64 = 5.0;
const MAX_VULNERABILITY_PENALTY: f64 = 30.0;

const PERFORMANCE_BASE: f64 = 85.0;
const BUNDLE_SIZE_LIMIT: u64 = 5_000_000;
const BUILD_TIME_LIMIT_SECS: f64 = 300.0;
const DEPENDENCY_LIMIT: usize = 50;

/// Evaluate every gate.
pub fn evaluate_all(sheet: &FactSheet, contract: &ContractFacts) -> BTreeMap<Gate, GateResult> {
    BTreeMap::from([
        (Gate::Security, evaluate_security(&sheet.security)),
        (Gate::Stability, evaluate_stability(&sheet.stability)),
        (Gate::Performance, evaluate_performance(&sheet.performance)),
        (Gate::Contract, evaluate_contract(contract)),
        (Gate::Deployment, evaluate_deployment(&sheet.deployment)),
    ])
}

/// Collects checks and the message to report for each unmet one.
#[derive(Default)]
struct Checklist {
    checks: BTreeMap<String, CheckValue>,
    unmet: Vec<String>,
}

impl Checklist {
    fn flag(&mut self, name: &str, value: bool, unmet: &str) -> bool {
        self.checks.insert(name.to_string(), CheckValue::Flag(value));
        if !value {
            self.unmet.push(unmet.to_string());
        }
        value
    }

    fn number(&mut self, name: &str, value: f64) {
        self.checks.insert(name.to_string(), CheckValue::Number(value));
    }

    fn note(&mut self, issue: String) {
        self.unmet.push(issue);
    }

    fn finish(self, gate: Gate, score: f64) -> GateResult {
        let score = score.clamp(0.0, 100.0);
        let passed = score >= gate.pass_threshold();
        GateResult {
            score,
            passed,
            checks: self.checks,
            issues: if passed { Vec::new() } else { self.unmet },
        }
    }
}

pub fn evaluate_security(facts: &SecurityFacts) -> GateResult {
    let mut list = Checklist::default();
    let zero_vulnerabilities = facts.vulnerability_count == Some(0);

    let flags = [
        list.flag(
            "security_policy",
            facts.security_policy,
            "No security policy (SECURITY.md)",
        ),
        list.flag(
            "safe_ignore_rules",
            facts.safe_ignore_rules,
            "Ignore rules do not exclude environment files",
        ),
        list.flag(
            "secrets_example",
            facts.secrets_example,
            "No secrets example file (.env.example)",
        ),
        list.flag(
            "no_hardcoded_secrets",
            facts.no_hardcoded_secrets,
            "Hardcoded secrets detected in source",
        ),
        list.flag(
            "zero_vulnerabilities",
            zero_vulnerabilities,
            "Dependency audit not clean",
        ),
        list.flag(
            "https_enforced",
            facts.https_enforced,
            "HTTPS is not enforced",
        ),
        list.flag("auth_present", facts.auth_present, "No authentication layer"),
    ];

    let vulnerabilities = facts.vulnerability_count.unwrap_or(0);
    list.number("vulnerability_count", f64::from(vulnerabilities));
    match facts.vulnerability_count {
        Some(0) => {}
        Some(count) => list.note(format!("{count} known vulnerabilities")),
        None => list.note("No dependency audit result available".to_string()),
    }

    let passed = flags.iter().filter(|v| **v).count() as f64;
    let base = passed * 100.0 / flags.len() as f64;
    let penalty =
        (f64::from(vulnerabilities) * VULNERABILITY_PENALTY).min(MAX_VULNERABILITY_PENALTY);

    list.finish(Gate::Security, (base - penalty).max(0.0))
}

pub fn evaluate_stability(facts: &StabilityFacts) -> GateResult {
    let mut list = Checklist::default();
    let mut score = 0.0;

    if list.flag("stable_tag", facts.stable_tag, "HEAD is not a tagged release") {
        score += 20.0;
    }
    if list.flag("tests_exist", facts.tests_exist, "No tests found") {
        score += 15.0;
    }
    let coverage = facts.test_coverage.clamp(0.0, 100.0);
    list.number("test_coverage", coverage);
    score += coverage.min(20.0);
    if coverage < 20.0 {
        list.note(format!("Test coverage {coverage:.1}% is below 20%"));
    }
    if list.flag("build_passes", facts.build_passes, "Build is not passing") {
        score += 15.0;
    }
    if list.flag(
        "error_handling",
        facts.error_handling,
        "No error handling found",
    ) {
        score += 10.0;
    }
    if list.flag(
        "rollback_capability",
        facts.rollback_capability,
        "No rollback script",
    ) {
        score += 10.0;
    }
    if list.flag(
        "health_endpoint",
        facts.health_endpoint,
        "No health endpoint",
    ) {
        score += 10.0;
    }

    list.finish(Gate::Stability, score.min(100.0))
}

pub fn evaluate_contract(facts: &ContractFacts) -> GateResult {
    let mut list = Checklist::default();
    let mut score = 0.0;

    if list.flag("has_contract", facts.has_contract, "No contract document") {
        score += 30.0;
    }
    if list.flag("is_valid", facts.is_valid, "Contract document is not valid") {
        score += 25.0;
    }
    let compatibility = facts.compatibility_score.clamp(0.0, 100.0);
    list.number("compatibility_score", compatibility);
    score += compatibility.min(25.0);
    if compatibility < 25.0 {
        list.note(format!("Compatibility score {compatibility:.1} is below 25"));
    }
    if list.flag(
        "has_version",
        facts.has_version,
        "Contract does not declare a version",
    ) {
        score += 10.0;
    }
    list.number("breaking_changes", facts.breaking_changes as f64);
    if facts.breaking_changes == 0 {
        score += 10.0;
    } else {
        list.note(format!("{} breaking changes", facts.breaking_changes));
    }

    list.finish(Gate::Contract, score)
}

pub fn evaluate_deployment(facts: &DeploymentFacts) -> GateResult {
    let mut list = Checklist::default();

    let flags = [
        list.flag(
            "package_manifest",
            facts.package_manifest,
            "No package manifest",
        ),
        list.flag("build_script", facts.build_script, "No build script"),
        list.flag("start_script", facts.start_script, "No start script"),
        list.flag(
            "deployment_config",
            facts.deployment_config,
            "No deployment configuration",
        ),
        list.flag("env_config", facts.env_config, "No environment configuration"),
        list.flag(
            "health_check_script",
            facts.health_check_script,
            "No health-check script",
        ),
        list.flag(
            "production_ready",
            facts.production_ready,
            "No production configuration",
        ),
    ];

    let passed = flags.iter().filter(|v| **v).count() as f64;
    list.finish(Gate::Deployment, passed * 100.0 / flags.len() as f64)
}

pub fn evaluate_performance(facts: &PerformanceFacts) -> GateResult {
    let mut list = Checklist::default();
    let mut score = PERFORMANCE_BASE;

    list.number("bundle_size_bytes", facts.bundle_size_bytes as f64);
    list.number("build_time_secs", facts.build_time_secs);
    list.number("dependency_count", facts.dependency_count as f64);

    if facts.bundle_size_bytes > BUNDLE_SIZE_LIMIT {
        score -= 15.0;
        list.note(format!(
            "Bundle size {} bytes exceeds {BUNDLE_SIZE_LIMIT}",
            facts.bundle_size_bytes
        ));
    }
    if facts.build_time_secs > BUILD_TIME_LIMIT_SECS {
        score -= 10.0;
        list.note(format!(
            "Build time {:.0}s exceeds {BUILD_TIME_LIMIT_SECS:.0}s",
            facts.build_time_secs
        ));
    }
    if facts.dependency_count > DEPENDENCY_LIMIT {
        score -= 5.0;
        list.note(format!(
            "{} dependencies exceeds {DEPENDENCY_LIMIT}",
            facts.dependency_count
        ));
    }

    list.finish(Gate::Performance, score.max(0.0))
}
