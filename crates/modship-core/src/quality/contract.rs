//! Contract compatibility between two versions of a module.
//!
//! [`HeuristicContractComparator`] is best-effort: it compares the set of
//! operations a JSON contract exposes and reports removed ones as breaking.
//! It does not understand schemas, so field-level changes go unnoticed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractComparison {
    pub is_valid: bool,
    /// 0-100, share of the previous contract still offered.
    pub compatibility_score: f64,
    pub breaking_changes: Vec<String>,
}

impl ContractComparison {
    fn invalid(breaking_changes: Vec<String>) -> Self {
        Self {
            is_valid: false,
            compatibility_score: 0.0,
            breaking_changes,
        }
    }

    fn identical() -> Self {
        Self {
            is_valid: true,
            compatibility_score: 100.0,
            breaking_changes: Vec::new(),
        }
    }
}

pub trait ContractComparator {
    /// Compare the `current` contract text against `baseline`.
    fn compare(&self, baseline: Option<&str>, current: Option<&str>) -> ContractComparison;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicContractComparator;

impl ContractComparator for HeuristicContractComparator {
    fn compare(&self, baseline: Option<&str>, current: Option<&str>) -> ContractComparison {
        let Some(current) = current else {
            let breaking = match baseline {
                Some(_) => vec!["contract document removed".to_string()],
                None => Vec::new(),
            };
            return ContractComparison::invalid(breaking);
        };

        let Ok(current_doc) = serde_json::from_str::<Value>(current) else {
            return ContractComparison::invalid(Vec::new());
        };

        let Some(baseline) = baseline else {
            return ContractComparison::identical();
        };
        if blake3::hash(baseline.as_bytes()) == blake3::hash(current.as_bytes()) {
            return ContractComparison::identical();
        }
        // A baseline that never parsed offers nothing to break.
        let Ok(baseline_doc) = serde_json::from_str::<Value>(baseline) else {
            return ContractComparison::identical();
        };

        let before = operations(&baseline_doc);
        let after = operations(&current_doc);
        let removed: Vec<String> = before
            .difference(&after)
            .map(|op| format!("removed {op}"))
            .collect();

        let compatibility_score = if before.is_empty() {
            100.0
        } else {
            let retained = before.len() - removed.len();
            retained as f64 * 100.0 / before.len() as f64
        };

        ContractComparison {
            is_valid: true,
            compatibility_score,
            breaking_changes: removed,
        }
    }
}

/// Operations a contract exposes: `METHOD /path` for OpenAPI-style `paths`,
/// otherwise the top-level keys other than metadata.
fn operations(doc: &Value) -> BTreeSet<String> {
    let mut ops = BTreeSet::new();

    if let Some(paths) = doc.get("paths").and_then(Value::as_object) {
        for (path, item) in paths {
            let methods: Vec<&str> = item
                .as_object()
                .map(|obj| {
                    obj.keys()
                        .map(String::as_str)
                        .filter(|k| HTTP_METHODS.contains(&k.to_ascii_lowercase().as_str()))
                        .collect()
                })
                .unwrap_or_default();
            if methods.is_empty() {
                ops.insert(path.clone());
            }
            for method in methods {
                ops.insert(format!("{} {path}", method.to_ascii_uppercase()));
            }
        }
        return ops;
    }

    if let Some(obj) = doc.as_object() {
        for key in obj.keys() {
            if !matches!(key.as_str(), "version" | "info" | "openapi" | "swagger" | "name") {
                ops.insert(key.clone());
            }
        }
    }
    ops
}

/// True when a JSON contract declares a version at the top level or under
/// `info.version`.
pub fn declares_version(content: &str) -> bool {
    let Ok(doc) = serde_json::from_str::<Value>(content) else {
        return false;
    };
    let top = doc.get("version");
    let info = doc.get("info").and_then(|i| i.get("version"));
    top.or(info)
        .and_then(Value::as_str)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}
