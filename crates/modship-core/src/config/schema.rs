//! Configuration schema for modship.toml

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::quality::probe::ProbeSettings;
use crate::types::ModuleId;
use crate::update::UpdateSettings;

/// Root configuration structure for modship.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModshipConfig {
    #[serde(default)]
    pub update: UpdateSection,

    #[serde(default)]
    pub facts: FactsSection,

    #[serde(default)]
    pub contract: ContractSection,

    #[serde(default)]
    pub modules: ModulesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSection {
    /// Default for `batch` when `--stop-on-error` is not given
    #[serde(default)]
    pub stop_on_error: bool,

    /// First token of the parent commit subject
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            commit_prefix: default_commit_prefix(),
        }
    }
}

/// Where the facts probe reads recorded measurements and reports,
/// relative to each module root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactsSection {
    #[serde(default = "default_overlay")]
    pub overlay: PathBuf,

    #[serde(default = "default_audit_report")]
    pub audit_report: PathBuf,

    #[serde(default = "default_coverage_report")]
    pub coverage_report: PathBuf,

    #[serde(default = "default_bundle_dirs")]
    pub bundle_dirs: Vec<PathBuf>,
}

impl Default for FactsSection {
    fn default() -> Self {
        Self {
            overlay: default_overlay(),
            audit_report: default_audit_report(),
            coverage_report: default_coverage_report(),
            bundle_dirs: default_bundle_dirs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractSection {
    /// Candidate contract documents, first match wins
    #[serde(default = "default_contract_files")]
    pub files: Vec<PathBuf>,
}

impl Default for ContractSection {
    fn default() -> Self {
        Self {
            files: default_contract_files(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModulesSection {
    /// Known module paths, relative to the repository root
    #[serde(default)]
    pub paths: Vec<String>,
}

fn default_commit_prefix() -> String {
    crate::update::UpdateSettings::default().commit_prefix
}

fn default_overlay() -> PathBuf {
    ProbeSettings::default().overlay
}

fn default_audit_report() -> PathBuf {
    ProbeSettings::default().audit_report
}

fn default_coverage_report() -> PathBuf {
    ProbeSettings::default().coverage_report
}

fn default_bundle_dirs() -> Vec<PathBuf> {
    ProbeSettings::default().bundle_dirs
}

fn default_contract_files() -> Vec<PathBuf> {
    ProbeSettings::default().contract_files
}

impl ModshipConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.update.commit_prefix.trim().is_empty() {
            anyhow::bail!("update.commit_prefix must not be empty");
        }
        if self.contract.files.is_empty() {
            anyhow::bail!("contract.files must list at least one candidate");
        }
        for path in self.contract.files.iter().chain(&self.facts.bundle_dirs) {
            if path.is_absolute() {
                anyhow::bail!(
                    "Paths are resolved per module and must be relative: {}",
                    path.display()
                );
            }
        }
        self.module_ids()?;
        Ok(())
    }

    /// Configured modules as validated identifiers.
    pub fn module_ids(&self) -> anyhow::Result<Vec<ModuleId>> {
        self.modules
            .paths
            .iter()
            .map(|p| {
                ModuleId::new(p.as_str()).with_context(|| format!("Invalid module path '{p}'"))
            })
            .collect()
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            overlay: self.facts.overlay.clone(),
            audit_report: self.facts.audit_report.clone(),
            coverage_report: self.facts.coverage_report.clone(),
            bundle_dirs: self.facts.bundle_dirs.clone(),
            contract_files: self.contract.files.clone(),
        }
    }

    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            commit_prefix: self.update.commit_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ModshipConfig::new();
        assert!(!config.update.stop_on_error);
        assert_eq!(config.update.commit_prefix, "chore(modules)");
        assert_eq!(config.facts.overlay, PathBuf::from(".modship/facts.toml"));
        assert_eq!(config.contract.files.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_absolute_paths() {
        let mut config = ModshipConfig::new();
        config.facts.bundle_dirs = vec![PathBuf::from("/tmp/dist")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_module_paths() {
        let mut config = ModshipConfig::new();
        config.modules.paths = vec!["services/auth".to_string(), "../escape".to_string()];
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("../escape"));
    }

    #[test]
    fn test_probe_settings_carry_contract_files() {
        let mut config = ModshipConfig::new();
        config.contract.files = vec![PathBuf::from("spec/api.json")];
        let settings = config.probe_settings();
        assert_eq!(settings.contract_files, vec![PathBuf::from("spec/api.json")]);
    }
}
