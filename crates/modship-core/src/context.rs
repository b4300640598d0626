//! Wiring of the concrete collaborators for a repository on disk.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::batch::BatchOptions;
use crate::config::{ConfigStore, ModshipConfig};
use crate::error::ValidationError;
use crate::quality::{FsFactProbe, HeuristicContractComparator, QualityEngine};
use crate::repo::GitWorkspace;
use crate::types::ModuleId;
use crate::update::UpdateStateMachine;

/// A parent repository together with its effective configuration.
#[derive(Debug, Clone)]
pub struct AppContext {
    root: PathBuf,
    config: ModshipConfig,
}

impl AppContext {
    /// Load configuration for the repository at `root`.
    pub fn from_root(root: &Path) -> anyhow::Result<Self> {
        let config = ConfigStore::for_repo(root)
            .load()
            .with_context(|| format!("Failed to load configuration for {}", root.display()))?;
        Ok(Self::with_config(root, config))
    }

    pub fn with_config(root: &Path, config: ModshipConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ModshipConfig {
        &self.config
    }

    /// Batch options from configuration, with `stop_on_error` forced on when
    /// the caller asks for it.
    pub fn batch_options(&self, stop_on_error: bool) -> BatchOptions {
        BatchOptions {
            stop_on_error: stop_on_error || self.config.update.stop_on_error,
        }
    }

    /// The module named on the command line, or every configured module.
    pub fn modules(&self, explicit: Option<&str>) -> anyhow::Result<Vec<ModuleId>> {
        if let Some(module) = explicit {
            return Ok(vec![ModuleId::new(module)?]);
        }
        let configured = self.config.module_ids()?;
        if configured.is_empty() {
            return Err(ValidationError::InvalidRequest {
                reason: "no module given and [modules] paths is empty".to_string(),
            }
            .into());
        }
        Ok(configured)
    }

    /// A state machine over the git workspace at the root.
    pub fn state_machine(&self) -> anyhow::Result<UpdateStateMachine> {
        let workspace = GitWorkspace::open(&self.root)
            .with_context(|| format!("Not a git repository: {}", self.root.display()))?;
        let quality = QualityEngine::new(
            Box::new(FsFactProbe::new(self.config.probe_settings())),
            Box::new(HeuristicContractComparator),
        );
        Ok(UpdateStateMachine::new(
            Box::new(workspace),
            quality,
            self.config.update_settings(),
        ))
    }
}
