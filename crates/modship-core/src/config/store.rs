//! Config store for locating and loading modship.toml layers.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use super::{CONFIG_FILE_NAME, ModshipConfig, merge::merge_layers, parser};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    user_path: Option<PathBuf>,
    repo_path: PathBuf,
}

impl ConfigStore {
    /// Store for the repository at `repo_root`, with the user layer under the
    /// platform config directory when one exists.
    pub fn for_repo(repo_root: &Path) -> Self {
        let user_dir = dirs::config_dir().map(|d| d.join("modship"));
        Self::from_paths(user_dir, repo_root)
    }

    pub fn from_paths(user_dir: Option<PathBuf>, repo_root: &Path) -> Self {
        Self {
            user_path: user_dir.map(|d| d.join(CONFIG_FILE_NAME)),
            repo_path: repo_root.join(CONFIG_FILE_NAME),
        }
    }

    pub fn user_path(&self) -> Option<&Path> {
        self.user_path.as_deref()
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Load and merge both layers. Missing files contribute nothing.
    pub fn load(&self) -> anyhow::Result<ModshipConfig> {
        let mut merged = toml::Table::new();
        let layers = self.user_path.iter().chain(std::iter::once(&self.repo_path));

        for path in layers {
            if !path.exists() {
                continue;
            }
            debug!(path = %path.display(), "loading config layer");
            merge_layers(&mut merged, parser::parse_table(path)?);
        }

        let config: ModshipConfig = toml::Value::Table(merged)
            .try_into()
            .context("Invalid merged configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Write the repository layer for the first time.
    pub fn init(&self, config: &ModshipConfig, force: bool) -> anyhow::Result<()> {
        if self.repo_path.exists() && !force {
            anyhow::bail!("Config file already exists: {}", self.repo_path.display());
        }
        self.save(config)
    }

    pub fn save(&self, config: &ModshipConfig) -> anyhow::Result<()> {
        config.validate()?;
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        std::fs::write(&self.repo_path, content).with_context(|| {
            format!("Failed to write config file: {}", self.repo_path.display())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_without_files_gives_defaults() {
        let repo = TempDir::new().unwrap();
        let store = ConfigStore::from_paths(None, repo.path());
        assert_eq!(store.load().unwrap(), ModshipConfig::default());
    }

    #[test]
    fn test_repo_layer_wins_over_user_layer() {
        let user = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::write(
            user.path().join(CONFIG_FILE_NAME),
            "[update]\nstop_on_error = true\ncommit_prefix = \"user\"\n",
        )
        .unwrap();
        std::fs::write(
            repo.path().join(CONFIG_FILE_NAME),
            "[update]\ncommit_prefix = \"repo\"\n",
        )
        .unwrap();

        let store = ConfigStore::from_paths(Some(user.path().to_path_buf()), repo.path());
        let config = store.load().unwrap();

        assert_eq!(config.update.commit_prefix, "repo");
        assert!(config.update.stop_on_error);
    }

    #[test]
    fn test_save_then_load() {
        let repo = TempDir::new().unwrap();
        let store = ConfigStore::from_paths(None, repo.path());
        let mut config = ModshipConfig::default();
        config.modules.paths = vec!["svc/a".to_string()];

        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_init_refuses_to_replace_without_force() {
        let repo = TempDir::new().unwrap();
        let store = ConfigStore::from_paths(None, repo.path());
        store.init(&ModshipConfig::default(), false).unwrap();

        let mut config = ModshipConfig::default();
        config.update.stop_on_error = true;
        let err = store.init(&config, false).unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
        assert!(!store.load().unwrap().update.stop_on_error);

        store.init(&config, true).unwrap();
        assert!(store.load().unwrap().update.stop_on_error);
    }

    #[test]
    fn test_save_rejects_invalid_config() {
        let repo = TempDir::new().unwrap();
        let store = ConfigStore::from_paths(None, repo.path());
        let mut config = ModshipConfig::default();
        config.modules.paths = vec!["/abs".to_string()];

        assert!(store.save(&config).is_err());
        assert!(!store.repo_path().exists());
    }

    #[test]
    fn test_load_reports_broken_layer() {
        let repo = TempDir::new().unwrap();
        std::fs::write(repo.path().join(CONFIG_FILE_NAME), "[update\n").unwrap();

        let store = ConfigStore::from_paths(None, repo.path());
        let err = format!("{:#}", store.load().unwrap_err());
        assert!(err.contains("modship.toml"), "{err}");
    }
}
