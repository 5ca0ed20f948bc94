use crate::diff::MAX_DIFF_BYTES;
use crate::error::Result;
use crate::integrity::{Schema, DEFAULT_MIRROR_DIR};
use crate::paginator::DEFAULT_COMMITS_PER_PAGE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const STATE_DIR: &str = ".rewind";
pub const CONFIG_FILE: &str = "config.toml";
pub const DATABASE_FILE: &str = "rewind.db";

/// Directory holding the database, config and lock of the repository at `root`.
pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn database_path(root: &Path) -> PathBuf {
    state_dir(root).join(DATABASE_FILE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory of the tracked tree that mirrors database rows.
    pub mirror_dir: String,
    pub history: HistoryConfig,
    pub diff: DiffConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub commits_per_page: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub require_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirror_dir: DEFAULT_MIRROR_DIR.to_string(),
            history: HistoryConfig::default(),
            diff: DiffConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            commits_per_page: DEFAULT_COMMITS_PER_PAGE,
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_bytes: MAX_DIFF_BYTES,
        }
    }
}

impl Config {
    /// Reads `<root>/.rewind/config.toml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = state_dir(root).join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let dir = state_dir(root);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(CONFIG_FILE), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn schema(&self) -> Schema {
        Schema::wordpress(self.mirror_dir.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.history.commits_per_page, 25);
        assert_eq!(config.diff.max_bytes, 50 * 1024);
        assert!(!config.api.require_auth);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(state_dir(dir.path())).unwrap();
        fs::write(
            state_dir(dir.path()).join(CONFIG_FILE),
            "mirror_dir = \"data\"\n\n[api]\nrequire_auth = true\ntoken = \"s3cret\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.mirror_dir, "data");
        assert!(config.api.require_auth);
        assert_eq!(config.api.token.as_deref(), Some("s3cret"));
        assert_eq!(config.history.commits_per_page, DEFAULT_COMMITS_PER_PAGE);
        assert_eq!(config.schema().mirror_dir(), "data");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.history.commits_per_page = 10;
        config.save(dir.path()).unwrap();

        assert_eq!(Config::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(state_dir(dir.path())).unwrap();
        fs::write(state_dir(dir.path()).join(CONFIG_FILE), "mirror_dir = [").unwrap();

        assert!(matches!(
            Config::load(dir.path()),
            Err(crate::Error::TomlDe(_))
        ));
    }
}
