//! Configuration for stratum

use crate::StratumError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Stratum configuration

[store]
# Index database, relative to the repository root
path = ".stratum/index.db"

[extract]
# Files larger than this (bytes) are indexed with an empty symbol set
max_file_size = 1000000
"#;

/// Stratum configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

fn default_store_path() -> String {
    ".stratum/index.db".to_string()
}

pub(crate) fn default_max_file_size() -> usize {
    1_000_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| StratumError::ConfigParse(e.to_string()))
    }

    /// Absolute path of the index database under `repo_root`.
    pub fn db_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.store.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.store.path, ".stratum/index.db");
        assert_eq!(config.extract.max_file_size, 1_000_000);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.store.path, ".stratum/index.db");
        assert_eq!(config.extract.max_file_size, 1_000_000);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = Config::from_toml("[extract]\nmax_file_size = 42\n").unwrap();
        assert_eq!(config.extract.max_file_size, 42);
        assert_eq!(config.store.path, ".stratum/index.db");
    }

    #[test]
    fn test_db_path_joins_repo_root() {
        let config = Config::default();
        assert_eq!(
            config.db_path(Path::new("/repo")),
            PathBuf::from("/repo/.stratum/index.db")
        );
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        assert!(matches!(
            Config::from_toml("store = nonsense"),
            Err(StratumError::ConfigParse(_))
        ));
    }
}
