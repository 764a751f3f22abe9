//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::ListSort;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub list: ListConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,

    /// How long a command waits on a lock held by another invocation
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Search defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

/// Listing defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_list_limit")]
    pub default_limit: usize,

    #[serde(default)]
    pub default_sort: ListSort,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/llm-archive/archive.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_search_limit() -> usize {
    20
}

fn default_list_limit() -> usize {
    50
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: default_list_limit(),
            default_sort: ListSort::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./llm-archive.yaml (current directory)
    /// 3. ~/.config/llm-archive/llm-archive.yaml
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut search_paths = vec![];
        if let Some(path) = path {
            let explicit = shellexpand::tilde(path).to_string();
            if !Path::new(&explicit).exists() {
                anyhow::bail!("config file not found: {}", explicit);
            }
            search_paths.push(explicit);
        }
        search_paths.push("llm-archive.yaml".to_string());
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(
                config_dir
                    .join("llm-archive/llm-archive.yaml")
                    .to_string_lossy()
                    .to_string(),
            );
        }

        for search_path in &search_paths {
            if Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("Failed to read config {}", search_path))?;
                let config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse config {}", search_path))?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.list.default_limit, 50);
        assert_eq!(config.list.default_sort, ListSort::Newest);
        assert_eq!(config.busy_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
database:
  path: ~/archives/llm.db
  busy_timeout_ms: 250

search:
  default_limit: 5

list:
  default_sort: messages
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.path, "~/archives/llm.db");
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.search.default_limit, 5);
        assert_eq!(config.list.default_limit, 50);
        assert_eq!(config.list.default_sort, ListSort::Messages);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        assert!(Config::load(Some("/nonexistent/llm-archive.yaml")).is_err());
    }
}
