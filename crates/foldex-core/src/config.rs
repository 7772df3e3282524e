//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Environment variable overriding [`VeeConfig::unread_expression`].
pub const UNREAD_EXPRESSION_ENV: &str = "FOLDEX_VFOLDER_UNREAD_EXP";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index database location; the front end picks a default when unset.
    pub database_path: Option<PathBuf>,
    /// Search settings.
    pub search: SearchConfig,
    /// Virtual folder settings.
    pub vfolder: VeeConfig,
}

/// Search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Treat bodies that are not cached locally as non-matching instead
    /// of fetching them.
    pub only_cached_messages: bool,
    /// Parsed expressions kept per searcher.
    pub expression_cache_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            only_cached_messages: false,
            expression_cache_size: 32,
        }
    }
}

/// Virtual folder settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeeConfig {
    /// Expressions that put a virtual folder into unread-aggregation
    /// mode, separated by `;`. Replaces the built-in list.
    pub unread_expression: Option<String>,
    /// Forces unread-aggregation mode on or off for every virtual folder.
    pub unread_mode: Option<bool>,
}

impl IndexConfig {
    /// Loads configuration from a JSON file, falling back to defaults if
    /// the file does not exist. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Writes configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Applies environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(expr) = std::env::var(UNREAD_EXPRESSION_ENV) {
            if !expr.trim().is_empty() {
                self.vfolder.unread_expression = Some(expr);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.search.expression_cache_size, 32);
        assert!(!config.search.only_cached_messages);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"search": {"only_cached_messages": true}}"#).unwrap();

        let config = IndexConfig::load(&path).unwrap();
        assert!(config.search.only_cached_messages);
        assert_eq!(config.search.expression_cache_size, 32);
        assert_eq!(config.vfolder.unread_mode, None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = IndexConfig::default();
        config.vfolder.unread_mode = Some(true);
        config.save(&path).unwrap();

        let loaded = IndexConfig::load(&path).unwrap();
        assert_eq!(loaded.vfolder.unread_mode, Some(true));
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(IndexConfig::load(&path), Err(Error::Config(_))));
    }
}
