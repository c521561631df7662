use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PatchError, Result};

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "patchsmith.toml";

/// Defaults for the apply pipeline, loadable from `patchsmith.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Strip level to use when the command line does not give one;
    /// absent means estimate it from the patch.
    pub strip_level: Option<usize>,
    /// Silently strip trailing whitespace added by patches.
    pub drop_trailing_whitespace: bool,
    /// Save a copy of each target under this suffix before rewriting.
    pub backup_suffix: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strip_level: None,
            drop_trailing_whitespace: true,
            backup_suffix: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PatchError::io(format!("reading config from '{}'", path.display()), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PatchError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective config: an explicit path must exist, a
    /// `patchsmith.toml` in the working directory is used when present,
    /// otherwise the defaults apply.
    pub fn load_effective(explicit: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load(&local);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(suffix) = &self.backup_suffix {
            if suffix.is_empty() {
                return Err(PatchError::config("backup_suffix must not be empty"));
            }
            if suffix.contains('/') {
                return Err(PatchError::config("backup_suffix must not contain '/'"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.strip_level, None);
        assert!(config.drop_trailing_whitespace);
        assert!(config.backup_suffix.is_none());
    }

    #[test]
    fn loads_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patchsmith.toml");
        std::fs::write(&path, "strip_level = 1\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.strip_level, Some(1));
        assert!(config.drop_trailing_whitespace);
    }

    #[test]
    fn rejects_bad_backup_suffix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patchsmith.toml");
        std::fs::write(&path, "backup_suffix = \"\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let path = PathBuf::from("/nonexistent/patchsmith.toml");
        assert!(Config::load_effective(Some(&path)).is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config {
            strip_level: Some(2),
            drop_trailing_whitespace: false,
            backup_suffix: Some(".orig".to_string()),
        };
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
