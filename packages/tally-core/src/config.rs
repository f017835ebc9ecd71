//! Configuration loaded from TOML with environment overrides.
//!
//! Lookup order: `$TALLY_CONFIG`, then `<config dir>/tally/config.toml`. A
//! missing file means defaults. `$TALLY_DATA_DIR` overrides `data_dir`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for the risk calculator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskSettings {
    /// Confidence level for both VaR figures
    pub confidence: f64,
    /// Monte Carlo draws
    pub simulations: usize,
    /// Accepted for Monte Carlo VaR but not applied to the simulation
    pub horizon_days: u32,
    /// Fixed RNG seed for reproducible Monte Carlo runs
    pub seed: Option<u64>,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            confidence: 0.95,
            simulations: 10_000,
            horizon_days: 1,
            seed: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`
    pub database_file: String,
    /// Client-side timeout for a single market-data request
    pub fetch_timeout_secs: u64,
    /// How long a writer waits for another process's lock
    pub busy_timeout_ms: u64,
    /// Period used by `collect` when none is given
    pub default_period: String,
    pub risk: RiskSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: "tally.db".to_string(),
            fetch_timeout_secs: 30,
            busy_timeout_ms: 5_000,
            default_period: "1y".to_string(),
            risk: RiskSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a specific file; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            toml::from_str::<Config>(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Config::default()
        };

        if let Ok(dir) = env::var("TALLY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Can be overridden with the `TALLY_CONFIG` environment variable.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("TALLY_CONFIG") {
            return PathBuf::from(path);
        }

        directories::ProjectDirs::from("", "", "tally")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("tally.toml"))
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    fn validate(&self) -> Result<()> {
        let confidence = self.risk.confidence;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(Error::Config(format!(
                "risk.confidence must be between 0 and 1, got {}",
                confidence
            )));
        }
        if self.risk.simulations < 2 {
            return Err(Error::Config(
                "risk.simulations must be at least 2".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(Error::Config(
                "fetch_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tally")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database_file, "tally.db");
        assert_eq!(config.risk.confidence, 0.95);
        assert_eq!(config.risk.simulations, 10_000);
        assert_eq!(config.risk.horizon_days, 1);
        assert!(config.risk.seed.is_none());
        assert!(config.database_path().ends_with("tally.db"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
fetch_timeout_secs = 10

[risk]
seed = 42
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.risk.seed, Some(42));
        assert_eq!(config.risk.confidence, 0.95);
        assert_eq!(config.default_period, "1y");
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[risk]\nconfidence = 1.5\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "fetch_timeout_secs = \"soon\"").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
