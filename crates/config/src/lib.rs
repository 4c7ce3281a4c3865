//! Configuration for walletrace
//!
//! Settings are read from a single file, TOML or YAML by extension:
//!
//! ```toml
//! [dgraph]
//! cloud_endpoint = "https://example.cloud.dgraph.io"
//! key = "..."
//!
//! [scenario]            # optional
//! alias = "a"
//! deltas = [1.0, 2.0]
//! policy = "serialized" # or "unlocked"
//! ```
//!
//! Without an explicit path, `config.toml` in the working directory is
//! used, falling back to `config.yaml`.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walletrace_concurrency::LockPolicy;
use walletrace_core::{Alias, Balance, Error, Result};

/// Default configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Fallback when [`DEFAULT_CONFIG_FILE`] does not exist.
pub const FALLBACK_CONFIG_FILE: &str = "config.yaml";

/// File format, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.toml`
    Toml,
    /// `.yaml` or `.yml`
    Yaml,
}

impl Format {
    /// Format for `path`, if its extension is recognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "toml" => Some(Format::Toml),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }
}

/// Store endpoint and credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DgraphConfig {
    /// Endpoint address
    pub cloud_endpoint: String,
    /// Access credential; empty for a server without ACL
    #[serde(default)]
    pub key: String,
}

/// Scenario parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Record contended on
    pub alias: Alias,
    /// One participant per delta
    pub deltas: Vec<Balance>,
    /// Strategy
    pub policy: LockPolicy,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            alias: Alias::default(),
            deltas: vec![1.0, 2.0],
            policy: LockPolicy::default(),
        }
    }
}

/// Whole configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Store section
    pub dgraph: DgraphConfig,
    /// Scenario section
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl Config {
    /// Load from `path`, or from the default location if `None`.
    ///
    /// # Errors
    ///
    /// `ConfigLoad` if the file is missing, unreadable, malformed, or fails
    /// [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_path()?,
        };
        Self::load_file(&path)
    }

    /// Load and validate `path`.
    pub fn load_file(path: &Path) -> Result<Self> {
        let format = Format::from_path(path).ok_or_else(|| {
            Error::ConfigLoad(format!(
                "{}: unsupported extension (expected .toml, .yaml or .yml)",
                path.display()
            ))
        })?;
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&raw, format)
            .map_err(|e| e.context(format!("Unable to load {}", path.display())))?;
        debug!(path = %path.display(), endpoint = %config.dgraph.cloud_endpoint, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate `raw` in the given format.
    pub fn parse(raw: &str, format: Format) -> Result<Self> {
        let config: Config = match format {
            Format::Toml => toml::from_str(raw).map_err(|e| Error::ConfigLoad(e.to_string()))?,
            Format::Yaml => {
                serde_yaml::from_str(raw).map_err(|e| Error::ConfigLoad(e.to_string()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// `ConfigLoad` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("dgraph.cloud_endpoint", &self.dgraph.cloud_endpoint)?;
        require_non_empty("scenario.alias", self.scenario.alias.as_str())?;
        if self.scenario.deltas.is_empty() {
            return Err(Error::ConfigLoad(
                "scenario.deltas must name at least one delta".to_string(),
            ));
        }
        if let Some(bad) = self.scenario.deltas.iter().find(|d| !d.is_finite()) {
            return Err(Error::ConfigLoad(format!(
                "scenario.deltas contains non-finite value {}",
                bad
            )));
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::ConfigLoad(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Default configuration file in the working directory.
///
/// # Errors
///
/// `ConfigLoad` if neither candidate exists.
pub fn default_path() -> Result<PathBuf> {
    resolve_default(Path::new("."))
}

/// Default configuration file in `dir`.
pub fn resolve_default(dir: &Path) -> Result<PathBuf> {
    [DEFAULT_CONFIG_FILE, FALLBACK_CONFIG_FILE]
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            Error::ConfigLoad(format!(
                "no {} or {} in {}",
                DEFAULT_CONFIG_FILE,
                FALLBACK_CONFIG_FILE,
                dir.display()
            ))
        })
}
