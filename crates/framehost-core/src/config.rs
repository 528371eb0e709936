//! Host configuration.
//!
//! Read from a JSON file. Every field has a default, so an empty object
//! (or a missing file, via [`HostConfig::load_or_default`]) is a valid
//! configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::LogLevel;

/// Default name of the config file next to the host.
pub const DEFAULT_CONFIG_FILE: &str = "framehost.json";

/// Top-level host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub log: LogConfig,
    pub modules: ModulesConfig,
    pub runtime: RuntimeConfig,
    pub bootstrap: BootstrapConfig,
}

impl HostConfig {
    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Config(message) => Error::Config(format!("{}: {}", path.display(), message)),
            other => other,
        })
    }

    /// Parse a config file, or return defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.log.level()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level: trace, debug, info, warn or error.
    pub level: String,
    /// Log file, truncated at start-up. `null` disables file output.
    pub file: Option<PathBuf>,
    /// Mirror log output to the console.
    pub console: bool,
}

impl LogConfig {
    pub fn level(&self) -> Result<LogLevel> {
        self.level.parse()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("framehost.log")),
            console: true,
        }
    }
}

/// Modules loaded at start-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Modules loaded first, in order.
    pub autoload: Vec<PathBuf>,
    /// Directory scanned for further modules.
    pub directory: Option<PathBuf>,
    /// File extension of modules in `directory`. Defaults to the platform's
    /// shared library extension.
    pub extension: Option<String>,
}

impl ModulesConfig {
    /// Every module to load at start-up: `autoload` entries, then matching
    /// files in `directory` sorted by name. Duplicates are dropped.
    pub fn module_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = self.autoload.clone();

        if let Some(dir) = &self.directory {
            let extension = self
                .extension
                .as_deref()
                .unwrap_or(std::env::consts::DLL_EXTENSION);

            let mut found: Vec<PathBuf> = fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .filter(|path| path.extension().is_some_and(|ext| ext == extension))
                .collect();
            found.sort();

            for path in found {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }

        Ok(paths)
    }
}

/// Managed runtime bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime library. `null` runs without a managed runtime.
    pub library: Option<PathBuf>,
}

/// Bootstrap payload materialized on start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// File the payload is read from. `null` skips materialization.
    pub source: Option<PathBuf>,
    /// Fixed file name the payload is written to.
    pub target: PathBuf,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            source: None,
            target: PathBuf::from("framehost.bootstrap"),
        }
    }
}
