//! Named pointers shared with the managed runtime.

use std::sync::Mutex;

use rustc_hash::FxHashMap;

use crate::config::HostConfig;
use crate::logging::LogLevel;
use crate::sync::lock;

/// Export name under which the host publishes its [`ExportedConfig`].
pub const CONFIG_EXPORT: &str = "Config";

/// Table of addresses the managed side can look up by name.
///
/// Addresses are stored as `u64` and never dereferenced by the table.
/// Whoever publishes an address keeps the pointee alive for as long as the
/// host context lives.
#[derive(Default)]
pub struct ExportTable {
    entries: Mutex<FxHashMap<String, u64>>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish or replace an address.
    pub fn set(&self, name: impl Into<String>, address: u64) {
        let name = name.into();
        tracing::debug!("Export '{}' = {:#x}", name, address);
        lock(&self.entries).insert(name, address);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        lock(&self.entries).get(name).copied()
    }

    /// Exported names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.entries).keys().cloned().collect();
        names.sort();
        names
    }
}

/// C view of the host config published as `"Config"`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportedConfig {
    /// Minimum log level, as [`LogLevel`] discriminant.
    pub log_level: u32,
    /// Whether log output is mirrored to a console.
    pub console: bool,
    /// Number of modules named in the autoload list.
    pub autoload_count: u32,
}

impl From<&HostConfig> for ExportedConfig {
    fn from(config: &HostConfig) -> Self {
        let level = config.log.level().unwrap_or(LogLevel::Info);
        Self {
            log_level: level as u32,
            console: config.log.console,
            autoload_count: config.modules.autoload.len() as u32,
        }
    }
}
