//! Configuration for the node runtime
//!
//! This module handles runtime configuration including:
//! - Sandbox limits (fuel, memory, debug info)
//! - Logging (filter directives, optional rolling log files)
//! - Error sink sizing
//!
//! Configuration is stored as TOML. Every field has a default, so a partial
//! file (or none at all) is valid.
//!
//! # Example
//!
//! ```ignore
//! use nodegraph_rs::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load_or_default("nodegraph.toml");
//! let _guard = nodegraph_rs::config::init_logging(&config.logging)?;
//! ```

pub mod logging;

pub use logging::init_logging;

use crate::error::{Result, ResultExt, RuntimeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fuel granted to each sandbox call when fuel metering is enabled
pub const DEFAULT_FUEL_PER_INVOCATION: u64 = 10_000_000;

/// Default linear memory cap in 64 KiB wasm pages (16 MiB)
pub const DEFAULT_MAX_MEMORY_PAGES: u32 = 256;

/// Default tracing filter directives
pub const DEFAULT_LOG_FILTER: &str = "info,nodegraph_rs=debug";

/// Default rolling log file prefix
pub const DEFAULT_LOG_FILE_PREFIX: &str = "nodegraph.log";

/// Default number of faults buffered by an error sink
pub const DEFAULT_ERROR_SINK_CAPACITY: usize = 1024;

// ==================== Sandbox ====================

/// Limits applied to the WebAssembly sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Meter execution with fuel so runaway functions trap
    pub fuel_enabled: bool,

    /// Fuel refilled before every call
    pub fuel_per_invocation: u64,

    /// Maximum linear memory size in pages
    pub max_memory_pages: u32,

    /// Keep DWARF info for guest backtraces
    pub debug_info: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fuel_enabled: false,
            fuel_per_invocation: DEFAULT_FUEL_PER_INVOCATION,
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            debug_info: false,
        }
    }
}

impl SandboxConfig {
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel_enabled = true;
        self.fuel_per_invocation = fuel;
        self
    }

    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    /// Fuel to set before a call, if metering is on
    pub fn fuel(&self) -> Option<u64> {
        self.fuel_enabled.then_some(self.fuel_per_invocation)
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_pages as usize * 64 * 1024
    }
}

// ==================== Logging ====================

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set
    pub filter: String,

    /// Directory for daily-rolling log files; console only when unset
    pub log_dir: Option<PathBuf>,

    pub file_prefix: String,

    /// Colored console output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            ansi: true,
        }
    }
}

// ==================== Error Sink ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorSinkConfig {
    /// Faults buffered before new ones are dropped
    pub capacity: usize,
}

impl Default for ErrorSinkConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ERROR_SINK_CAPACITY,
        }
    }
}

// ==================== Runtime Config ====================

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
    pub errors: ErrorSinkConfig,
}

impl RuntimeConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RuntimeError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(RuntimeError::from)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&content)
    }

    /// Load configuration, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load runtime config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(RuntimeError::from)
                .context("Failed to create config directory")?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content)
            .map_err(RuntimeError::from)
            .context("Failed to write config file")
    }
}
