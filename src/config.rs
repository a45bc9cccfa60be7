//! Configuration parsing.
//!
//! Every section and field is optional; an empty file gives the defaults.
//!
//! ```toml
//! [module]
//! path = "assets/weph.wasm"
//! console = "stderr"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! output = "stderr"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::wasm::{ConsoleSink, DEFAULT_ARTIFACT_PATH, FileSource, HostOptions, ModuleLoader, WasmError};

/// Configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Module artifact and host settings.
    pub module: ModuleConfig,
    /// Subscriber settings for the CLI.
    pub logging: LoggingConfig,
}

/// Where the module comes from and how its console is handled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Path to the compiled module.
    pub path: PathBuf,
    /// Destination of the module's stdout and stderr.
    pub console: ConsoleSink,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            console: ConsoleSink::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `weph=debug,weph::guest=info`.
    pub level: String,
    pub format: LogFormat,
    /// `stdout`, `stderr` or a file path.
    pub output: String,
    /// ANSI colors, only applied when writing to a terminal.
    pub color: bool,
    /// Include the event target.
    pub target: bool,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: "stderr".to_string(),
            color: true,
            target: false,
            timestamps: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Host options for the module's imports.
    pub fn host_options(&self) -> HostOptions {
        HostOptions {
            console: self.module.console,
        }
    }

    /// A loader for the configured artifact.
    pub fn loader(&self) -> Result<ModuleLoader<FileSource>, WasmError> {
        ModuleLoader::with_options(FileSource::new(&self.module.path), self.host_options())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(content)?)
    }
}

/// Errors from loading the host configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read ephemeris host config at '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML is malformed or names an unknown setting value.
    #[error("Invalid ephemeris host config: {0}")]
    Invalid(#[from] toml::de::Error),
}
