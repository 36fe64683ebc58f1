use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ConversionOptions, DEFAULT_QUALITY};

/// Environment variable holding allowed root directories, in the platform's
/// path-list syntax (`:`-separated on Unix, `;` on Windows)
pub const ALLOWED_DIRS_ENV: &str = "WEBP_CONVERTER_ALLOWED_DIRS";

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration for the converter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories conversions may read from and write to. Empty means every
    /// path is allowed.
    pub allowed_roots: Vec<PathBuf>,

    /// Quality used when a request does not specify one (0-100)
    pub default_quality: u8,

    /// Lossless encoding unless a request says otherwise
    pub default_lossless: bool,

    /// Keep source files unless a request says otherwise
    pub default_keep_original: bool,

    /// Number of batch workers (0 = one per CPU, 1 = strictly sequential)
    pub workers: usize,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            default_quality: DEFAULT_QUALITY,
            default_lossless: false,
            default_keep_original: false,
            workers: 1,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Allowed roots from [`ALLOWED_DIRS_ENV`], `None` when unset or empty
    pub fn roots_from_env() -> Option<Vec<PathBuf>> {
        let value = std::env::var_os(ALLOWED_DIRS_ENV)?;
        let roots: Vec<PathBuf> = std::env::split_paths(&value)
            .filter(|path| !path.as_os_str().is_empty())
            .collect();

        if roots.is_empty() {
            None
        } else {
            Some(roots)
        }
    }

    /// Replace the allowed roots, keeping them unchanged when `roots` is empty
    pub fn with_roots(mut self, roots: Vec<PathBuf>) -> Self {
        if !roots.is_empty() {
            self.allowed_roots = roots;
        }
        self
    }

    /// Default conversion options for requests that omit them
    pub fn default_options(&self) -> ConversionOptions {
        ConversionOptions {
            quality: self.default_quality,
            lossless: self.default_lossless,
            keep_original: self.default_keep_original,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.default_quality > 100 {
            return Err(Error::Configuration(
                "Default quality must be between 0 and 100".to_string(),
            ));
        }

        for root in &self.allowed_roots {
            if !root.is_dir() {
                return Err(Error::Configuration(format!(
                    "Allowed root is not a directory: {}",
                    root.display()
                )));
            }
        }

        Ok(())
    }
}
