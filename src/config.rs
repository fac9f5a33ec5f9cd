//! Layered configuration.
//!
//! Values are merged with `figment`, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file: `--config PATH`, or `config.toml` in the platform config
//!    directory when it exists
//! 3. Environment variables prefixed `TREESUM_` (e.g. `TREESUM_WORKERS=4`)
//! 4. Command-line flags, applied by the caller before [`Config::validate`]

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::engine::{
    GenerateConfig, RunMode, DEFAULT_BYTE_PROGRESS_INTERVAL, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_SANITY_EPOCH, DEFAULT_WRITE_FREQUENCY,
};
use crate::output::DEFAULT_SCRIPT_NAME;
use crate::scanner::{Algorithm, DEFAULT_EXCLUDED_DIRS};

/// Prefix of environment variables read into [`Config`].
pub const ENV_PREFIX: &str = "TREESUM_";

/// Errors from loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Figment(#[from] figment::Error),

    /// A value is out of range.
    #[error("Invalid value for '{key}': {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Digest algorithm name for new manifests.
    pub algorithm: String,
    /// Worker count; `None` means one per logical CPU.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Records between manifest flushes.
    pub write_frequency: usize,
    /// Cached mtimes at or before this epoch never allow reuse.
    pub sanity_epoch: f64,
    /// Bytes between byte-progress events within a file.
    pub byte_progress_interval: u64,
    /// Directory names skipped during the walk.
    pub excluded_dirs: Vec<String>,
    /// Script written by `compare`.
    pub script_name: String,
    /// Bound of the results channel.
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default().name().to_string(),
            workers: None,
            write_frequency: DEFAULT_WRITE_FREQUENCY,
            sanity_epoch: DEFAULT_SANITY_EPOCH,
            byte_progress_interval: DEFAULT_BYTE_PROGRESS_INTERVAL,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| (*s).to_string()).collect(),
            script_name: DEFAULT_SCRIPT_NAME.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Load defaults, the config file and `TREESUM_*` variables.
    ///
    /// `path` names an explicit file, which must exist. Without it the
    /// platform default location is used if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit file is missing or any layer
    /// fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                log::debug!("Loading config from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = Self::default_path().filter(|p| p.is_file()) {
                    log::debug!("Loading config from {}", path.display());
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        Ok(config)
    }

    /// Platform location of `config.toml`, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "treesum").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check ranges and the algorithm name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.algorithm()?;
        if self.write_frequency == 0 {
            return Err(ConfigError::Invalid {
                key: "write_frequency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid {
                key: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "channel_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.byte_progress_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "byte_progress_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The configured algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown name.
    pub fn algorithm(&self) -> Result<Algorithm, ConfigError> {
        self.algorithm
            .parse()
            .map_err(|e: crate::scanner::hasher::UnknownAlgorithm| ConfigError::Invalid {
                key: "algorithm",
                reason: e.to_string(),
            })
    }

    /// Engine settings for a run in `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails.
    pub fn generate_config(&self, mode: RunMode) -> Result<GenerateConfig, ConfigError> {
        self.validate()?;
        let mut config = GenerateConfig::new(mode)
            .with_algorithm(self.algorithm()?)
            .with_write_frequency(self.write_frequency)
            .with_sanity_epoch(self.sanity_epoch)
            .with_byte_progress_interval(self.byte_progress_interval)
            .with_excluded_dirs(self.excluded_dirs.clone())
            .with_channel_capacity(self.channel_capacity);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        Ok(config)
    }
}
