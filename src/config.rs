//! Configuration for chapter-sync.
//!
//! Handles loading, validating, and merging `chapter-sync.toml`. The user file
//! is sparse: it is merged over the stock defaults with [`merge_toml`], so it
//! only needs the keys it wants to change, plus the series to follow.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options except [[series]] are optional - defaults shown below
//!
//! library = "library"          # Root directory for published archives
//!
//! [processing]
//! max_workers = 4              # Chapters fetched at once (omit for auto = CPU cores)
//!
//! [retry]
//! max_attempts = 3             # Retries after the first attempt, transient faults only
//! initial_delay_ms = 500
//! max_delay_ms = 10000
//! backoff_multiplier = 2.0
//! jitter = true
//!
//! [http]
//! user_agent = "chapter-sync/0.4.0"
//! timeout_secs = 30
//!
//! [[series]]
//! location = "https://comics.example/dd/series.json"
//! provider = "manifest"        # or "directory"
//! directory = "Dungeon Diary"  # Library subdirectory (default: series title)
//!
//! [series.overrides]           # Chapter id -> corrected number
//! "c-0099" = 12.5
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::executor::default_workers;
use crate::provider::{HttpSettings, ProviderKind};
use crate::retry::RetryPolicy;
use crate::sync::SeriesTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "chapter-sync.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration loaded from `chapter-sync.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Root directory holding one subdirectory per series.
    pub library: PathBuf,
    pub processing: ProcessingConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    /// Series to synchronize, in order.
    pub series: Vec<SeriesConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            library: PathBuf::from("library"),
            processing: ProcessingConfig::default(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            series: Vec::new(),
        }
    }
}

/// Upper bound for `retry.backoff_multiplier`.
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

impl SyncConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.retry.backoff_multiplier) {
            return Err(ConfigError::Validation(format!(
                "retry.backoff_multiplier must be between 1.0 and {MAX_BACKOFF_MULTIPLIER}"
            )));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Validation(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "http.timeout_secs must be at least 1".into(),
            ));
        }
        for (i, series) in self.series.iter().enumerate() {
            series
                .validate()
                .map_err(|msg| ConfigError::Validation(format!("series[{i}]: {msg}")))?;
        }
        Ok(())
    }
}

/// Parallel fetch settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of chapters fetched concurrently.
    /// When absent, defaults to the number of CPU cores.
    pub max_workers: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `n` as given; the work is network-bound, so going above
///   the core count is allowed
pub fn effective_workers(config: &ProcessingConfig) -> usize {
    config.max_workers.unwrap_or_else(default_workers)
}

/// Backoff for transient provider faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Randomly stretch each delay by up to 100%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

/// Settings for network-backed providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("chapter-sync/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// One `[[series]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeriesConfig {
    /// URL or path, depending on the provider.
    pub location: String,
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    /// Library subdirectory name. Defaults to the series title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Chapter id → corrected chapter number.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, f64>,
}

fn default_provider() -> ProviderKind {
    ProviderKind::Manifest
}

impl SeriesConfig {
    fn validate(&self) -> Result<(), String> {
        if self.location.trim().is_empty() {
            return Err("location must not be empty".into());
        }
        if let Some(dir) = &self.directory
            && (dir.trim().is_empty()
                || dir.contains(['/', '\\'])
                || dir == "."
                || dir == "..")
        {
            return Err(format!(
                "directory {dir:?} must be a single, non-empty path component"
            ));
        }
        if let Some((id, n)) = self.overrides.iter().find(|(_, n)| !n.is_finite()) {
            return Err(format!("override for {id:?} is not a finite number: {n}"));
        }
        Ok(())
    }

    pub fn target(&self) -> SeriesTarget {
        SeriesTarget {
            location: self.location.clone(),
            directory: self.directory.clone(),
            overrides: self.overrides.clone(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SyncConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely; this includes
///   arrays, so a user `[[series]]` list replaces the (empty) stock one.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SyncConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SyncConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    let config = resolve_config(base, overlay)?;
    tracing::debug!(path = %path.display(), series = config.series.len(), "config loaded");
    Ok(config)
}

/// Returns a fully-commented stock `chapter-sync.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# chapter-sync configuration
# ==========================
# All settings except [[series]] are optional. Values shown are the defaults.
# Unknown keys will cause an error.

# Root directory for published archives. Each series gets a subdirectory.
library = "library"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of chapters fetched and written at the same time.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_workers = 4

# ---------------------------------------------------------------------------
# Retry
# ---------------------------------------------------------------------------
[retry]
# Retries after the first attempt. Only transient faults (timeouts, rate
# limiting, server errors) are retried; 0 disables retrying.
max_attempts = 3

# Delay before the first retry, doubled (see backoff_multiplier) on each
# further retry and capped at max_delay_ms. backoff_multiplier is 1.0 to 10.0.
initial_delay_ms = 500
max_delay_ms = 10000
backoff_multiplier = 2.0

# Randomly stretch each delay by up to 100% so parallel workers don't retry
# in lockstep.
jitter = true

# ---------------------------------------------------------------------------
# HTTP (manifest provider)
# ---------------------------------------------------------------------------
[http]
# user_agent = "chapter-sync/<version>"
timeout_secs = 30

# ---------------------------------------------------------------------------
# Series
# ---------------------------------------------------------------------------
# One [[series]] block per series to follow.
#
# [[series]]
# location = "https://comics.example/dd/series.json"
# provider = "manifest"          # "manifest" (default) or "directory"
# directory = "Dungeon Diary"    # Library subdirectory (default: series title)
#
# [series.overrides]             # Correct chapter numbers by chapter id
# "c-0099" = 12.5
"##
}
