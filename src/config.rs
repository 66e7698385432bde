// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Pipeline configuration

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file looked up by [`PipelineConfig::load`]
pub const CONFIG_FILE: &str = "polyframe.toml";

const MIB: usize = 1024 * 1024;

// Durations are stored as integer milliseconds
fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Recognized pipeline options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Preview geometry cache budget in bytes
    pub preview_cache_bytes: usize,
    /// Exact-kernel cache budget in bytes
    pub exact_cache_bytes: usize,
    /// Primary chain size above which the preview renderer is disabled;
    /// normalization itself may grow to twice this many elements
    pub preview_element_limit: usize,
    /// Auto-reload poll interval
    #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub auto_reload_interval: Duration,
    /// Delay before re-checking dependencies that changed during a reload
    #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub settle_delay: Duration,
    /// Dependency re-checks allowed in one cascade before giving up
    pub max_dependency_checks: u32,
    /// Extra directories searched by `include` and `use`
    pub library_paths: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_cache_bytes: 100 * MIB,
            exact_cache_bytes: 100 * MIB,
            preview_element_limit: 10_000,
            auto_reload_interval: Duration::from_millis(200),
            settle_delay: Duration::from_millis(200),
            max_dependency_checks: 10,
            library_paths: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Element budget handed to the term normalizer
    pub fn normalizer_budget(&self) -> usize {
        self.preview_element_limit.saturating_mul(2)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `polyframe.toml` if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if Path::new(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("POLYFRAME_PREVIEW_CACHE") {
            self.preview_cache_bytes = value
                .parse()
                .with_context(|| format!("POLYFRAME_PREVIEW_CACHE is not a byte count: {}", value))?;
        }

        if let Ok(value) = std::env::var("POLYFRAME_EXACT_CACHE") {
            self.exact_cache_bytes = value
                .parse()
                .with_context(|| format!("POLYFRAME_EXACT_CACHE is not a byte count: {}", value))?;
        }

        if let Ok(value) = std::env::var("POLYFRAME_ELEMENT_LIMIT") {
            self.preview_element_limit = value
                .parse()
                .with_context(|| format!("POLYFRAME_ELEMENT_LIMIT is not a number: {}", value))?;
        }

        if let Some(paths) = std::env::var_os("POLYFRAME_LIBRARY_PATH") {
            self.library_paths.extend(std::env::split_paths(&paths));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.preview_element_limit == 0 {
            bail!("preview_element_limit must be positive");
        }
        if self.auto_reload_interval.is_zero() {
            bail!("auto_reload_interval must be positive");
        }
        if self.max_dependency_checks == 0 {
            bail!("max_dependency_checks must be positive");
        }
        Ok(())
    }
}
