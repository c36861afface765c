//! Engine configuration

use std::env;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use intake_domain::validation::DEFAULT_SPECIAL_DESC_MIN_LEN;
use intake_domain::ValidationRules;

/// Default autosave interval: three minutes.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 180;

/// Engine configuration loaded from environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Autosave timer configuration
    pub autosave: AutosaveConfig,
    /// Minimum description length for promotional items
    pub special_desc_min_len: usize,
    /// Overrides the default tracing filter when set
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autosave: AutosaveConfig::default(),
            special_desc_min_len: DEFAULT_SPECIAL_DESC_MIN_LEN,
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let interval_secs: u64 = lookup("INTAKE_AUTOSAVE_INTERVAL_SECS")
            .unwrap_or_else(|| DEFAULT_AUTOSAVE_INTERVAL_SECS.to_string())
            .trim()
            .parse()
            .context("INTAKE_AUTOSAVE_INTERVAL_SECS must be a whole number of seconds")?;
        ensure!(
            interval_secs > 0,
            "INTAKE_AUTOSAVE_INTERVAL_SECS must be greater than zero"
        );

        let enabled = match lookup("INTAKE_AUTOSAVE_ENABLED") {
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("INTAKE_AUTOSAVE_ENABLED has invalid value '{raw}'"))?,
            None => true,
        };

        let special_desc_min_len: usize = lookup("INTAKE_SPECIAL_DESC_MIN_LEN")
            .unwrap_or_else(|| DEFAULT_SPECIAL_DESC_MIN_LEN.to_string())
            .trim()
            .parse()
            .context("INTAKE_SPECIAL_DESC_MIN_LEN must be a non-negative integer")?;

        let log_filter = lookup("INTAKE_LOG_FILTER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            autosave: AutosaveConfig {
                enabled,
                interval: Duration::from_secs(interval_secs),
            },
            special_desc_min_len,
            log_filter,
        })
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            special_desc_min_len: self.special_desc_min_len,
        }
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}
