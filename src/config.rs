use std::path::Path;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::crossref::UNKNOWN_COMPANY;
use crate::error::{CaseBuilderError, Result};
use crate::oracle::OraclePolicy;

pub const ENV_TIMEOUT_SECS: &str = "CASE_BUILDER_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "CASE_BUILDER_MAX_ATTEMPTS";
pub const ENV_CONCURRENT: &str = "CASE_BUILDER_CONCURRENT";

/// Knobs for one pipeline run. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hard cut-off for a single oracle attempt.
    pub timeout_secs: u64,
    /// Total attempts per oracle call, including the first.
    pub max_attempts: u32,
    /// Run the three extraction calls together instead of one after another.
    pub concurrent_oracle_calls: bool,
    /// Company name looked up when extraction found none.
    pub unknown_company: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_attempts: 2,
            concurrent_oracle_calls: true,
            unknown_company: UNKNOWN_COMPANY.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!("Loaded pipeline config from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Applies `CASE_BUILDER_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_var(ENV_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.max_attempts = parse_var(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_CONCURRENT) {
            self.concurrent_oracle_calls = parse_flag(ENV_CONCURRENT, &value)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(CaseBuilderError::Config("timeout_secs must be positive".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(CaseBuilderError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.unknown_company.trim().is_empty() {
            return Err(CaseBuilderError::Config("unknown_company must not be blank".to_string()));
        }
        Ok(())
    }

    pub fn policy(&self) -> OraclePolicy {
        OraclePolicy::new(Duration::from_secs(self.timeout_secs), self.max_attempts)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CaseBuilderError::Config(format!("{} has invalid value '{}'", key, value)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CaseBuilderError::Config(format!(
            "{} has invalid value '{}'",
            key, value
        ))),
    }
}
