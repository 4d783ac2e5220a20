use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

pub const ENV_CLEANUP: &str = "REPO_HARNESS_CLEANUP";
pub const ENV_PURGE_MODE: &str = "REPO_HARNESS_PURGE_MODE";
pub const ENV_DATABASE_URL: &str = "REPO_HARNESS_DATABASE_URL";

/// Database used when no URL is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

/// How the fixture purger empties tables before a non-appending load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PurgeModeRepr", rename_all = "lowercase")]
pub enum PurgeMode {
    #[default]
    Delete,
    Truncate,
}

impl PurgeMode {
    /// Numeric configuration code: 1 = delete, 2 = truncate.
    pub fn code(self) -> u8 {
        match self {
            PurgeMode::Delete => 1,
            PurgeMode::Truncate => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, HarnessError> {
        match code {
            1 => Ok(PurgeMode::Delete),
            2 => Ok(PurgeMode::Truncate),
            other => Err(HarnessError::config(format!(
                "purge mode must be 1 (delete) or 2 (truncate), got {other}"
            ))),
        }
    }
}

impl FromStr for PurgeMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "delete" => Ok(PurgeMode::Delete),
            "2" | "truncate" => Ok(PurgeMode::Truncate),
            other => Err(HarnessError::config(format!(
                "purge mode must be delete or truncate, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PurgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgeMode::Delete => write!(f, "delete"),
            PurgeMode::Truncate => write!(f, "truncate"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PurgeModeRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<PurgeModeRepr> for PurgeMode {
    type Error = HarnessError;

    fn try_from(repr: PurgeModeRepr) -> Result<Self, Self::Error> {
        match repr {
            PurgeModeRepr::Code(code) => PurgeMode::from_code(code),
            PurgeModeRepr::Name(name) => name.parse(),
        }
    }
}

/// Harness settings.
///
/// `cleanup` wraps every test in a transaction that is rolled back
/// afterwards; `purge_mode` picks how fixture loading empties tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub cleanup: bool,
    pub purge_mode: PurgeMode,
    pub database_url: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cleanup: true,
            purge_mode: PurgeMode::Delete,
            database_url: None,
        }
    }
}

impl HarnessConfig {
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_purge_mode(mut self, purge_mode: PurgeMode) -> Self {
        self.purge_mode = purge_mode;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Defaults overridden by whichever `REPO_HARNESS_*` variables are set.
    pub fn from_env() -> Result<Self, HarnessError> {
        let mut config = Self::default();
        if let Some(raw) = optional_var(ENV_CLEANUP) {
            config.cleanup = parse_bool(ENV_CLEANUP, &raw)?;
        }
        if let Some(raw) = optional_var(ENV_PURGE_MODE) {
            config.purge_mode = raw.parse()?;
        }
        config.database_url = optional_var(ENV_DATABASE_URL);
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, HarnessError> {
        serde_json::from_str(json)
            .map_err(|e| HarnessError::config(format!("invalid harness configuration: {e}")))
    }

    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or(DEFAULT_DATABASE_URL)
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, HarnessError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HarnessError::config(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
