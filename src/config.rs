//! Planner configuration and TOML loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upper bound on tables joined without a manual join order.
pub const DEFAULT_MAX_TABLES_PER_JOIN: usize = 5;
/// Default upper bound on parameters in a parameterized plan.
pub const DEFAULT_MAX_PARAM_COUNT: usize = 1025;
/// Default number of cached parameterized plans.
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 256;

/// How the plan selector weighs output-order determinism against cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeterminismMode {
    /// Cheapest plan wins.
    #[default]
    Faster,
    /// A plan with deterministic output order beats any cheaper plan
    /// without one.
    Safer,
}

/// Tunables for a planning run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Joins over more tables need a manual join order.
    pub max_tables_per_join: usize,
    /// Parameterized plans with more slots fall back to the original
    /// statement.
    pub max_param_count: usize,
    /// Selector policy.
    pub determinism: DeterminismMode,
    /// Silences the default trace sink.
    pub suppress_debug_output: bool,
    /// Capacity of [`crate::cache::PlanCache`] when built from this config.
    pub plan_cache_capacity: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_tables_per_join: DEFAULT_MAX_TABLES_PER_JOIN,
            max_param_count: DEFAULT_MAX_PARAM_COUNT,
            determinism: DeterminismMode::Faster,
            suppress_debug_output: true,
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
        }
    }
}

impl PlannerConfig {
    /// Preset that prefers order-deterministic plans and emits stage traces.
    pub fn deterministic() -> Self {
        Self {
            determinism: DeterminismMode::Safer,
            suppress_debug_output: false,
            ..Self::default()
        }
    }

    /// Parses the `[planner]` table of a TOML document. Missing keys keep
    /// their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::parse(source, "<string>")
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = read_file(path)?;
        Self::parse(&contents, &path.display().to_string())
    }

    fn parse(source: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(source).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        raw.planner.validate()?;
        Ok(raw.planner)
    }

    /// Rejects settings no planner can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tables_per_join == 0 {
            return Err(ConfigError::Invalid {
                key: "max_tables_per_join",
                reason: "must be at least 1".into(),
            });
        }
        if self.plan_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "plan_cache_capacity",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    planner: PlannerConfig,
}

pub(crate) fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Failure to load configuration or catalog files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// Document is not valid TOML for the expected shape.
    #[error("failed to parse {origin}: {source}")]
    Parse {
        /// File path, or `<string>` for in-memory sources.
        origin: String,
        /// Underlying TOML failure.
        source: toml::de::Error,
    },
    /// A setting is out of range.
    #[error("invalid setting '{key}': {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// Catalog content is inconsistent.
    #[error("invalid catalog: {0}")]
    Catalog(String),
    /// The tracing subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
