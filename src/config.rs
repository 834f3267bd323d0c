//! Runtime configuration.
//!
//! Configuration is read from TOML; every section and field is optional and
//! falls back to [`Default`].
//!
//! ```toml
//! log_level = "epgm=debug"
//!
//! [execution]
//! parallelism = 4
//!
//! [planner]
//! edge_scan_seeds = false
//! default_degree = 5.0
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{EpgmError, Result};

/// Settings of the local dataflow substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Worker threads and default partition count; `0` uses all cores.
    pub parallelism: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { parallelism: 0 }
    }
}

/// Planner knobs and the fallbacks used when statistics lack an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Seed the plan table with one edge scan per fixed-length query edge.
    pub edge_scan_seeds: bool,
    /// Vertex count assumed when statistics have no entry.
    pub default_vertex_count: f64,
    /// Edge count assumed when statistics have no entry.
    pub default_edge_count: f64,
    /// Average degree assumed when statistics have no entry.
    pub default_degree: f64,
    /// Selectivity of `=` comparisons against literals.
    pub equality_selectivity: f64,
    /// Selectivity of `<`, `<=`, `>`, `>=` comparisons.
    pub range_selectivity: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            edge_scan_seeds: true,
            default_vertex_count: 1000.0,
            default_edge_count: 10_000.0,
            default_degree: 10.0,
            equality_selectivity: 0.05,
            range_selectivity: 0.3,
        }
    }
}

impl PlannerConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("default_vertex_count", self.default_vertex_count),
            ("default_edge_count", self.default_edge_count),
            ("default_degree", self.default_degree),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EpgmError::Config(format!(
                    "planner.{name} must be a non-negative number"
                )));
            }
        }
        for (name, value) in [
            ("equality_selectivity", self.equality_selectivity),
            ("range_selectivity", self.range_selectivity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EpgmError::Config(format!(
                    "planner.{name} must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EpgmConfig {
    /// Dataflow settings.
    pub execution: ExecutionConfig,
    /// Planner settings.
    pub planner: PlannerConfig,
    /// `tracing` filter directive passed to [`crate::logging::init_logging`].
    pub log_level: String,
}

impl Default for EpgmConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            planner: PlannerConfig::default(),
            log_level: "info".to_owned(),
        }
    }
}

impl EpgmConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EpgmConfig =
            toml::from_str(text).map_err(|err| EpgmError::Config(err.to_string()))?;
        config.planner.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| EpgmError::Config(err.to_string()))
    }
}
