//! Solver configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Defines when the search stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Stop at the first complete placement.
    FirstMatch,
    /// Explore the whole search space and count all complete placements.
    EnumerateAll,
}

/// Holds raw solver config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSolverConfig {
    pub mode: Option<SearchMode>,
    pub symmetry_pruning: Option<bool>,
    pub sort_inventory: Option<bool>,
    pub progress_period: Option<u64>,
}

/// Represents solver configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SolverConfig {
    /// Search termination mode.
    pub mode: SearchMode,
    /// Whether to skip physical disks equivalent to already explored ones.
    /// Applied in first-match mode only, so that enumeration counts every placement.
    pub symmetry_pruning: bool,
    /// Whether to order hosts by ascending capacity and virtual servers by descending demand before the search.
    pub sort_inventory: bool,
    /// Number of explored candidates between progress log records.
    pub progress_period: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::FirstMatch,
            symmetry_pruning: true,
            sort_inventory: true,
            progress_period: 1_000_000,
        }
    }
}

impl SolverConfig {
    /// Creates solver config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&data)
    }

    /// Parses solver config from YAML string.
    pub fn from_yaml_str(data: &str) -> Result<Self, ConfigError> {
        let raw: RawSolverConfig = serde_yaml::from_str(data)?;
        let default = Self::default();
        Ok(Self {
            mode: raw.mode.unwrap_or(default.mode),
            symmetry_pruning: raw.symmetry_pruning.unwrap_or(default.symmetry_pruning),
            sort_inventory: raw.sort_inventory.unwrap_or(default.sort_inventory),
            progress_period: raw.progress_period.unwrap_or(default.progress_period),
        })
    }

    /// Sets search mode.
    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables symmetry pruning.
    pub fn symmetry_pruning(mut self, enabled: bool) -> Self {
        self.symmetry_pruning = enabled;
        self
    }

    /// Enables or disables heuristic inventory ordering.
    pub fn sort_inventory(mut self, enabled: bool) -> Self {
        self.sort_inventory = enabled;
        self
    }

    /// Sets progress log period.
    pub fn progress_period(mut self, period: u64) -> Self {
        self.progress_period = period;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SolverConfig::from_yaml_str("mode: EnumerateAll").unwrap();
        assert_eq!(config.mode, SearchMode::EnumerateAll);
        assert!(config.symmetry_pruning);
        assert!(config.sort_inventory);
        assert_eq!(config.progress_period, 1_000_000);
    }

    #[test]
    fn test_all_fields() {
        let config = SolverConfig::from_yaml_str(
            "mode: FirstMatch\nsymmetry_pruning: false\nsort_inventory: false\nprogress_period: 10\n",
        )
        .unwrap();
        assert_eq!(
            config,
            SolverConfig::default()
                .symmetry_pruning(false)
                .sort_inventory(false)
                .progress_period(10)
        );
    }

    #[test]
    fn test_invalid_mode() {
        assert!(matches!(
            SolverConfig::from_yaml_str("mode: Fastest"),
            Err(ConfigError::Parse(_))
        ));
    }
}
