//! Engine configuration loading
//!
//! Configuration comes from a TOML file with per-field defaults. A missing
//! file is not an error: the engine starts with defaults and a warning.
//! A present-but-unparseable file is a configuration error.

use crate::{Error, Result};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Conflict resolution strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Confidence-weighted average of numeric values (default)
    #[default]
    WeightedAverage,
    /// Highest summed confidence per exact value
    MajorityVote,
    /// Single record with the maximum confidence
    HighestConfidence,
    /// Record with the latest timestamp
    TemporalPriority,
}

impl ResolutionStrategy {
    /// Parse a strategy name, falling back to `WeightedAverage`
    ///
    /// An unrecognized name is recovered locally (warn + default) rather
    /// than surfaced as an error.
    pub fn from_name(name: &str) -> Self {
        match name {
            "weighted_average" => Self::WeightedAverage,
            "majority_vote" => Self::MajorityVote,
            "highest_confidence" => Self::HighestConfidence,
            "temporal_priority" => Self::TemporalPriority,
            other => {
                warn!(
                    strategy = other,
                    "Unrecognized conflict resolution strategy, defaulting to weighted_average"
                );
                Self::WeightedAverage
            }
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::WeightedAverage => "weighted_average",
            Self::MajorityVote => "majority_vote",
            Self::HighestConfidence => "highest_confidence",
            Self::TemporalPriority => "temporal_priority",
        };
        write!(f, "{}", name)
    }
}

impl<'de> Deserialize<'de> for ResolutionStrategy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

/// Synchronization engine configuration
///
/// Window and capacity values are defaults inherited from the original
/// deployment, not correctness guarantees at other scales.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Batch synchronization cadence in milliseconds
    pub sync_interval_ms: u64,
    /// Maximum queued results drained per batch cycle
    pub batch_size: usize,
    /// Strategy applied to detected conflicts
    pub conflict_resolution_strategy: ResolutionStrategy,
    /// Recency window for conflict-detection context, in days
    pub data_retention_days: u32,
    /// Snapshot cadence in milliseconds
    pub snapshot_interval_ms: u64,
    /// Process each result immediately instead of queueing it
    pub real_time_sync: bool,
    /// Central store capacity (FIFO eviction beyond this)
    pub store_capacity: usize,
    /// Sliding conflict-detection window in seconds
    pub conflict_window_secs: u64,
    /// Event bus channel capacity
    pub event_bus_capacity: usize,
    /// Retained snapshot artifacts (oldest pruned first)
    pub max_snapshots: usize,
    /// Per-source history entries kept for detection and snapshots
    pub source_history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 30_000,
            batch_size: 50,
            conflict_resolution_strategy: ResolutionStrategy::WeightedAverage,
            data_retention_days: 30,
            snapshot_interval_ms: 3_600_000,
            real_time_sync: true,
            store_capacity: 1000,
            conflict_window_secs: 600,
            event_bus_capacity: 256,
            max_snapshots: 10,
            source_history_limit: 100,
        }
    }
}

impl SyncConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))
    }

    /// Load configuration from a TOML file
    ///
    /// Missing file: warn and start with defaults. Unparseable file:
    /// `Error::Config` so a typo does not silently revert settings.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval_ms, 30_000);
        assert_eq!(config.batch_size, 50);
        assert_eq!(
            config.conflict_resolution_strategy,
            ResolutionStrategy::WeightedAverage
        );
        assert_eq!(config.data_retention_days, 30);
        assert_eq!(config.snapshot_interval_ms, 3_600_000);
        assert!(config.real_time_sync);
        assert_eq!(config.store_capacity, 1000);
        assert_eq!(config.conflict_window_secs, 600);
        assert_eq!(config.max_snapshots, 10);
    }

    #[test]
    fn test_strategy_from_name_fallback() {
        assert_eq!(
            ResolutionStrategy::from_name("majority_vote"),
            ResolutionStrategy::MajorityVote
        );
        assert_eq!(
            ResolutionStrategy::from_name("definitely_not_a_strategy"),
            ResolutionStrategy::WeightedAverage
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults_for_rest() {
        let config = SyncConfig::from_toml_str(
            r#"
            batch_size = 10
            conflict_resolution_strategy = "temporal_priority"
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(
            config.conflict_resolution_strategy,
            ResolutionStrategy::TemporalPriority
        );
        assert_eq!(config.sync_interval_ms, 30_000);
    }

    #[test]
    fn test_unknown_strategy_in_toml_falls_back() {
        let config = SyncConfig::from_toml_str(
            r#"conflict_resolution_strategy = "quantum_consensus""#,
        )
        .unwrap();
        assert_eq!(
            config.conflict_resolution_strategy,
            ResolutionStrategy::WeightedAverage
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = SyncConfig::from_toml_str("batch_size = \"not a number\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
