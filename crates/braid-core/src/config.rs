use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    AVG_TIME_BETWEEN_BLOCKS, BLOCK_DATA_MAX_SIZE, BLOCK_DIFFICULTY_MAX_DW,
    BLOCK_DIFFICULTY_N_BLOCKS, MAX_DISTANCE_BETWEEN_BLOCKS, MAX_FUTURE_TIMESTAMP_ALLOWED,
    MIN_BLOCK_WEIGHT, MIN_TX_WEIGHT, WEIGHT_TOL,
};
use crate::error::ConsensusError;
use crate::vertex::VertexKind;

/// Network-wide consensus parameters, injected into the engine at
/// construction. Every field that influences a decision must match across
/// peers of the same network.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusConfig {
    pub min_block_weight: f64,
    pub min_tx_weight: f64,
    /// Number of block intervals used to estimate the hash rate.
    pub block_difficulty_n_blocks: usize,
    /// Maximum weight change between consecutive blocks.
    pub block_difficulty_max_dw: f64,
    /// Target average block interval in seconds.
    pub avg_time_between_blocks: u64,
    /// Epsilon for every weight comparison.
    pub weight_tol: f64,
    pub max_future_timestamp: i64,
    pub max_distance_between_blocks: i64,
    pub block_data_max_size: usize,
    /// Check proof-of-work solutions. Simulations and tests turn this off
    /// to build large DAGs without mining.
    pub verify_pow: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_block_weight: MIN_BLOCK_WEIGHT,
            min_tx_weight: MIN_TX_WEIGHT,
            block_difficulty_n_blocks: BLOCK_DIFFICULTY_N_BLOCKS,
            block_difficulty_max_dw: BLOCK_DIFFICULTY_MAX_DW,
            avg_time_between_blocks: AVG_TIME_BETWEEN_BLOCKS,
            weight_tol: WEIGHT_TOL,
            max_future_timestamp: MAX_FUTURE_TIMESTAMP_ALLOWED,
            max_distance_between_blocks: MAX_DISTANCE_BETWEEN_BLOCKS,
            block_data_max_size: BLOCK_DATA_MAX_SIZE,
            verify_pow: true,
        }
    }
}

impl ConsensusConfig {
    pub fn min_weight(&self, kind: VertexKind) -> f64 {
        match kind {
            VertexKind::Block => self.min_block_weight,
            VertexKind::Transaction => self.min_tx_weight,
        }
    }

    /// Load a JSON config file. Missing fields fall back to the defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConsensusError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConsensusError::Serialization(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConsensusError> {
        let cfg: Self =
            serde_json::from_str(raw).map_err(|e| ConsensusError::Serialization(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would make difficulty or comparisons meaningless.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        let bad = |msg: &str| Err(ConsensusError::Serialization(format!("invalid config: {msg}")));
        if self.block_difficulty_n_blocks == 0 {
            return bad("block_difficulty_n_blocks must be positive");
        }
        if self.avg_time_between_blocks == 0 {
            return bad("avg_time_between_blocks must be positive");
        }
        if !(self.weight_tol >= 0.0) {
            return bad("weight_tol must be non-negative");
        }
        if !(self.block_difficulty_max_dw > 0.0) {
            return bad("block_difficulty_max_dw must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg = ConsensusConfig::from_json_str(r#"{ "min_tx_weight": 1.0, "verify_pow": false }"#)
            .unwrap();
        assert_eq!(cfg.min_tx_weight, 1.0);
        assert!(!cfg.verify_pow);
        assert_eq!(cfg.min_block_weight, MIN_BLOCK_WEIGHT);
        assert_eq!(cfg.block_difficulty_n_blocks, BLOCK_DIFFICULTY_N_BLOCKS);
    }

    #[test]
    fn zero_window_rejected() {
        let err = ConsensusConfig::from_json_str(r#"{ "block_difficulty_n_blocks": 0 }"#);
        assert!(matches!(err, Err(ConsensusError::Serialization(_))));
    }

    #[test]
    fn min_weight_per_kind() {
        let cfg = ConsensusConfig::default();
        assert_eq!(cfg.min_weight(VertexKind::Block), MIN_BLOCK_WEIGHT);
        assert_eq!(cfg.min_weight(VertexKind::Transaction), MIN_TX_WEIGHT);
    }
}
