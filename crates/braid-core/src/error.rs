use thiserror::Error;

use crate::types::{Timestamp, VertexId, Weight};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    // ── Retryable ────────────────────────────────────────────────────────────
    /// A referenced ancestor is absent. The caller fetches it and resubmits.
    #[error("missing parent vertex: {0}")]
    MissingParent(VertexId),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    // ── Permanent rejections ─────────────────────────────────────────────────
    #[error("weight too low: {weight} below minimum {min}")]
    WeightTooLow { weight: Weight, min: Weight },

    #[error("invalid timestamp {timestamp}: {reason}")]
    InvalidTimestamp { timestamp: Timestamp, reason: String },

    #[error("vertex already exists: {0}")]
    DuplicateVertex(VertexId),

    #[error("invalid parents: {0}")]
    InvalidParents(String),

    #[error("invalid inputs: {0}")]
    InvalidInputs(String),

    #[error("output {tx_id}:{index} already spent in the vertex's own past by {spent_by}")]
    DoubleSpendInPast {
        tx_id: VertexId,
        index: u8,
        spent_by: VertexId,
    },

    #[error("vertex id does not match its contents")]
    InvalidId,

    #[error("invalid proof-of-work: solution weight {solved} below declared {declared}")]
    InvalidPoW { solved: Weight, declared: Weight },

    #[error("block data exceeds maximum size of {max} bytes")]
    InvalidBlockData { max: usize },

    // ── Lookups ──────────────────────────────────────────────────────────────
    #[error("vertex not found: {0}")]
    NotFound(VertexId),

    // ── Fatal ────────────────────────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("consensus invariant violated: {0}")]
    ConsensusInvariantViolation(String),
}

impl ConsensusError {
    /// Transient failures the caller may retry after fetching dependencies
    /// or backing off. They never leave partial state behind.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConsensusError::MissingParent(_) | ConsensusError::StoreUnavailable(_)
        )
    }

    /// Failures after which the engine must stop accepting vertices.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConsensusError::ConsensusInvariantViolation(_) | ConsensusError::Serialization(_)
        )
    }
}
