use braid_core::config::ConsensusConfig;
use braid_core::error::ConsensusError;
use braid_core::types::{Timestamp, VertexId, Weight};
use braid_dag::store::DagRead;

use crate::weight::sum_all;

/// One block of the difficulty window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockSample {
    pub timestamp: Timestamp,
    pub weight: Weight,
}

/// Weight the next block must carry.
///
/// `samples` are the last `k + 1` blocks of the chain, oldest first; the
/// `k` intervals between them estimate the network hash rate:
///
///   log_h  = log2(Σ 2^w over the k most recent blocks) - log2(dt)
///   weight = log_h + log2(avg_time_between_blocks)
///
/// The change against the tip is clamped to `±max_dw` and the result never
/// drops below `min_block_weight`. Without a full interval the minimum
/// applies.
pub fn next_block_weight(
    samples: &[BlockSample],
    tip_weight: Weight,
    config: &ConsensusConfig,
) -> Weight {
    if samples.len() < 2 {
        return config.min_block_weight;
    }

    let first = samples[0];
    let last = samples[samples.len() - 1];
    let dt = (last.timestamp - first.timestamp).max(1) as f64;

    let log_h = sum_all(samples[1..].iter().map(|s| s.weight)) - dt.log2();
    let mut weight = log_h + (config.avg_time_between_blocks as f64).log2();

    // Hash-rate estimates overshoot when the rate moves; limit each step.
    let max_dw = config.block_difficulty_max_dw;
    let dw = weight - tip_weight;
    if dw > max_dw {
        weight = tip_weight + max_dw;
    } else if dw < -max_dw {
        weight = tip_weight - max_dw;
    }

    weight.max(config.min_block_weight)
}

/// Difficulty for a block whose block parent is `tip`.
///
/// Walks back along block parents; the genesis interval is never sampled.
/// Read-only, so it runs against committed state without the writer lock.
pub fn required_difficulty<R: DagRead + ?Sized>(
    dag: &R,
    tip: &VertexId,
    config: &ConsensusConfig,
) -> Result<Weight, ConsensusError> {
    let tip_vertex = dag.require(tip)?;
    if !tip_vertex.is_block() {
        return Err(ConsensusError::InvalidParents(format!("{tip} is not a block")));
    }
    let height = dag.require_metadata(tip)?.height;
    let k = (height.saturating_sub(1) as usize).min(config.block_difficulty_n_blocks);
    if k == 0 {
        return Ok(config.min_block_weight);
    }

    let mut samples = Vec::with_capacity(k + 1);
    let mut cursor = tip_vertex;
    loop {
        samples.push(BlockSample { timestamp: cursor.timestamp(), weight: cursor.weight() });
        if samples.len() == k + 1 {
            break;
        }
        let parent = cursor.block_parent().ok_or_else(|| {
            ConsensusError::ConsensusInvariantViolation(format!(
                "block chain of {tip} ends before height {height}"
            ))
        })?;
        cursor = dag.require(&parent)?;
    }
    samples.reverse();

    Ok(next_block_weight(&samples, samples[k].weight, config))
}
