use std::collections::HashSet;

use braid_core::clock::Clock;
use braid_core::config::ConsensusConfig;
use braid_core::constants::{BLOCK_PARENTS, TX_PARENTS};
use braid_core::error::ConsensusError;
use braid_core::types::VertexId;
use braid_core::vertex::{Vertex, VertexKind};
use braid_crypto::compute_vertex_id;

use crate::store::DagRead;

/// Structural validation of a vertex before it enters consensus.
///
/// Checks (in order):
/// 1. Genesis-shaped vertices are refused (genesis only enters at bootstrap)
/// 2. Parent shape for the vertex kind
/// 3. Every dependency exists, parents have the right kinds
/// 4. Id integrity (recomputed from body and nonce)
/// 5. Declared weight is finite and meets the kind minimum
/// 6. Timestamp bounds
/// 7. Inputs
/// 8. Block data size
///
/// Nothing here reads metadata; proof of work, difficulty and conflicts are
/// the engine's job.
/// Balances and scripts are checked upstream.
pub fn validate_vertex<R: DagRead + ?Sized>(
    dag: &R,
    vertex: &Vertex,
    config: &ConsensusConfig,
    clock: &dyn Clock,
) -> Result<(), ConsensusError> {
    // ── 1. Genesis exception ─────────────────────────────────────────────────
    if vertex.is_genesis() {
        return Err(ConsensusError::InvalidParents(
            "vertex without parents outside bootstrap".into(),
        ));
    }

    // ── 2. Parent shape ──────────────────────────────────────────────────────
    let parents = vertex.parents();
    let expected = match vertex.kind() {
        VertexKind::Block => BLOCK_PARENTS,
        VertexKind::Transaction => TX_PARENTS,
    };
    if parents.len() != expected {
        return Err(ConsensusError::InvalidParents(format!(
            "expected {expected} parents, got {}",
            parents.len()
        )));
    }
    let distinct: HashSet<&VertexId> = parents.iter().collect();
    if distinct.len() != parents.len() {
        return Err(ConsensusError::InvalidParents("duplicate parent".into()));
    }

    // ── 3. All dependencies must exist ───────────────────────────────────────
    let mut deps = Vec::new();
    for dep_id in vertex.dependencies() {
        let dep = dag.get(&dep_id)?.ok_or(ConsensusError::MissingParent(dep_id))?;
        deps.push(dep);
    }
    for (i, parent) in deps.iter().take(parents.len()).enumerate() {
        let want_block = vertex.is_block() && i == 0;
        if parent.is_block() != want_block {
            return Err(ConsensusError::InvalidParents(format!(
                "parent {} must be a {}",
                parent.id(),
                if want_block { "block" } else { "transaction" }
            )));
        }
    }

    // ── 4. Id integrity ──────────────────────────────────────────────────────
    if compute_vertex_id(vertex) != vertex.id() {
        return Err(ConsensusError::InvalidId);
    }

    // ── 5. Minimum weight ────────────────────────────────────────────────────
    let min = config.min_weight(vertex.kind());
    if !vertex.weight().is_finite() || vertex.weight() < min - config.weight_tol {
        return Err(ConsensusError::WeightTooLow { weight: vertex.weight(), min });
    }

    // ── 6. Timestamp ─────────────────────────────────────────────────────────
    let timestamp = vertex.timestamp();
    let horizon = clock.now() + config.max_future_timestamp;
    if timestamp > horizon {
        return Err(ConsensusError::InvalidTimestamp {
            timestamp,
            reason: format!("more than {}s in the future", config.max_future_timestamp),
        });
    }
    if let Some(dep) = deps.iter().find(|d| d.timestamp() > timestamp) {
        return Err(ConsensusError::InvalidTimestamp {
            timestamp,
            reason: format!("earlier than dependency {} at {}", dep.id(), dep.timestamp()),
        });
    }
    if vertex.is_block() {
        let block_parent = &deps[0];
        if !block_parent.is_genesis()
            && timestamp - block_parent.timestamp() > config.max_distance_between_blocks
        {
            return Err(ConsensusError::InvalidTimestamp {
                timestamp,
                reason: format!(
                    "more than {}s after block parent {}",
                    config.max_distance_between_blocks,
                    block_parent.id()
                ),
            });
        }
    }

    // ── 7. Inputs ────────────────────────────────────────────────────────────
    if let Vertex::Transaction(tx) = vertex {
        if tx.inputs.is_empty() {
            return Err(ConsensusError::InvalidInputs("transaction spends nothing".into()));
        }
        let mut seen = HashSet::new();
        for input in &tx.inputs {
            if !seen.insert(input.outpoint()) {
                return Err(ConsensusError::InvalidInputs(format!(
                    "output {}:{} spent twice",
                    input.tx_id, input.index
                )));
            }
            let funder = deps
                .iter()
                .find(|d| d.id() == input.tx_id)
                .ok_or(ConsensusError::MissingParent(input.tx_id))?;
            if usize::from(input.index) >= funder.outputs().len() {
                return Err(ConsensusError::InvalidInputs(format!(
                    "{} has no output {}",
                    input.tx_id, input.index
                )));
            }
        }
    }

    // ── 8. Block data ────────────────────────────────────────────────────────
    if let Vertex::Block(block) = vertex {
        if block.data.len() > config.block_data_max_size {
            return Err(ConsensusError::InvalidBlockData { max: config.block_data_max_size });
        }
    }

    Ok(())
}
