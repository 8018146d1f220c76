use std::collections::BTreeSet;

use braid_core::error::ConsensusError;
use braid_core::types::VertexId;
use braid_core::vertex::Vertex;
use braid_dag::store::DagRead;

use crate::weight::WeightModel;

/// Winner and losers of one conflict set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub winner: VertexId,
    pub losers: BTreeSet<VertexId>,
}

/// Detects and resolves double spends.
///
/// A conflict set is every spender of one output. Spenders of the same
/// output are never causally related: a vertex spending an output already
/// spent in its own past is rejected outright.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    model: WeightModel,
}

impl ConflictResolver {
    pub fn new(model: WeightModel) -> Self {
        Self { model }
    }

    /// Every other spender of the outputs `tx` spends.
    ///
    /// `ancestors` is the ancestor set of `tx`. Reads the spend index before
    /// `tx` itself is recorded in it.
    pub fn find_conflicts<R: DagRead + ?Sized>(
        &self,
        dag: &R,
        tx: &Vertex,
        ancestors: &BTreeSet<VertexId>,
    ) -> Result<BTreeSet<VertexId>, ConsensusError> {
        let id = tx.id();
        let mut conflicts = BTreeSet::new();
        for input in tx.inputs() {
            let funder = dag.require_metadata(&input.tx_id)?;
            for spender in funder.spenders_of(input.index) {
                if spender == id {
                    continue;
                }
                if ancestors.contains(&spender) {
                    return Err(ConsensusError::DoubleSpendInPast {
                        tx_id: input.tx_id,
                        index: input.index,
                        spent_by: spender,
                    });
                }
                conflicts.insert(spender);
            }
        }
        Ok(conflicts)
    }

    /// The conflict sets `id` belongs to: one per spent output with more
    /// than one spender.
    pub fn conflict_sets<R: DagRead + ?Sized>(
        &self,
        dag: &R,
        id: &VertexId,
    ) -> Result<Vec<BTreeSet<VertexId>>, ConsensusError> {
        let vertex = dag.require(id)?;
        let mut sets = Vec::new();
        for input in vertex.inputs() {
            let spenders = dag.require_metadata(&input.tx_id)?.spenders_of(input.index);
            if spenders.len() > 1 {
                sets.push(spenders);
            }
        }
        Ok(sets)
    }

    /// Greatest accumulated weight wins; within tolerance the smaller id wins.
    pub fn resolve<R: DagRead + ?Sized>(
        &self,
        dag: &R,
        members: &BTreeSet<VertexId>,
    ) -> Result<Resolution, ConsensusError> {
        let mut best: Option<(VertexId, f64)> = None;
        // Ascending id order, so only a strictly heavier member displaces.
        for id in members {
            let weight = dag.require_metadata(id)?.accumulated_weight;
            match best {
                Some((_, w)) if !self.model.gt(weight, w) => {}
                _ => best = Some((*id, weight)),
            }
        }
        let (winner, _) = best.ok_or_else(|| {
            ConsensusError::ConsensusInvariantViolation("empty conflict set".into())
        })?;
        let losers = members.iter().copied().filter(|m| *m != winner).collect();
        Ok(Resolution { winner, losers })
    }

    /// Winners of every conflict set `id` does not win.
    pub fn own_losses<R: DagRead + ?Sized>(
        &self,
        dag: &R,
        id: &VertexId,
    ) -> Result<BTreeSet<VertexId>, ConsensusError> {
        let mut losses = BTreeSet::new();
        for set in self.conflict_sets(dag, id)? {
            let resolution = self.resolve(dag, &set)?;
            if resolution.winner != *id {
                losses.insert(resolution.winner);
            }
        }
        Ok(losses)
    }
}
