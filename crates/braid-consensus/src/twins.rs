use std::collections::BTreeSet;

use braid_core::error::ConsensusError;
use braid_core::types::VertexId;
use braid_core::vertex::{TxOutput, Vertex};
use braid_dag::store::DagRead;

use crate::staged::StagedDag;

/// Recognises conflicting transactions with identical economic effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwinClassifier;

impl TwinClassifier {
    /// Same spent outpoints in the same order, same outputs in any order,
    /// same token table, different ids. Parents, weight, timestamp, nonce
    /// and unlocking data are free to differ.
    pub fn classify(a: &Vertex, b: &Vertex) -> bool {
        let (Some(ta), Some(tb)) = (a.as_transaction(), b.as_transaction()) else {
            return false;
        };
        if ta.id == tb.id || ta.inputs.len() != tb.inputs.len() || ta.tokens != tb.tokens {
            return false;
        }
        let same_inputs = ta
            .inputs
            .iter()
            .zip(&tb.inputs)
            .all(|(x, y)| x.outpoint() == y.outpoint());
        same_inputs && sorted_outputs(&ta.outputs) == sorted_outputs(&tb.outputs)
    }

    /// The twins of `tx` among its conflicts.
    pub fn find_twins<R: DagRead + ?Sized>(
        dag: &R,
        tx: &Vertex,
        conflicts: &BTreeSet<VertexId>,
    ) -> Result<BTreeSet<VertexId>, ConsensusError> {
        let mut twins = BTreeSet::new();
        for id in conflicts {
            if Self::classify(tx, &dag.require(id)?) {
                twins.insert(*id);
            }
        }
        Ok(twins)
    }

    /// Record the twin relation in both directions.
    pub fn link<R: DagRead + ?Sized>(
        dag: &mut StagedDag<'_, R>,
        a: &VertexId,
        b: &VertexId,
    ) -> Result<(), ConsensusError> {
        dag.metadata_mut(a)?.twins.insert(*b);
        dag.metadata_mut(b)?.twins.insert(*a);
        Ok(())
    }
}

fn sorted_outputs(outputs: &[TxOutput]) -> Vec<&TxOutput> {
    let mut sorted: Vec<&TxOutput> = outputs.iter().collect();
    sorted.sort();
    sorted
}
