use std::collections::BTreeSet;

use braid_core::error::ConsensusError;
use braid_core::types::VertexId;
use braid_dag::store::DagRead;
use braid_dag::walker::DagWalker;

use crate::staged::StagedDag;

/// Carries voiding from conflict losers to everything built on them.
///
/// `voided_by(v) = own_losses(v) ∪ inherited(v)` where
/// `inherited(v) = ⋃ over dependencies d of ({d} if own_losses(d) ≠ ∅) ∪ inherited(d)`.
/// Own losses must already be current for the vertices involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidingPropagator;

impl VoidingPropagator {
    pub fn inherited<R: DagRead + ?Sized>(
        dag: &R,
        id: &VertexId,
    ) -> Result<BTreeSet<VertexId>, ConsensusError> {
        let mut inherited = BTreeSet::new();
        for dep in dag.require(id)?.dependencies() {
            let meta = dag.require_metadata(&dep)?;
            if !meta.own_losses().is_empty() {
                inherited.insert(dep);
            }
            inherited.extend(meta.inherited_voids());
        }
        Ok(inherited)
    }

    /// Recompute `voided_by` of one vertex from its dependencies. Returns
    /// whether it changed.
    pub fn refresh<R: DagRead + ?Sized>(
        dag: &mut StagedDag<'_, R>,
        id: &VertexId,
    ) -> Result<bool, ConsensusError> {
        let inherited = Self::inherited(&*dag, id)?;
        let meta = dag.metadata_mut(id)?;
        let mut voided_by = meta.own_losses();
        voided_by.extend(inherited);
        if voided_by == meta.voided_by {
            return Ok(false);
        }
        meta.voided_by = voided_by;
        Ok(true)
    }

    pub fn propagate<R: DagRead + ?Sized>(
        dag: &mut StagedDag<'_, R>,
        root: &VertexId,
    ) -> Result<usize, ConsensusError> {
        Self::propagate_all(dag, &BTreeSet::from([*root]))
    }

    /// Refresh every descendant of `roots`, dependencies first. Returns the
    /// number of vertices whose `voided_by` changed.
    pub fn propagate_all<R: DagRead + ?Sized>(
        dag: &mut StagedDag<'_, R>,
        roots: &BTreeSet<VertexId>,
    ) -> Result<usize, ConsensusError> {
        let order = {
            let walker = DagWalker::new(&*dag);
            let mut affected = BTreeSet::new();
            for root in roots {
                for id in walker.descendants(root)? {
                    affected.insert(id?);
                }
            }
            walker.topological_order(&affected)?
        };

        let mut changed = 0;
        for id in &order {
            if Self::refresh(dag, id)? {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::vertex::{Transaction, Vertex};
    use braid_dag::metadata::VertexMetadata;
    use braid_dag::store::{CommitBatch, DagStore, MemoryStore};

    fn id(b: u8) -> VertexId {
        VertexId::from_bytes([b; 32])
    }

    fn tx(b: u8, parents: &[u8]) -> Vertex {
        Vertex::Transaction(Transaction {
            id: id(b),
            parents: parents.iter().map(|p| id(*p)).collect(),
            timestamp: b as i64,
            weight: 1.0,
            nonce: 0,
            inputs: vec![],
            outputs: vec![],
            tokens: vec![],
        })
    }

    /// 1 lost a conflict to 9. Chain 1 ← 2 ← 3, and 4 ← 3.
    fn chain() -> MemoryStore {
        let store = MemoryStore::new();
        let mut loser = VertexMetadata::new(1.0);
        loser.conflict_with.insert(id(9));
        loser.voided_by.insert(id(9));
        store
            .commit(CommitBatch {
                vertices: vec![tx(1, &[]), tx(4, &[]), tx(2, &[1]), tx(3, &[2, 4])],
                metadata: vec![
                    (id(1), loser),
                    (id(2), VertexMetadata::new(1.0)),
                    (id(3), VertexMetadata::new(1.0)),
                    (id(4), VertexMetadata::new(1.0)),
                ],
            })
            .unwrap();
        store
    }

    #[test]
    fn descendants_inherit_the_loser() {
        let store = chain();
        let mut staged = StagedDag::new(&store);
        assert_eq!(VoidingPropagator::propagate(&mut staged, &id(1)).unwrap(), 2);
        assert_eq!(staged.require_metadata(&id(2)).unwrap().voided_by, BTreeSet::from([id(1)]));
        assert_eq!(staged.require_metadata(&id(3)).unwrap().voided_by, BTreeSet::from([id(1)]));
        assert!(!staged.require_metadata(&id(4)).unwrap().is_voided());
    }

    #[test]
    fn propagation_is_idempotent() {
        let store = chain();
        let mut staged = StagedDag::new(&store);
        VoidingPropagator::propagate(&mut staged, &id(1)).unwrap();
        store.commit(staged.into_batch()).unwrap();

        let mut again = StagedDag::new(&store);
        let all = BTreeSet::from([id(1), id(4)]);
        assert_eq!(VoidingPropagator::propagate_all(&mut again, &all).unwrap(), 0);
        assert!(again.into_batch().is_empty());
    }

    #[test]
    fn winning_again_clears_descendants() {
        let store = chain();
        let mut staged = StagedDag::new(&store);
        VoidingPropagator::propagate(&mut staged, &id(1)).unwrap();
        store.commit(staged.into_batch()).unwrap();

        let mut staged = StagedDag::new(&store);
        staged.metadata_mut(&id(1)).unwrap().voided_by.clear();
        VoidingPropagator::propagate(&mut staged, &id(1)).unwrap();
        for b in [2, 3] {
            assert!(!staged.require_metadata(&id(b)).unwrap().is_voided());
        }
    }
}
