use std::collections::{BTreeMap, BTreeSet};

use braid_core::types::{VertexId, Weight};
use serde::{Deserialize, Serialize};

/// Mutable consensus state attached to a vertex.
///
/// Owned by the consensus engine: created when the vertex is accepted,
/// rewritten by later `process` calls that affect it, never deleted.
/// Relations to other vertices are id sets; nothing is embedded.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VertexMetadata {
    /// log2 of the summed work of this vertex and every descendant.
    pub accumulated_weight: Weight,

    /// Blocks only: log2 of the summed work of the block and its whole past.
    pub score: Weight,

    /// Blocks only: distance to the genesis block along block parents.
    pub height: u64,

    /// Vertices spending an output this vertex also spends. Symmetric.
    pub conflict_with: BTreeSet<VertexId>,

    /// Non-empty ⇒ voided. Holds winners of conflicts this vertex lost plus
    /// ancestors that lost a conflict of their own.
    pub voided_by: BTreeSet<VertexId>,

    /// Conflicts with identical economic effect. Subset of `conflict_with`.
    pub twins: BTreeSet<VertexId>,

    /// Output index → vertices spending it.
    pub spent_outputs: BTreeMap<u8, BTreeSet<VertexId>>,
}

impl VertexMetadata {
    /// Fresh metadata for a vertex carrying `weight` of its own work.
    pub fn new(weight: Weight) -> Self {
        Self {
            accumulated_weight: weight,
            score: 0.0,
            height: 0,
            conflict_with: BTreeSet::new(),
            voided_by: BTreeSet::new(),
            twins: BTreeSet::new(),
            spent_outputs: BTreeMap::new(),
        }
    }

    pub fn is_voided(&self) -> bool {
        !self.voided_by.is_empty()
    }

    /// Winners of the conflict sets this vertex lost.
    ///
    /// Conflicting vertices are never causally related, so the two parts of
    /// `voided_by` can be told apart by membership in `conflict_with`.
    pub fn own_losses(&self) -> BTreeSet<VertexId> {
        self.voided_by
            .intersection(&self.conflict_with)
            .copied()
            .collect()
    }

    /// Ancestors that lost a conflict.
    pub fn inherited_voids(&self) -> BTreeSet<VertexId> {
        self.voided_by
            .difference(&self.conflict_with)
            .copied()
            .collect()
    }

    pub fn spenders_of(&self, index: u8) -> BTreeSet<VertexId> {
        self.spent_outputs.get(&index).cloned().unwrap_or_default()
    }
}
