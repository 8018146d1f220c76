use serde::Serialize;

use braid_core::types::{VertexId, Weight};
use braid_dag::metadata::VertexMetadata;

/// How a vertex's voided status moved during one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoidedTransition {
    Unchanged,
    BecameVoided,
    BecameValid,
}

/// Emitted for every vertex whose metadata a `process` call changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexChange {
    pub id: VertexId,
    /// True for the vertex being processed.
    pub is_new: bool,
    pub weight_delta: Weight,
    pub transition: VoidedTransition,
    pub new_conflicts: Vec<VertexId>,
    pub new_twins: Vec<VertexId>,
    pub metadata: VertexMetadata,
}

impl VertexChange {
    pub fn new(
        id: VertexId,
        before: Option<&VertexMetadata>,
        after: VertexMetadata,
        is_new: bool,
    ) -> Self {
        let was_voided = before.map(VertexMetadata::is_voided).unwrap_or(false);
        let transition = match (was_voided, after.is_voided()) {
            (false, true) => VoidedTransition::BecameVoided,
            (true, false) => VoidedTransition::BecameValid,
            _ => VoidedTransition::Unchanged,
        };
        let (weight_delta, new_conflicts, new_twins) = match before {
            Some(prev) => (
                after.accumulated_weight - prev.accumulated_weight,
                after.conflict_with.difference(&prev.conflict_with).copied().collect(),
                after.twins.difference(&prev.twins).copied().collect(),
            ),
            None => (
                0.0,
                after.conflict_with.iter().copied().collect(),
                after.twins.iter().copied().collect(),
            ),
        };
        Self {
            id,
            is_new,
            weight_delta,
            transition,
            new_conflicts,
            new_twins,
            metadata: after,
        }
    }
}

/// Outcome of one `process` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusChangeSet {
    pub vertex: VertexId,
    pub changes: Vec<VertexChange>,
}

impl ConsensusChangeSet {
    pub fn get(&self, id: &VertexId) -> Option<&VertexChange> {
        self.changes.iter().find(|c| c.id == *id)
    }

    pub fn newly_voided(&self) -> Vec<VertexId> {
        self.with_transition(VoidedTransition::BecameVoided)
    }

    pub fn newly_valid(&self) -> Vec<VertexId> {
        self.with_transition(VoidedTransition::BecameValid)
    }

    fn with_transition(&self, t: VoidedTransition) -> Vec<VertexId> {
        self.changes.iter().filter(|c| c.transition == t).map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_tracks_voided_flip() {
        let winner = VertexId::from_bytes([1; 32]);
        let before = VertexMetadata::new(10.0);
        let mut after = before.clone();
        after.accumulated_weight = 11.0;
        after.conflict_with.insert(winner);
        after.voided_by.insert(winner);

        let change = VertexChange::new(VertexId::from_bytes([2; 32]), Some(&before), after, false);
        assert_eq!(change.transition, VoidedTransition::BecameVoided);
        assert_eq!(change.weight_delta, 1.0);
        assert_eq!(change.new_conflicts, vec![winner]);
        assert!(change.new_twins.is_empty());
    }

    #[test]
    fn new_valid_vertex_is_unchanged() {
        let change =
            VertexChange::new(VertexId::from_bytes([2; 32]), None, VertexMetadata::new(3.0), true);
        assert_eq!(change.transition, VoidedTransition::Unchanged);
        assert!(change.is_new);
    }
}
