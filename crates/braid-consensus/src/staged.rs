use std::collections::{BTreeMap, BTreeSet};

use braid_core::error::ConsensusError;
use braid_core::types::VertexId;
use braid_core::vertex::Vertex;
use braid_dag::metadata::VertexMetadata;
use braid_dag::store::{CommitBatch, DagRead};

use crate::changes::{ConsensusChangeSet, VertexChange};

/// Every write of one `process` call, layered over committed state.
///
/// Reads fall through to the base store; writes stay here until the engine
/// turns the overlay into one `CommitBatch`. Dropping the overlay discards
/// them, which is how rejected vertices leave no trace.
pub struct StagedDag<'a, R: DagRead + ?Sized> {
    base: &'a R,
    vertices: BTreeMap<VertexId, Vertex>,
    metadata: BTreeMap<VertexId, VertexMetadata>,
    /// Committed metadata of every touched vertex, `None` for new ones.
    before: BTreeMap<VertexId, Option<VertexMetadata>>,
    children: BTreeMap<VertexId, BTreeSet<VertexId>>,
}

impl<'a, R: DagRead + ?Sized> StagedDag<'a, R> {
    pub fn new(base: &'a R) -> Self {
        Self {
            base,
            vertices: BTreeMap::new(),
            metadata: BTreeMap::new(),
            before: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    /// Stage a new vertex with its initial metadata.
    pub fn insert(&mut self, vertex: Vertex, meta: VertexMetadata) {
        let id = vertex.id();
        for dep in vertex.dependencies() {
            self.children.entry(dep).or_default().insert(id);
        }
        self.before.insert(id, None);
        self.metadata.insert(id, meta);
        self.vertices.insert(id, vertex);
    }

    /// Mutable metadata for `id`, copied from the base store on first touch.
    pub fn metadata_mut(&mut self, id: &VertexId) -> Result<&mut VertexMetadata, ConsensusError> {
        if !self.metadata.contains_key(id) {
            let meta = self.base.require_metadata(id)?;
            self.before.insert(*id, Some(meta.clone()));
            self.metadata.insert(*id, meta);
        }
        self.metadata
            .get_mut(id)
            .ok_or(ConsensusError::NotFound(*id))
    }

    /// Ids whose metadata was touched, new vertices included.
    pub fn touched(&self) -> impl Iterator<Item = &VertexId> {
        self.metadata.keys()
    }

    /// Committed metadata of a touched vertex (`None` if new or untouched).
    pub fn original(&self, id: &VertexId) -> Option<&VertexMetadata> {
        self.before.get(id).and_then(Option::as_ref)
    }

    /// One entry per vertex that is new or whose metadata differs from the
    /// committed copy, in id order.
    pub fn change_set(&self, processed: VertexId) -> ConsensusChangeSet {
        let changes = self
            .metadata
            .iter()
            .filter_map(|(id, after)| {
                let before = self.original(id);
                let is_new = self.vertices.contains_key(id);
                if !is_new && before == Some(after) {
                    return None;
                }
                Some(VertexChange::new(*id, before, after.clone(), is_new))
            })
            .collect();
        ConsensusChangeSet { vertex: processed, changes }
    }

    pub fn into_batch(self) -> CommitBatch {
        let before = self.before;
        let metadata = self
            .metadata
            .into_iter()
            .filter(|(id, after)| match before.get(id) {
                Some(Some(prev)) => prev != after,
                _ => true,
            })
            .collect();
        CommitBatch { vertices: self.vertices.into_values().collect(), metadata }
    }
}

impl<R: DagRead + ?Sized> DagRead for StagedDag<'_, R> {
    fn get(&self, id: &VertexId) -> Result<Option<Vertex>, ConsensusError> {
        match self.vertices.get(id) {
            Some(v) => Ok(Some(v.clone())),
            None => self.base.get(id),
        }
    }

    fn get_metadata(&self, id: &VertexId) -> Result<Option<VertexMetadata>, ConsensusError> {
        match self.metadata.get(id) {
            Some(m) => Ok(Some(m.clone())),
            None => self.base.get_metadata(id),
        }
    }

    fn children_of(&self, id: &VertexId) -> Result<BTreeSet<VertexId>, ConsensusError> {
        let mut children = self.base.children_of(id)?;
        if let Some(staged) = self.children.get(id) {
            children.extend(staged.iter().copied());
        }
        Ok(children)
    }

    fn exists(&self, id: &VertexId) -> Result<bool, ConsensusError> {
        if self.vertices.contains_key(id) {
            return Ok(true);
        }
        self.base.exists(id)
    }
}
