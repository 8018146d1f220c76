use std::collections::{BTreeSet, HashMap};

use braid_core::error::ConsensusError;
use braid_core::types::VertexId;
use braid_core::vertex::Vertex;
use parking_lot::RwLock;

use crate::metadata::VertexMetadata;

/// Read access to vertices, their metadata and the children index.
///
/// "Children" are dependents: vertices naming this one as a parent or
/// spending one of its outputs.
pub trait DagRead {
    fn get(&self, id: &VertexId) -> Result<Option<Vertex>, ConsensusError>;

    fn get_metadata(&self, id: &VertexId) -> Result<Option<VertexMetadata>, ConsensusError>;

    fn children_of(&self, id: &VertexId) -> Result<BTreeSet<VertexId>, ConsensusError>;

    fn exists(&self, id: &VertexId) -> Result<bool, ConsensusError> {
        Ok(self.get(id)?.is_some())
    }

    fn require(&self, id: &VertexId) -> Result<Vertex, ConsensusError> {
        self.get(id)?.ok_or(ConsensusError::NotFound(*id))
    }

    fn require_metadata(&self, id: &VertexId) -> Result<VertexMetadata, ConsensusError> {
        self.get_metadata(id)?.ok_or(ConsensusError::NotFound(*id))
    }
}

/// Everything a single `process` call writes. Applied all-or-nothing.
#[derive(Debug, Default, Clone)]
pub struct CommitBatch {
    /// New vertices; the store indexes them under each dependency.
    pub vertices: Vec<Vertex>,
    pub metadata: Vec<(VertexId, VertexMetadata)>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.metadata.is_empty()
    }
}

/// Append-only keyed store of vertices plus their mutable metadata.
pub trait DagStore: DagRead + Send + Sync {
    /// Apply the batch atomically: either every write lands or none does.
    fn commit(&self, batch: CommitBatch) -> Result<(), ConsensusError>;

    fn vertex_ids(&self) -> Result<Vec<VertexId>, ConsensusError>;

    fn is_empty(&self) -> Result<bool, ConsensusError> {
        Ok(self.vertex_ids()?.is_empty())
    }

    fn put(&self, vertex: Vertex) -> Result<(), ConsensusError> {
        self.commit(CommitBatch { vertices: vec![vertex], metadata: Vec::new() })
    }

    fn put_metadata(&self, id: VertexId, meta: VertexMetadata) -> Result<(), ConsensusError> {
        self.commit(CommitBatch { vertices: Vec::new(), metadata: vec![(id, meta)] })
    }
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    vertices: HashMap<VertexId, Vertex>,
    metadata: HashMap<VertexId, VertexMetadata>,
    children: HashMap<VertexId, BTreeSet<VertexId>>,
}

/// In-process `DagStore`. Commits happen under one write lock, so readers
/// observe either the whole batch or none of it.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().vertices.len()
    }
}

impl DagRead for MemoryStore {
    fn get(&self, id: &VertexId) -> Result<Option<Vertex>, ConsensusError> {
        Ok(self.inner.read().vertices.get(id).cloned())
    }

    fn get_metadata(&self, id: &VertexId) -> Result<Option<VertexMetadata>, ConsensusError> {
        Ok(self.inner.read().metadata.get(id).cloned())
    }

    fn children_of(&self, id: &VertexId) -> Result<BTreeSet<VertexId>, ConsensusError> {
        Ok(self.inner.read().children.get(id).cloned().unwrap_or_default())
    }

    fn exists(&self, id: &VertexId) -> Result<bool, ConsensusError> {
        Ok(self.inner.read().vertices.contains_key(id))
    }
}

impl DagStore for MemoryStore {
    fn commit(&self, batch: CommitBatch) -> Result<(), ConsensusError> {
        let mut inner = self.inner.write();
        for vertex in batch.vertices {
            let id = vertex.id();
            for dep in vertex.dependencies() {
                inner.children.entry(dep).or_default().insert(id);
            }
            inner.vertices.insert(id, vertex);
        }
        for (id, meta) in batch.metadata {
            inner.metadata.insert(id, meta);
        }
        Ok(())
    }

    fn vertex_ids(&self) -> Result<Vec<VertexId>, ConsensusError> {
        let mut ids: Vec<VertexId> = self.inner.read().vertices.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
