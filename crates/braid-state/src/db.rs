use std::collections::BTreeSet;
use std::path::Path;

use braid_core::error::ConsensusError;
use braid_core::types::VertexId;
use braid_core::vertex::Vertex;
use braid_dag::metadata::VertexMetadata;
use braid_dag::store::{CommitBatch, DagRead, DagStore};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::{debug, info};

/// Layout version written into `meta` on first open.
const SCHEMA_VERSION: u8 = 1;
const SCHEMA_KEY: &[u8] = b"schema_version";

fn storage_err(e: sled::Error) -> ConsensusError {
    ConsensusError::StoreUnavailable(e.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ConsensusError> {
    bincode::deserialize(bytes).map_err(|e| ConsensusError::Serialization(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ConsensusError> {
    bincode::serialize(value).map_err(|e| ConsensusError::Serialization(e.to_string()))
}

/// Persistent DAG store backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   vertices   — VertexId bytes           → bincode(Vertex)
///   metadata   — VertexId bytes           → bincode(VertexMetadata)
///   children   — parent bytes ‖ child bytes → [] (membership set)
///   meta       — utf8 key bytes           → raw bytes
///
/// Vertices are append-only; metadata records are overwritten in place.
pub struct SledStore {
    db: sled::Db,
    vertices: sled::Tree,
    metadata: sled::Tree,
    children: sled::Tree,
    meta: sled::Tree,
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConsensusError> {
        let db = sled::open(path.as_ref()).map_err(storage_err)?;
        Self::from_db(db)
    }

    /// Throwaway store that is removed when dropped.
    pub fn temporary() -> Result<Self, ConsensusError> {
        let db = sled::Config::new().temporary(true).open().map_err(storage_err)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, ConsensusError> {
        let vertices = db.open_tree("vertices").map_err(storage_err)?;
        let metadata = db.open_tree("metadata").map_err(storage_err)?;
        let children = db.open_tree("children").map_err(storage_err)?;
        let meta     = db.open_tree("meta").map_err(storage_err)?;

        match meta.get(SCHEMA_KEY).map_err(storage_err)? {
            Some(v) if v.as_ref() != &[SCHEMA_VERSION][..] => {
                return Err(ConsensusError::Serialization(format!(
                    "unsupported store layout version {:?}",
                    v.as_ref()
                )));
            }
            Some(_) => {}
            None => {
                meta.insert(SCHEMA_KEY, &[SCHEMA_VERSION][..]).map_err(storage_err)?;
            }
        }

        info!(vertices = vertices.len(), "sled store opened");
        Ok(Self { db, vertices, metadata, children, meta })
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, ConsensusError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage_err)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), ConsensusError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

fn child_key(parent: &VertexId, child: &VertexId) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(parent.as_bytes());
    key.extend_from_slice(child.as_bytes());
    key
}

impl DagRead for SledStore {
    fn get(&self, id: &VertexId) -> Result<Option<Vertex>, ConsensusError> {
        match self.vertices.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_metadata(&self, id: &VertexId) -> Result<Option<VertexMetadata>, ConsensusError> {
        match self.metadata.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn children_of(&self, id: &VertexId) -> Result<BTreeSet<VertexId>, ConsensusError> {
        let mut out = BTreeSet::new();
        for item in self.children.scan_prefix(id.as_bytes()) {
            let (key, _) = item.map_err(storage_err)?;
            let child = VertexId::from_slice(&key[32..]).ok_or_else(|| {
                ConsensusError::Serialization(format!("malformed children key of {} bytes", key.len()))
            })?;
            out.insert(child);
        }
        Ok(out)
    }

    fn exists(&self, id: &VertexId) -> Result<bool, ConsensusError> {
        self.vertices.contains_key(id.as_bytes()).map_err(storage_err)
    }
}

impl DagStore for SledStore {
    fn commit(&self, batch: CommitBatch) -> Result<(), ConsensusError> {
        if batch.is_empty() {
            return Ok(());
        }

        // Serialize up front: the transaction closure may run more than once.
        let mut vertex_rows = Vec::with_capacity(batch.vertices.len());
        let mut child_rows = Vec::new();
        for vertex in &batch.vertices {
            let id = vertex.id();
            vertex_rows.push((id, encode(vertex)?));
            for dep in vertex.dependencies() {
                child_rows.push(child_key(&dep, &id));
            }
        }
        let mut meta_rows = Vec::with_capacity(batch.metadata.len());
        for (id, meta) in &batch.metadata {
            meta_rows.push((*id, encode(meta)?));
        }

        (&self.vertices, &self.metadata, &self.children)
            .transaction(|(vertices, metadata, children)| {
                for (id, bytes) in &vertex_rows {
                    vertices.insert(&id.as_bytes()[..], bytes.as_slice())?;
                }
                for key in &child_rows {
                    children.insert(key.as_slice(), &b""[..])?;
                }
                for (id, bytes) in &meta_rows {
                    metadata.insert(&id.as_bytes()[..], bytes.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => storage_err(e),
                TransactionError::Abort(()) => {
                    ConsensusError::StoreUnavailable("commit aborted".into())
                }
            })?;

        debug!(
            vertices = vertex_rows.len(),
            metadata = meta_rows.len(),
            "sled batch committed"
        );
        Ok(())
    }

    fn vertex_ids(&self) -> Result<Vec<VertexId>, ConsensusError> {
        let mut ids = Vec::with_capacity(self.vertices.len());
        for key in self.vertices.iter().keys() {
            let key = key.map_err(storage_err)?;
            let id = VertexId::from_slice(&key).ok_or_else(|| {
                ConsensusError::Serialization(format!("malformed vertex key of {} bytes", key.len()))
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn is_empty(&self) -> Result<bool, ConsensusError> {
        Ok(self.vertices.is_empty())
    }
}
