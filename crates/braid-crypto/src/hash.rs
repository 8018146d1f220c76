use braid_core::types::VertexId;
use braid_core::vertex::Vertex;

/// Derive a VertexId from canonical body bytes and the proof-of-work nonce.
pub fn vertex_id_from_body(body_bytes: &[u8], nonce: u64) -> VertexId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(body_bytes);
    hasher.update(&nonce.to_le_bytes());
    VertexId::from_bytes(*hasher.finalize().as_bytes())
}

/// The id a vertex should carry given its current contents.
pub fn compute_vertex_id(vertex: &Vertex) -> VertexId {
    vertex_id_from_body(&vertex.body_bytes(), vertex.nonce())
}

/// Stamp the vertex with the id matching its contents. Used once the nonce is
/// final (after mining, or directly when proof-of-work checks are disabled).
pub fn seal(vertex: &mut Vertex) -> VertexId {
    let id = compute_vertex_id(vertex);
    vertex.set_id(id);
    id
}
