pub mod genesis;
pub mod metadata;
pub mod store;
pub mod twin;
pub mod validation;
pub mod walker;

pub use genesis::{genesis_block, genesis_vertices};
pub use metadata::VertexMetadata;
pub use store::{CommitBatch, DagRead, DagStore, MemoryStore};
pub use twin::{make_twin, TwinOptions};
pub use validation::validate_vertex;
pub use walker::{DagWalker, Direction, Walk};
