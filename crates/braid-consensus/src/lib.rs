pub mod changes;
pub mod conflict;
pub mod difficulty;
pub mod engine;
pub mod staged;
pub mod twins;
pub mod voiding;
pub mod weight;

pub use changes::{ConsensusChangeSet, VertexChange, VoidedTransition};
pub use conflict::{ConflictResolver, Resolution};
pub use difficulty::{next_block_weight, required_difficulty, BlockSample};
pub use engine::{BestBlock, ConsensusEngine};
pub use staged::StagedDag;
pub use twins::TwinClassifier;
pub use voiding::VoidingPropagator;
pub use weight::{sum_all, sum_weights, WeightModel};
