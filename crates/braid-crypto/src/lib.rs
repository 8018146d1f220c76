pub mod hash;
pub mod pow;

pub use hash::{compute_vertex_id, seal, vertex_id_from_body};
pub use pow::{mine_pow, pow_hash, resolve, solution_weight, verify_pow, vertex_solution_weight};
