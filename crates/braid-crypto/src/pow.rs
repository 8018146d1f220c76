use braid_core::types::Weight;
use braid_core::vertex::Vertex;
use sha3::{Digest, Sha3_256};

use crate::hash::seal;

/// sha3_256(body_bytes || nonce_le): the proof-of-work solution.
pub fn pow_hash(body_bytes: &[u8], nonce: u64) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(body_bytes);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

/// Weight proved by a solution hash: log2 of the expected number of attempts
/// needed to find a hash at most this small, i.e. `256 - log2(hash + 1)`.
///
/// The integer part is the leading-zero-bit count; the fraction comes from
/// the following bits. A hash of all zeros proves the full 256 bits.
pub fn solution_weight(hash: &[u8; 32]) -> Weight {
    let lz = leading_zero_bits(hash) as usize;
    if lz >= 256 {
        return 256.0;
    }
    // 64 significant bits starting at the first set bit are plenty for f64.
    let mut mantissa = 0u64;
    for bit in lz..(lz + 64).min(256) {
        let set = hash[bit / 8] & (0x80 >> (bit % 8)) != 0;
        mantissa = (mantissa << 1) | set as u64;
    }
    let taken = (lz + 64).min(256) - lz;
    // hash ≈ mantissa · 2^(256 - lz - taken)
    let log2_hash = (mantissa as f64).log2() + (256 - lz - taken) as f64;
    (256.0 - log2_hash).max(0.0)
}

/// Weight proved by the vertex's current nonce.
pub fn vertex_solution_weight(vertex: &Vertex) -> Weight {
    solution_weight(&pow_hash(&vertex.body_bytes(), vertex.nonce()))
}

/// Whether the current nonce proves at least the declared weight.
pub fn verify_pow(vertex: &Vertex) -> bool {
    vertex_solution_weight(vertex) >= vertex.weight()
}

/// Find a nonce whose solution proves at least `weight` over `body_bytes`.
pub fn mine_pow(body_bytes: &[u8], weight: Weight) -> u64 {
    for nonce in 0u64.. {
        if solution_weight(&pow_hash(body_bytes, nonce)) >= weight {
            return nonce;
        }
    }
    unreachable!("PoW loop exhausted u64 range")
}

/// Mine the vertex at its declared weight and stamp the resulting id.
pub fn resolve(vertex: &mut Vertex) {
    let nonce = mine_pow(&vertex.body_bytes(), vertex.weight());
    vertex.set_nonce(nonce);
    seal(vertex);
}

pub fn leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut count = 0u32;
    for byte in hash {
        let lz = byte.leading_zeros();
        count += lz;
        if lz < 8 {
            break;
        }
    }
    count
}
