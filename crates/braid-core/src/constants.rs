/// ─── Braid Network Constants ────────────────────────────────────────────────
///
/// Defaults for `ConsensusConfig`. Nodes on one network must agree on every
/// value below that feeds a consensus decision.

// ── Weights ──────────────────────────────────────────────────────────────────

/// Weight of the genesis block and minimum weight of any block.
pub const MIN_BLOCK_WEIGHT: f64 = 21.0;

/// Weight of the genesis transactions and minimum weight of any transaction.
pub const MIN_TX_WEIGHT: f64 = 14.0;

/// Tolerance used whenever two weights, accumulated weights or scores are
/// compared. `|w1 - w2| <= WEIGHT_TOL` means equal.
pub const WEIGHT_TOL: f64 = 1e-10;

// ── Difficulty ───────────────────────────────────────────────────────────────

/// Target average time between blocks (seconds).
pub const AVG_TIME_BETWEEN_BLOCKS: u64 = 30;

/// Number of block intervals in the hash-rate estimation window.
pub const BLOCK_DIFFICULTY_N_BLOCKS: usize = 20;

/// Maximum change in block weight between consecutive blocks. The hash rate
/// estimator overreacts when the rate moves; this limit damps the ripple.
pub const BLOCK_DIFFICULTY_MAX_DW: f64 = 0.25;

// ── Timestamps ───────────────────────────────────────────────────────────────

/// Maximum distance between a vertex timestamp and local time (seconds).
pub const MAX_FUTURE_TIMESTAMP_ALLOWED: i64 = 3600;

/// Maximum distance between two consecutive blocks (seconds), genesis excepted.
/// Bounds the cost of scoring a side chain. P(t > T) = 1/e^30.
pub const MAX_DISTANCE_BETWEEN_BLOCKS: i64 = 30 * 64;

// ── DAG shape ────────────────────────────────────────────────────────────────

/// Parents of a transaction: two transactions.
pub const TX_PARENTS: usize = 2;

/// Parents of a block: one block followed by two transactions.
pub const BLOCK_PARENTS: usize = 3;

/// Size limit in bytes for the block `data` field.
pub const BLOCK_DATA_MAX_SIZE: usize = 100;

// ── Genesis ──────────────────────────────────────────────────────────────────

pub const DECIMAL_PLACES: u32 = 2;

/// Pre-mined native token units held by the genesis block output.
pub const GENESIS_TOKENS: u64 = 2_000_000_000 * 10u64.pow(DECIMAL_PLACES);

/// Genesis reference time: 2019-01-01 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: i64 = 1_546_300_800;

/// P2PKH output script holding the genesis allocation.
pub const GENESIS_OUTPUT_SCRIPT: &str = "76a914a584cf48b161e4a49223ed220df30037ab740e0088ac";
