//! The genesis vertices: one block holding the pre-mined allocation and two
//! empty transactions that the first transactions of the network confirm.
//!
//! They are the only parentless vertices. They bypass validation and are
//! written straight into an empty store at bootstrap. Their weights follow
//! the configured minimums so every node on a network derives the same ids.

use braid_core::config::ConsensusConfig;
use braid_core::constants::{GENESIS_OUTPUT_SCRIPT, GENESIS_TIMESTAMP, GENESIS_TOKENS};
use braid_core::types::VertexId;
use braid_core::vertex::{Block, Transaction, TxOutput, Vertex};
use braid_crypto::seal;

pub fn genesis_block(config: &ConsensusConfig) -> Vertex {
    let script = hex::decode(GENESIS_OUTPUT_SCRIPT).expect("genesis script is valid hex");
    let mut block = Vertex::Block(Block {
        id: VertexId::from_bytes([0; 32]),
        parents: Vec::new(),
        timestamp: GENESIS_TIMESTAMP,
        weight: config.min_block_weight,
        nonce: 0,
        outputs: vec![TxOutput { value: GENESIS_TOKENS, script, token_data: 0 }],
        data: Vec::new(),
    });
    seal(&mut block);
    block
}

fn genesis_tx(config: &ConsensusConfig, offset: i64) -> Vertex {
    let mut tx = Vertex::Transaction(Transaction {
        id: VertexId::from_bytes([0; 32]),
        parents: Vec::new(),
        timestamp: GENESIS_TIMESTAMP + offset,
        weight: config.min_tx_weight,
        nonce: 0,
        inputs: Vec::new(),
        outputs: Vec::new(),
        tokens: Vec::new(),
    });
    seal(&mut tx);
    tx
}

/// `[block, tx1, tx2]`, deterministic for a given config.
pub fn genesis_vertices(config: &ConsensusConfig) -> Vec<Vertex> {
    vec![genesis_block(config), genesis_tx(config, 1), genesis_tx(config, 2)]
}
