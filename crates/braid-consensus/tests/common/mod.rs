#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use braid_consensus::ConsensusEngine;
use braid_core::clock::ManualClock;
use braid_core::config::ConsensusConfig;
use braid_core::constants::GENESIS_TIMESTAMP;
use braid_core::types::{VertexId, Weight};
use braid_core::vertex::{Block, Transaction, TxInput, TxOutput, Vertex};
use braid_crypto::seal;
use braid_dag::genesis::genesis_vertices;
use braid_dag::store::DagStore;

/// Low minimum weights and no proof-of-work so scenarios can pick exact weights.
pub fn test_config() -> ConsensusConfig {
    ConsensusConfig {
        min_block_weight: 1.0,
        min_tx_weight: 1.0,
        verify_pow: false,
        ..ConsensusConfig::default()
    }
}

/// Engine plus the genesis ids and a timestamp source for new vertices.
pub struct Harness<S: DagStore> {
    pub engine: Arc<ConsensusEngine<S>>,
    /// Genesis block.
    pub g: VertexId,
    /// Genesis transactions.
    pub g1: VertexId,
    pub g2: VertexId,
    next_ts: AtomicI64,
}

impl<S: DagStore> Harness<S> {
    pub fn new(store: Arc<S>) -> Self {
        let clock = Arc::new(ManualClock::new(GENESIS_TIMESTAMP + 1_000_000));
        let engine = ConsensusEngine::open(store, test_config(), clock).expect("open engine");
        let genesis = genesis_vertices(engine.config());
        Self {
            engine: Arc::new(engine),
            g: genesis[0].id(),
            g1: genesis[1].id(),
            g2: genesis[2].id(),
            next_ts: AtomicI64::new(GENESIS_TIMESTAMP + 10),
        }
    }

    /// Strictly increasing timestamps, so dependencies are always older.
    pub fn ts(&self) -> i64 {
        self.next_ts.fetch_add(1, Ordering::SeqCst)
    }

    pub fn tx(
        &self,
        parents: [VertexId; 2],
        inputs: &[(VertexId, u8)],
        outputs: &[u64],
        weight: Weight,
    ) -> Vertex {
        make_tx(parents, inputs, outputs, weight, self.ts())
    }

    pub fn block(&self, parents: [VertexId; 3], weight: Weight) -> Vertex {
        make_block(parents, weight, self.ts())
    }

    /// Process a transaction spending the genesis allocation into `n` outputs.
    pub fn fan_out(&self, n: u8) -> VertexId {
        let values: Vec<u64> = (1..=n as u64).collect();
        let fan = self.tx([self.g1, self.g2], &[(self.g, 0)], &values, 1.0);
        let id = fan.id();
        self.engine.process(fan).expect("fan-out accepted");
        id
    }

    pub fn voided_by(&self, id: &VertexId) -> Vec<VertexId> {
        let meta = self.engine.get_metadata(id).unwrap().expect("metadata");
        meta.voided_by.into_iter().collect()
    }

    pub fn accumulated(&self, id: &VertexId) -> Weight {
        self.engine.get_metadata(id).unwrap().expect("metadata").accumulated_weight
    }
}

pub fn make_tx(
    parents: [VertexId; 2],
    inputs: &[(VertexId, u8)],
    outputs: &[u64],
    weight: Weight,
    timestamp: i64,
) -> Vertex {
    let mut v = Vertex::Transaction(Transaction {
        id: VertexId::from_bytes([0; 32]),
        parents: parents.to_vec(),
        timestamp,
        weight,
        nonce: 0,
        inputs: inputs
            .iter()
            .map(|(tx_id, index)| TxInput { tx_id: *tx_id, index: *index, data: vec![] })
            .collect(),
        outputs: outputs
            .iter()
            .map(|value| TxOutput { value: *value, script: vec![0x76, 0xA9], token_data: 0 })
            .collect(),
        tokens: vec![],
    });
    seal(&mut v);
    v
}

pub fn make_block(parents: [VertexId; 3], weight: Weight, timestamp: i64) -> Vertex {
    let mut v = Vertex::Block(Block {
        id: VertexId::from_bytes([0; 32]),
        parents: parents.to_vec(),
        timestamp,
        weight,
        nonce: 0,
        outputs: vec![TxOutput { value: 6400, script: vec![0x76, 0xA9], token_data: 0 }],
        data: vec![],
    });
    seal(&mut v);
    v
}
