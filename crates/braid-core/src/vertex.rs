use serde::{Deserialize, Serialize};

use crate::types::{Timestamp, TokenUid, VertexId, Weight};

// ── Inputs / outputs ──────────────────────────────────────────────────────────

/// Reference to an output being spent, plus its unlocking data.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxInput {
    /// Vertex (block or transaction) that created the output.
    pub tx_id: VertexId,
    /// Position of the output inside that vertex.
    pub index: u8,
    /// Unlocking data (signature + public key for P2PKH scripts).
    pub data: Vec<u8>,
}

impl TxInput {
    /// The spent resource, ignoring unlocking data.
    pub fn outpoint(&self) -> (VertexId, u8) {
        (self.tx_id, self.index)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
    /// Index into the transaction's token table; 0 is the native token.
    pub token_data: u8,
}

// ── Vertex kinds ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VertexKind {
    Block,
    Transaction,
}

/// A block: one block parent followed by two transaction parents.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: VertexId,
    pub parents: Vec<VertexId>,
    pub timestamp: Timestamp,
    pub weight: Weight,
    pub nonce: u64,
    /// Reward outputs.
    pub outputs: Vec<TxOutput>,
    /// Free-form miner data.
    pub data: Vec<u8>,
}

/// A transaction: two transaction parents, spent inputs and new outputs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: VertexId,
    pub parents: Vec<VertexId>,
    pub timestamp: Timestamp,
    pub weight: Weight,
    pub nonce: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub tokens: Vec<TokenUid>,
}

/// A node of the DAG.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Vertex {
    Block(Block),
    Transaction(Transaction),
}

/// The bytes that are hashed to produce the vertex id and the proof of work.
/// Excludes `id` and `nonce`; both hashes append `nonce_le` separately so the
/// body stays stable while mining.
#[derive(Serialize)]
enum VertexBody<'a> {
    Block {
        parents: &'a [VertexId],
        timestamp: Timestamp,
        weight: Weight,
        outputs: &'a [TxOutput],
        data: &'a [u8],
    },
    Transaction {
        parents: &'a [VertexId],
        timestamp: Timestamp,
        weight: Weight,
        inputs: &'a [TxInput],
        outputs: &'a [TxOutput],
        tokens: &'a [TokenUid],
    },
}

impl Vertex {
    pub fn id(&self) -> VertexId {
        match self {
            Vertex::Block(b) => b.id,
            Vertex::Transaction(tx) => tx.id,
        }
    }

    pub fn kind(&self) -> VertexKind {
        match self {
            Vertex::Block(_) => VertexKind::Block,
            Vertex::Transaction(_) => VertexKind::Transaction,
        }
    }

    pub fn parents(&self) -> &[VertexId] {
        match self {
            Vertex::Block(b) => &b.parents,
            Vertex::Transaction(tx) => &tx.parents,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Vertex::Block(b) => b.timestamp,
            Vertex::Transaction(tx) => tx.timestamp,
        }
    }

    pub fn weight(&self) -> Weight {
        match self {
            Vertex::Block(b) => b.weight,
            Vertex::Transaction(tx) => tx.weight,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Vertex::Block(b) => b.nonce,
            Vertex::Transaction(tx) => tx.nonce,
        }
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        match self {
            Vertex::Block(b) => b.nonce = nonce,
            Vertex::Transaction(tx) => tx.nonce = nonce,
        }
    }

    pub fn set_id(&mut self, id: VertexId) {
        match self {
            Vertex::Block(b) => b.id = id,
            Vertex::Transaction(tx) => tx.id = id,
        }
    }

    pub fn outputs(&self) -> &[TxOutput] {
        match self {
            Vertex::Block(b) => &b.outputs,
            Vertex::Transaction(tx) => &tx.outputs,
        }
    }

    /// Inputs spent by this vertex. Blocks spend nothing.
    pub fn inputs(&self) -> &[TxInput] {
        match self {
            Vertex::Block(_) => &[],
            Vertex::Transaction(tx) => &tx.inputs,
        }
    }

    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Vertex::Transaction(tx) => Some(tx),
            Vertex::Block(_) => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Vertex::Block(_))
    }

    pub fn is_genesis(&self) -> bool {
        self.parents().is_empty()
    }

    /// For blocks, the previous block of the chain.
    pub fn block_parent(&self) -> Option<VertexId> {
        match self {
            Vertex::Block(b) => b.parents.first().copied(),
            Vertex::Transaction(_) => None,
        }
    }

    /// Parents followed by every distinct vertex whose outputs are spent.
    ///
    /// This is the causal relation of the DAG: ancestors, descendants and the
    /// children index are all defined over dependencies, so a spender always
    /// descends from the vertex that funded it.
    pub fn dependencies(&self) -> Vec<VertexId> {
        let mut deps: Vec<VertexId> = self.parents().to_vec();
        for input in self.inputs() {
            if !deps.contains(&input.tx_id) {
                deps.push(input.tx_id);
            }
        }
        deps
    }

    fn body(&self) -> VertexBody<'_> {
        match self {
            Vertex::Block(b) => VertexBody::Block {
                parents: &b.parents,
                timestamp: b.timestamp,
                weight: b.weight,
                outputs: &b.outputs,
                data: &b.data,
            },
            Vertex::Transaction(tx) => VertexBody::Transaction {
                parents: &tx.parents,
                timestamp: tx.timestamp,
                weight: tx.weight,
                inputs: &tx.inputs,
                outputs: &tx.outputs,
                tokens: &tx.tokens,
            },
        }
    }

    /// Serialize the body to canonical bytes (bincode).
    pub fn body_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.body()).expect("body serialization is infallible")
    }
}

impl From<Block> for Vertex {
    fn from(b: Block) -> Self {
        Vertex::Block(b)
    }
}

impl From<Transaction> for Vertex {
    fn from(tx: Transaction) -> Self {
        Vertex::Transaction(tx)
    }
}
