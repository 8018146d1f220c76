use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use braid_core::clock::Clock;
use braid_core::config::ConsensusConfig;
use braid_core::error::ConsensusError;
use braid_core::types::{VertexId, Weight};
use braid_core::vertex::Vertex;
use braid_dag::genesis::genesis_vertices;
use braid_dag::metadata::VertexMetadata;
use braid_dag::store::{CommitBatch, DagRead, DagStore};
use braid_dag::validation::validate_vertex;
use braid_dag::walker::DagWalker;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::changes::{ConsensusChangeSet, VertexChange};
use crate::conflict::ConflictResolver;
use crate::difficulty;
use crate::staged::StagedDag;
use crate::twins::TwinClassifier;
use crate::voiding::VoidingPropagator;
use crate::weight::{sum_all, sum_weights, WeightModel};

/// Capacity of the change notification channel. Slow subscribers lag and
/// miss the oldest changes rather than stalling `process`.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Tip of the heaviest chain seen so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestBlock {
    pub id: VertexId,
    pub score: Weight,
    pub height: u64,
}

// ── ConsensusEngine ───────────────────────────────────────────────────────────

/// Decides, for every vertex, whether it is executed or voided.
///
/// `process` is single-writer: calls are serialized on one lock and every
/// mutation is staged until a single atomic commit. Readers go straight to
/// the store and only ever see committed state.
pub struct ConsensusEngine<S: DagStore> {
    store: Arc<S>,
    config: ConsensusConfig,
    model: WeightModel,
    resolver: ConflictResolver,
    clock: Arc<dyn Clock>,
    writer: Mutex<()>,
    halted: AtomicBool,
    best: RwLock<Option<BestBlock>>,
    notifier: broadcast::Sender<VertexChange>,
}

impl<S: DagStore> ConsensusEngine<S> {
    /// Attach to `store`, writing genesis if it is empty and recovering the
    /// best block otherwise.
    pub fn open(
        store: Arc<S>,
        config: ConsensusConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConsensusError> {
        config.validate()?;
        let model = WeightModel::new(&config);
        let (notifier, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let engine = Self {
            store,
            resolver: ConflictResolver::new(model),
            model,
            config,
            clock,
            writer: Mutex::new(()),
            halted: AtomicBool::new(false),
            best: RwLock::new(None),
            notifier,
        };

        if engine.store.is_empty()? {
            engine.bootstrap()?;
        } else {
            let best = engine.recover_best_block()?;
            info!(best = ?best.map(|b| b.id), "consensus engine attached to existing store");
            *engine.best.write() = best;
        }
        Ok(engine)
    }

    /// Write the genesis vertices into an empty store.
    pub fn bootstrap(&self) -> Result<Vec<VertexId>, ConsensusError> {
        let _guard = self.writer.lock();
        let genesis = genesis_vertices(&self.config);
        for vertex in &genesis {
            if self.store.exists(&vertex.id())? {
                return Err(ConsensusError::DuplicateVertex(vertex.id()));
            }
        }

        let mut batch = CommitBatch::default();
        let mut best = None;
        for vertex in &genesis {
            let mut meta = VertexMetadata::new(vertex.weight());
            if vertex.is_block() {
                meta.score = vertex.weight();
                best = Some(BestBlock { id: vertex.id(), score: meta.score, height: 0 });
            }
            batch.metadata.push((vertex.id(), meta));
        }
        batch.vertices = genesis.clone();
        self.store.commit(batch)?;
        *self.best.write() = best;

        let ids: Vec<VertexId> = genesis.iter().map(Vertex::id).collect();
        info!(block = %ids[0], "genesis written");
        Ok(ids)
    }

    fn recover_best_block(&self) -> Result<Option<BestBlock>, ConsensusError> {
        let mut best: Option<BestBlock> = None;
        for id in self.store.vertex_ids()? {
            if !self.store.require(&id)?.is_block() {
                continue;
            }
            let meta = self.store.require_metadata(&id)?;
            let candidate = BestBlock { id, score: meta.score, height: meta.height };
            if self.beats(&candidate, best.as_ref()) {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    /// Higher score wins; within tolerance the smaller id.
    fn beats(&self, candidate: &BestBlock, current: Option<&BestBlock>) -> bool {
        match current {
            None => true,
            Some(cur) if self.model.gt(candidate.score, cur.score) => true,
            Some(cur) => self.model.eq(candidate.score, cur.score) && candidate.id < cur.id,
        }
    }

    // ── Processing ────────────────────────────────────────────────────────────

    /// Accept a validated vertex and update consensus state around it.
    ///
    /// Rejections leave the store untouched. A fatal error halts the engine.
    pub fn process(&self, vertex: Vertex) -> Result<ConsensusChangeSet, ConsensusError> {
        let _guard = self.writer.lock();
        if self.halted.load(Ordering::SeqCst) {
            return Err(ConsensusError::ConsensusInvariantViolation(
                "engine halted after a fatal error".into(),
            ));
        }

        let id = vertex.id();
        let result = self.process_locked(vertex);
        match &result {
            Ok(changes) => {
                for change in &changes.changes {
                    // No subscribers is fine.
                    let _ = self.notifier.send(change.clone());
                }
            }
            Err(e) if e.is_fatal() => {
                self.halted.store(true, Ordering::SeqCst);
                error!(vertex = %id, error = %e, "fatal consensus error, engine halted");
            }
            Err(e) if e.is_retryable() => {
                debug!(vertex = %id, error = %e, "vertex deferred");
            }
            Err(e) => {
                warn!(vertex = %id, error = %e, "vertex rejected");
            }
        }
        result
    }

    fn process_locked(&self, vertex: Vertex) -> Result<ConsensusChangeSet, ConsensusError> {
        let id = vertex.id();
        let store = &*self.store;

        // ── 1. Validation ─────────────────────────────────────────────────────
        if store.exists(&id)? {
            return Err(ConsensusError::DuplicateVertex(id));
        }
        validate_vertex(store, &vertex, &self.config, self.clock.as_ref())?;
        if self.config.verify_pow {
            let solved = self.model.vertex_weight(&vertex);
            if self.model.lt(solved, vertex.weight()) {
                return Err(ConsensusError::InvalidPoW { solved, declared: vertex.weight() });
            }
        }
        if let Some(parent) = vertex.block_parent() {
            let required = difficulty::required_difficulty(store, &parent, &self.config)?;
            if self.model.lt(vertex.weight(), required) {
                return Err(ConsensusError::WeightTooLow { weight: vertex.weight(), min: required });
            }
        }

        // ── 2. Stage the vertex ───────────────────────────────────────────────
        let weight = vertex.weight();
        let mut staged = StagedDag::new(store);
        staged.insert(vertex.clone(), VertexMetadata::new(weight));
        let ancestors = DagWalker::new(&staged).collect_ancestors(&id)?;

        // ── 3. Weights, score, height ─────────────────────────────────────────
        let mut past_weights = Vec::with_capacity(ancestors.len() + 1);
        past_weights.push(weight);
        for ancestor in &ancestors {
            past_weights.push(staged.require(ancestor)?.weight());
            let meta = staged.metadata_mut(ancestor)?;
            meta.accumulated_weight = sum_weights(meta.accumulated_weight, weight);
        }
        if let Some(parent) = vertex.block_parent() {
            let height = staged.require_metadata(&parent)?.height + 1;
            let meta = staged.metadata_mut(&id)?;
            meta.score = sum_all(past_weights);
            meta.height = height;
        }

        // ── 4. Conflicts ──────────────────────────────────────────────────────
        let conflicts = self.resolver.find_conflicts(&staged, &vertex, &ancestors)?;
        for input in vertex.inputs() {
            staged
                .metadata_mut(&input.tx_id)?
                .spent_outputs
                .entry(input.index)
                .or_default()
                .insert(id);
        }
        for other in &conflicts {
            staged.metadata_mut(other)?.conflict_with.insert(id);
            staged.metadata_mut(&id)?.conflict_with.insert(*other);
        }

        // ── 5. Twins ──────────────────────────────────────────────────────────
        for twin in TwinClassifier::find_twins(&staged, &vertex, &conflicts)? {
            TwinClassifier::link(&mut staged, &id, &twin)?;
        }

        // ── 6. Re-resolve every set the new weight can affect ─────────────────
        let mut members = BTreeSet::new();
        for v in ancestors.iter().chain(std::iter::once(&id)) {
            if staged.require_metadata(v)?.conflict_with.is_empty() {
                continue;
            }
            for set in self.resolver.conflict_sets(&staged, v)? {
                members.extend(set);
            }
        }
        let mut flipped = BTreeSet::new();
        for member in &members {
            let own = self.resolver.own_losses(&staged, member)?;
            let meta = staged.metadata_mut(member)?;
            let was_losing = !meta.own_losses().is_empty();
            let mut voided_by = meta.inherited_voids();
            voided_by.extend(own.iter().copied());
            meta.voided_by = voided_by;
            if was_losing != !own.is_empty() {
                debug!(vertex = %member, losing = !own.is_empty(), "conflict outcome flipped");
                flipped.insert(*member);
            }
        }

        // ── 7. Voiding ────────────────────────────────────────────────────────
        VoidingPropagator::refresh(&mut staged, &id)?;
        let refreshed = VoidingPropagator::propagate_all(&mut staged, &flipped)?;

        // ── 8. Invariants and commit ──────────────────────────────────────────
        self.check_invariants(&staged)?;
        let changes = staged.change_set(id);
        let meta = staged.require_metadata(&id)?;
        store.commit(staged.into_batch())?;

        // ── 9. Best block ─────────────────────────────────────────────────────
        if vertex.is_block() {
            let candidate = BestBlock { id, score: meta.score, height: meta.height };
            let mut best = self.best.write();
            if self.beats(&candidate, best.as_ref()) {
                debug!(block = %id, score = meta.score, height = meta.height, "new best block");
                *best = Some(candidate);
            }
        }

        info!(
            vertex = %id,
            kind = ?vertex.kind(),
            voided = meta.is_voided(),
            conflicts = conflicts.len(),
            flipped = flipped.len(),
            refreshed,
            changed = changes.len(),
            "vertex processed"
        );
        Ok(changes)
    }

    fn check_invariants<R: DagRead + ?Sized>(
        &self,
        staged: &StagedDag<'_, R>,
    ) -> Result<(), ConsensusError> {
        let violation = |msg: String| Err(ConsensusError::ConsensusInvariantViolation(msg));
        for id in staged.touched() {
            let meta = staged.require_metadata(id)?;
            if !meta.accumulated_weight.is_finite() {
                return violation(format!("accumulated weight of {id} is not finite"));
            }
            if let Some(before) = staged.original(id) {
                if self.model.lt(meta.accumulated_weight, before.accumulated_weight) {
                    return violation(format!("accumulated weight of {id} decreased"));
                }
            }
            if !meta.twins.is_subset(&meta.conflict_with) {
                return violation(format!("twins of {id} outside its conflicts"));
            }
            if meta.voided_by.contains(id) || meta.conflict_with.contains(id) {
                return violation(format!("{id} conflicts with or voids itself"));
            }
            for other in &meta.conflict_with {
                if !staged.require_metadata(other)?.conflict_with.contains(id) {
                    return violation(format!("conflict {id} -> {other} is not symmetric"));
                }
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn get_metadata(&self, id: &VertexId) -> Result<Option<VertexMetadata>, ConsensusError> {
        self.store.get_metadata(id)
    }

    pub fn is_voided(&self, id: &VertexId) -> Result<bool, ConsensusError> {
        Ok(self.store.require_metadata(id)?.is_voided())
    }

    /// Weight a block built on `tip` must carry. Does not take the writer lock.
    pub fn required_difficulty(&self, tip: &VertexId) -> Result<Weight, ConsensusError> {
        difficulty::required_difficulty(&*self.store, tip, &self.config)
    }

    pub fn best_block(&self) -> Option<BestBlock> {
        *self.best.read()
    }

    /// Receive one `VertexChange` per mutated vertex of every later `process`.
    pub fn subscribe(&self) -> broadcast::Receiver<VertexChange> {
        self.notifier.subscribe()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::clock::ManualClock;
    use braid_core::constants::GENESIS_TIMESTAMP;
    use braid_core::vertex::{Transaction, TxInput, TxOutput};
    use braid_crypto::{resolve, seal, vertex_solution_weight};
    use braid_dag::store::MemoryStore;

    fn engine_with(verify_pow: bool) -> ConsensusEngine<MemoryStore> {
        let config = ConsensusConfig {
            min_block_weight: 1.0,
            min_tx_weight: 1.0,
            verify_pow,
            ..ConsensusConfig::default()
        };
        let clock = Arc::new(ManualClock::new(GENESIS_TIMESTAMP + 1_000));
        ConsensusEngine::open(Arc::new(MemoryStore::new()), config, clock).unwrap()
    }

    fn engine() -> ConsensusEngine<MemoryStore> {
        engine_with(false)
    }

    /// Unsealed transaction spending the genesis block output.
    fn spend_genesis(engine: &ConsensusEngine<MemoryStore>, weight: Weight) -> Vertex {
        let genesis = genesis_vertices(engine.config());
        Vertex::Transaction(Transaction {
            id: VertexId::from_bytes([0; 32]),
            parents: vec![genesis[1].id(), genesis[2].id()],
            timestamp: GENESIS_TIMESTAMP + 100,
            weight,
            nonce: 0,
            inputs: vec![TxInput { tx_id: genesis[0].id(), index: 0, data: vec![] }],
            outputs: vec![TxOutput { value: 10, script: vec![], token_data: 0 }],
            tokens: vec![],
        })
    }

    #[test]
    fn open_bootstraps_empty_store() {
        let engine = engine();
        assert_eq!(engine.store().len(), 3);
        let best = engine.best_block().unwrap();
        assert_eq!(best.height, 0);
        assert_eq!(engine.required_difficulty(&best.id).unwrap(), 1.0);
        assert!(!engine.is_voided(&best.id).unwrap());
    }

    #[test]
    fn bootstrap_twice_is_refused() {
        let engine = engine();
        assert!(matches!(engine.bootstrap(), Err(ConsensusError::DuplicateVertex(_))));
    }

    #[test]
    fn reopen_recovers_best_block() {
        let engine = engine();
        let best = engine.best_block();
        let store = Arc::clone(engine.store());
        let clock = Arc::new(ManualClock::new(GENESIS_TIMESTAMP));
        let reopened = ConsensusEngine::open(store, engine.config().clone(), clock).unwrap();
        assert_eq!(reopened.best_block(), best);
    }

    #[test]
    fn genesis_cannot_be_processed_again() {
        let engine = engine();
        let genesis = genesis_vertices(engine.config());
        let err = engine.process(genesis[1].clone()).unwrap_err();
        assert_eq!(err, ConsensusError::DuplicateVertex(genesis[1].id()));
        assert!(!engine.is_halted());
    }

    #[test]
    fn pow_checked_when_enabled() {
        let engine = engine_with(true);
        let mut tx = spend_genesis(&engine, 6.0);
        resolve(&mut tx);

        // A nonce that proves too little work, with the id restamped.
        let mut bad = tx.clone();
        let mut nonce = 0u64;
        loop {
            bad.set_nonce(nonce);
            if vertex_solution_weight(&bad) < 5.0 {
                break;
            }
            nonce += 1;
        }
        seal(&mut bad);
        assert!(matches!(engine.process(bad), Err(ConsensusError::InvalidPoW { .. })));
        engine.process(tx).unwrap();
    }

    #[test]
    fn nan_weight_never_reaches_the_dag() {
        for verify_pow in [false, true] {
            let engine = engine_with(verify_pow);
            let genesis = genesis_vertices(engine.config());
            let mut tx = spend_genesis(&engine, f64::NAN);
            seal(&mut tx);
            assert!(matches!(engine.process(tx), Err(ConsensusError::WeightTooLow { .. })));
            assert!(!engine.is_halted());
            for v in &genesis {
                let meta = engine.get_metadata(&v.id()).unwrap().unwrap();
                assert!(meta.accumulated_weight.is_finite());
            }
        }
    }
}
