//! Traversal over the dependency relation of the DAG.
//!
//! Walks are breadth-first and deterministic: ancestors follow the order of
//! `Vertex::dependencies`, descendants follow the id order of the children
//! index. Every call builds a fresh iterator, so walks can be restarted.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet, VecDeque};

use braid_core::error::ConsensusError;
use braid_core::types::{Timestamp, VertexId};

use crate::store::DagRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ancestors,
    Descendants,
}

pub struct DagWalker<'a, R: DagRead + ?Sized> {
    dag: &'a R,
}

impl<'a, R: DagRead + ?Sized> DagWalker<'a, R> {
    pub fn new(dag: &'a R) -> Self {
        Self { dag }
    }

    /// Lazy walk over every ancestor of `id` (the vertex itself excluded).
    pub fn ancestors(&self, id: &VertexId) -> Result<Walk<'a, R>, ConsensusError> {
        Walk::start(self.dag, *id, Direction::Ancestors)
    }

    /// Lazy walk over every descendant of `id` (the vertex itself excluded).
    pub fn descendants(&self, id: &VertexId) -> Result<Walk<'a, R>, ConsensusError> {
        Walk::start(self.dag, *id, Direction::Descendants)
    }

    pub fn collect_ancestors(&self, id: &VertexId) -> Result<BTreeSet<VertexId>, ConsensusError> {
        self.ancestors(id)?.collect()
    }

    pub fn collect_descendants(&self, id: &VertexId) -> Result<BTreeSet<VertexId>, ConsensusError> {
        self.descendants(id)?.collect()
    }

    /// Order `subset` so that every dependency comes before its dependents.
    ///
    /// Only edges between members are considered, so the subset should be
    /// convex (a descendant closure is). Among vertices that are ready at the
    /// same time the smaller `(timestamp, id)` goes first.
    pub fn topological_order(
        &self,
        subset: &BTreeSet<VertexId>,
    ) -> Result<Vec<VertexId>, ConsensusError> {
        let mut timestamps: BTreeMap<VertexId, Timestamp> = BTreeMap::new();
        let mut pending: BTreeMap<VertexId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<VertexId, Vec<VertexId>> = BTreeMap::new();

        for id in subset {
            let vertex = self.dag.require(id)?;
            timestamps.insert(*id, vertex.timestamp());
            let inside: Vec<VertexId> = vertex
                .dependencies()
                .into_iter()
                .filter(|d| subset.contains(d))
                .collect();
            pending.insert(*id, inside.len());
            for dep in inside {
                dependents.entry(dep).or_default().push(*id);
            }
        }

        let mut ready: BinaryHeap<Reverse<(Timestamp, VertexId)>> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| Reverse((timestamps[id], *id)))
            .collect();

        let mut order = Vec::with_capacity(subset.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for child in dependents.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(n) = pending.get_mut(child) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push(Reverse((timestamps[child], *child)));
                    }
                }
            }
        }

        if order.len() != subset.len() {
            return Err(ConsensusError::ConsensusInvariantViolation(format!(
                "cycle among {} vertices during topological sort",
                subset.len() - order.len()
            )));
        }
        Ok(order)
    }
}

/// One breadth-first walk. Yields each reachable vertex once.
pub struct Walk<'a, R: DagRead + ?Sized> {
    dag: &'a R,
    origin: VertexId,
    direction: Direction,
    queue: VecDeque<VertexId>,
    seen: HashSet<VertexId>,
    failed: bool,
}

impl<'a, R: DagRead + ?Sized> Walk<'a, R> {
    fn start(dag: &'a R, origin: VertexId, direction: Direction) -> Result<Self, ConsensusError> {
        if !dag.exists(&origin)? {
            return Err(ConsensusError::NotFound(origin));
        }
        let mut walk = Self {
            dag,
            origin,
            direction,
            queue: VecDeque::new(),
            seen: HashSet::new(),
            failed: false,
        };
        walk.seen.insert(origin);
        walk.enqueue_neighbours(&origin)?;
        Ok(walk)
    }

    fn enqueue_neighbours(&mut self, id: &VertexId) -> Result<(), ConsensusError> {
        let next: Vec<VertexId> = match self.direction {
            Direction::Ancestors => self.dag.require(id)?.dependencies(),
            Direction::Descendants => self.dag.children_of(id)?.into_iter().collect(),
        };
        for n in next {
            if n == self.origin {
                return Err(ConsensusError::ConsensusInvariantViolation(format!(
                    "cycle through {}",
                    self.origin
                )));
            }
            if self.seen.insert(n) {
                self.queue.push_back(n);
            }
        }
        Ok(())
    }
}

impl<R: DagRead + ?Sized> Iterator for Walk<'_, R> {
    type Item = Result<VertexId, ConsensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let id = self.queue.pop_front()?;
        if let Err(e) = self.enqueue_neighbours(&id) {
            self.failed = true;
            return Some(Err(e));
        }
        Some(Ok(id))
    }
}
