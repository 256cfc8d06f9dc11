//! Registry of outstanding polls.
//!
//! Each issued poll is tracked until it is answered or times out. Entries
//! are unique by `(node, round)` for response matching and additionally
//! reachable in deadline order for the periodic timeout sweep. The two
//! views are a hash map plus a lazily-pruned min-heap sharing the
//! `(node, round)` handle.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use parking_lot::RwLock;

use crate::types::{Inv, NodeId};

/// One outstanding poll.
#[derive(Debug, Clone)]
pub struct Query {
    pub node: NodeId,
    pub round: u64,
    pub deadline: Instant,
    /// The items the node was asked about, in poll order.
    pub invs: Vec<Inv>,
}

#[derive(Debug, Default)]
struct QueryIndex {
    by_key: HashMap<(NodeId, u64), Query>,
    // Lazy entries: a popped handle may no longer be in `by_key`.
    by_deadline: BinaryHeap<Reverse<(Instant, NodeId, u64)>>,
}

/// Concurrent registry of outstanding polls plus the global round counter.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    index: RwLock<QueryIndex>,
    round: AtomicU64,
}

impl QueryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the next poll sequence number. Strictly increasing for the
    /// life of the process.
    pub fn next_round(&self) -> u64 {
        self.round.fetch_add(1, Ordering::Relaxed)
    }

    /// The round the next poll will use.
    #[must_use]
    pub fn current_round(&self) -> u64 {
        self.round.load(Ordering::Relaxed)
    }

    pub fn register(&self, query: Query) {
        let mut index = self.index.write();
        index.by_deadline.push(Reverse((query.deadline, query.node, query.round)));
        index.by_key.insert((query.node, query.round), query);
    }

    /// Consumes the query matching a response, if one is outstanding.
    pub fn take(&self, node: NodeId, round: u64) -> Option<Query> {
        self.index.write().by_key.remove(&(node, round))
    }

    /// Removes and returns every query whose deadline has passed.
    /// Stops at the first live entry.
    pub fn expire_until(&self, now: Instant) -> Vec<Query> {
        let mut expired = Vec::new();
        let mut index = self.index.write();
        while let Some(Reverse((deadline, node, round))) = index.by_deadline.peek().copied() {
            if deadline > now {
                break;
            }
            index.by_deadline.pop();
            // Already answered entries leave a dangling heap handle behind.
            if let Some(query) = index.by_key.remove(&(node, round)) {
                expired.push(query);
            }
        }
        expired
    }

    /// Drops every outstanding query, returning the discarded entries.
    pub fn drain(&self) -> Vec<Query> {
        let mut index = self.index.write();
        let pending = index.by_key.drain().map(|(_, q)| q).collect();
        index.by_deadline.clear();
        pending
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().by_key.is_empty()
    }

    /// Sum of inv counts over all outstanding queries.
    #[must_use]
    pub fn total_inv_count(&self) -> usize {
        self.index.read().by_key.values().map(|q| q.invs.len()).sum()
    }
}
