//! Priority-ordered containers mapping reconciling items to their records.
//!
//! Two instances exist, one per item kind: blocks ranked by accumulated
//! chain work and proofs ranked by stake score. Iteration yields the most
//! polling-worthy item first; a secondary hash index allows lookup by the
//! 256-bit id carried in votes.

use std::collections::{BTreeMap, HashMap};

use crate::{
    peers::ProofRef,
    record::VoteRecord,
    types::{Block, ChainWork, ItemId},
};

/// Ordering key of a reconciling item. `Ord` is the polling priority:
/// `a < b` means `a` is polled before `b`.
pub trait VoteMapKey: Ord + Clone {
    fn item_id(&self) -> ItemId;
}

/// Block key: more accumulated work polls first, higher hash breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMapKey {
    pub work: ChainWork,
    pub hash: ItemId,
}

impl BlockMapKey {
    #[must_use]
    pub const fn new(block: Block) -> Self {
        Self { work: block.work, hash: block.hash }
    }

    #[must_use]
    pub const fn block(&self) -> Block {
        Block { hash: self.hash, work: self.work }
    }
}

impl Ord for BlockMapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.work, other.hash).cmp(&(self.work, self.hash))
    }
}

impl PartialOrd for BlockMapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl VoteMapKey for BlockMapKey {
    fn item_id(&self) -> ItemId {
        self.hash
    }
}

/// Proof key: higher stake score polls first, higher id breaks ties.
#[derive(Debug, Clone)]
pub struct ProofMapKey {
    pub score: u64,
    pub proof: ProofRef,
}

impl ProofMapKey {
    #[must_use]
    pub fn new(proof: ProofRef) -> Self {
        Self { score: proof.score(), proof }
    }
}

impl PartialEq for ProofMapKey {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.proof.id() == other.proof.id()
    }
}

impl Eq for ProofMapKey {}

impl Ord for ProofMapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.score, other.proof.id()).cmp(&(self.score, self.proof.id()))
    }
}

impl PartialOrd for ProofMapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl VoteMapKey for ProofMapKey {
    fn item_id(&self) -> ItemId {
        self.proof.id()
    }
}

/// One ordered record container.
///
/// Insertion of an already-present item is a no-op; iteration is priority
/// order; lookups go through the id index.
#[derive(Debug, Default)]
pub struct VoteMap<K: VoteMapKey> {
    records: BTreeMap<K, VoteRecord>,
    by_id: HashMap<ItemId, K>,
}

pub type BlockVoteMap = VoteMap<BlockMapKey>;
pub type ProofVoteMap = VoteMap<ProofMapKey>;

impl<K: VoteMapKey> VoteMap<K> {
    #[must_use]
    pub fn new() -> Self {
        Self { records: BTreeMap::new(), by_id: HashMap::new() }
    }

    /// Inserts a fresh record for the item. Returns `false` (leaving the
    /// existing record untouched) when the item is already reconciling.
    pub fn insert(&mut self, key: K, record: VoteRecord) -> bool {
        let id = key.item_id();
        if self.by_id.contains_key(&id) {
            return false;
        }
        self.by_id.insert(id, key.clone());
        self.records.insert(key, record);
        true
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.by_id.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&VoteRecord> {
        let key = self.by_id.get(id)?;
        self.records.get(key)
    }

    pub fn get_mut(&mut self, id: &ItemId) -> Option<&mut VoteRecord> {
        let key = self.by_id.get(id)?;
        self.records.get_mut(key)
    }

    /// Looks up the record together with its ordering key.
    pub fn key_and_record_mut(&mut self, id: &ItemId) -> Option<(K, &mut VoteRecord)> {
        let key = self.by_id.get(id)?.clone();
        let record = self.records.get_mut(&key)?;
        Some((key, record))
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<(K, VoteRecord)> {
        let key = self.by_id.remove(id)?;
        let record = self.records.remove(&key)?;
        Some((key, record))
    }

    /// Priority-ordered iteration, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &VoteRecord)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut VoteRecord)> {
        self.records.iter_mut()
    }

    /// Drops every record the predicate rejects, silently.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &VoteRecord) -> bool,
    {
        let by_id = &mut self.by_id;
        self.records.retain(|key, record| {
            let keep_it = keep(key, record);
            if !keep_it {
                by_id.remove(&key.item_id());
            }
            keep_it
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of outstanding poll references across all records.
    #[must_use]
    pub fn total_inflight(&self) -> u32 {
        self.records.values().map(|r| u32::from(r.inflight())).sum()
    }
}
