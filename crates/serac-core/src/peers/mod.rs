//! Peer and stake-proof registry.
//!
//! The [`PeerManager`] admits stake proofs, classifies them into the bound,
//! conflicting and orphan pools, binds live peers to bound proofs, and
//! keeps the score totals the quorum gate reads. It also owns the
//! availability discipline behind [`PeerManager::select_node`]: a peer with
//! an outstanding query, or still inside a response cooldown, is not
//! offered for polling again.
//!
//! The engine holds the manager under a single mutex and exposes scoped
//! access through `Processor::with_peer_manager`.

mod proof;

use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};

use tracing::debug;

use crate::types::{ItemId, NodeId, ProofId};

pub use proof::{Delegation, Proof, ProofRef, PubKey, SessionKey};

/// Which pool a registered proof currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProofPool {
    /// Valid and polled; eligible for peer binding.
    Bound,
    /// Loses a stake conflict against a bound proof; polled only when proof
    /// replacement is enabled.
    Conflicting,
    /// Stake not mature yet; revisited when the chain tip moves.
    Orphan,
}

/// How thoroughly a proof is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionMode {
    /// Demote from the bound pool but keep tracking the proof.
    Default,
    /// Forget the proof entirely and detach its peers.
    Invalidate,
}

#[derive(Debug)]
struct ProofEntry {
    proof: ProofRef,
    pool: ProofPool,
}

#[derive(Debug)]
struct PeerNode {
    proof_id: ProofId,
    /// `None` means selectable now; otherwise selectable once reached.
    available_after: Option<Instant>,
    avaproofs_latched: bool,
}

/// Registry of stake proofs and the peers bound to them.
#[derive(Debug)]
pub struct PeerManager {
    required_confirmations: u32,
    chain_height: u32,
    proofs: HashMap<ProofId, ProofEntry>,
    /// Winner of each staked output set.
    bound_by_stake: HashMap<ItemId, ProofId>,
    nodes: HashMap<NodeId, PeerNode>,
    nodes_by_proof: HashMap<ProofId, HashSet<NodeId>>,
    /// Cursor of the rotating selection.
    last_selected: Option<NodeId>,
}

impl PeerManager {
    #[must_use]
    pub fn new(required_confirmations: u32) -> Self {
        Self {
            required_confirmations,
            chain_height: 0,
            proofs: HashMap::new(),
            bound_by_stake: HashMap::new(),
            nodes: HashMap::new(),
            nodes_by_proof: HashMap::new(),
            last_selected: None,
        }
    }

    /// Admits a stake proof.
    ///
    /// Returns `true` when the proof lands in the bound or conflicting
    /// pool. Duplicates, zero-score proofs and immature (orphan) proofs
    /// return `false`; orphans are still tracked and revisited on
    /// [`PeerManager::update_chain_tip`].
    pub fn register_proof(&mut self, proof: &ProofRef) -> bool {
        let proofid = proof.id();
        if self.proofs.contains_key(&proofid) {
            return false;
        }
        if proof.score() == 0 {
            debug!(proof = %proofid, "rejecting stakeless proof");
            return false;
        }

        if !self.is_mature(proof.stake_height()) {
            debug!(proof = %proofid, height = proof.stake_height(), "parking immature proof");
            self.proofs.insert(proofid, ProofEntry { proof: proof.clone(), pool: ProofPool::Orphan });
            return false;
        }

        self.bind_or_conflict(proof.clone());
        true
    }

    /// Settles the stake conflict for a mature proof and files it.
    fn bind_or_conflict(&mut self, proof: ProofRef) {
        let proofid = proof.id();
        let stake_id = proof.stake_id();

        if let Some(&incumbent_id) = self.bound_by_stake.get(&stake_id) {
            let incumbent = &self.proofs[&incumbent_id].proof;
            if proof.has_precedence_over(incumbent) {
                debug!(winner = %proofid, loser = %incumbent_id, "stake conflict, replacing bound proof");
                if let Some(entry) = self.proofs.get_mut(&incumbent_id) {
                    entry.pool = ProofPool::Conflicting;
                }
                self.bound_by_stake.insert(stake_id, proofid);
                self.proofs.insert(proofid, ProofEntry { proof, pool: ProofPool::Bound });
            } else {
                debug!(proof = %proofid, bound = %incumbent_id, "stake conflict, parking new proof");
                self.proofs.insert(proofid, ProofEntry { proof, pool: ProofPool::Conflicting });
            }
            return;
        }

        self.bound_by_stake.insert(stake_id, proofid);
        self.proofs.insert(proofid, ProofEntry { proof, pool: ProofPool::Bound });
    }

    fn is_mature(&self, stake_height: u32) -> bool {
        if stake_height == 0 || stake_height > self.chain_height {
            return false;
        }
        self.chain_height - stake_height + 1 >= self.required_confirmations
    }

    /// Moves the maturity horizon and promotes orphans whose stake now has
    /// enough confirmations.
    pub fn update_chain_tip(&mut self, height: u32) {
        self.chain_height = height;

        let matured: Vec<ProofRef> = self
            .proofs
            .values()
            .filter(|e| e.pool == ProofPool::Orphan && self.is_mature(e.proof.stake_height()))
            .map(|e| e.proof.clone())
            .collect();

        for proof in matured {
            debug!(proof = %proof.id(), "orphan proof matured");
            self.proofs.remove(&proof.id());
            self.bind_or_conflict(proof);
        }
    }

    /// Marks a proof as no longer worth polling.
    ///
    /// Returns `false` when the proof is unknown.
    pub fn reject_proof(&mut self, proofid: &ProofId, mode: RejectionMode) -> bool {
        match mode {
            RejectionMode::Default => {
                let Some(entry) = self.proofs.get_mut(proofid) else {
                    return false;
                };
                if entry.pool == ProofPool::Bound {
                    entry.pool = ProofPool::Conflicting;
                    let stake_id = entry.proof.stake_id();
                    self.bound_by_stake.remove(&stake_id);
                }
                true
            }
            RejectionMode::Invalidate => {
                let Some(entry) = self.proofs.remove(proofid) else {
                    return false;
                };
                if entry.pool == ProofPool::Bound {
                    self.bound_by_stake.remove(&entry.proof.stake_id());
                }
                // Peers speaking for the proof are no longer avalanche peers.
                if let Some(nodes) = self.nodes_by_proof.remove(proofid) {
                    for node in nodes {
                        self.nodes.remove(&node);
                    }
                }
                true
            }
        }
    }

    /// Binds a live peer to a bound proof. Rebinding an existing peer moves
    /// it. Returns `false` when the proof is unknown or not bound.
    pub fn add_node(&mut self, node: NodeId, proofid: ProofId) -> bool {
        if !self.is_bound_to_peer(&proofid) {
            return false;
        }

        if let Some(previous) = self.nodes.remove(&node) {
            self.detach(node, &previous.proof_id);
        }

        self.nodes.insert(
            node,
            PeerNode { proof_id: proofid, available_after: None, avaproofs_latched: false },
        );
        self.nodes_by_proof.entry(proofid).or_default().insert(node);
        true
    }

    /// Unbinds a peer on disconnect. Returns `false` when unknown.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(peer) = self.nodes.remove(&node) else {
            return false;
        };
        self.detach(node, &peer.proof_id);
        true
    }

    fn detach(&mut self, node: NodeId, proofid: &ProofId) {
        if let Some(set) = self.nodes_by_proof.get_mut(proofid) {
            set.remove(&node);
            if set.is_empty() {
                self.nodes_by_proof.remove(proofid);
            }
        }
    }

    /// Picks a peer eligible for polling: no outstanding query owed and
    /// cooldown elapsed. Rotates through the peer set so successive calls
    /// return different peers whenever more than one is eligible.
    pub fn select_node(&mut self) -> Option<NodeId> {
        let now = Instant::now();
        let mut eligible: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, peer)| peer.available_after.map_or(true, |at| at <= now))
            .map(|(node, _)| *node)
            .collect();
        if eligible.is_empty() {
            return None;
        }
        eligible.sort_unstable();

        let pick = match self.last_selected {
            Some(last) => {
                eligible.iter().copied().find(|node| *node > last).unwrap_or(eligible[0])
            }
            None => eligible[0],
        };
        self.last_selected = Some(pick);
        Some(pick)
    }

    /// Defers the next poll to this peer until `at` (query issued, or
    /// response cooldown requested by the peer).
    pub fn update_next_request_time(&mut self, node: NodeId, at: Instant) {
        if let Some(peer) = self.nodes.get_mut(&node) {
            peer.available_after = Some(at);
        }
    }

    /// The peer failed to answer in time; it may be polled again.
    pub fn query_failed(&mut self, node: NodeId) {
        debug!(node, "avalanche query timed out");
        if let Some(peer) = self.nodes.get_mut(&node) {
            peer.available_after = None;
        }
    }

    /// Latches the proofs-exchange-complete signal for a peer. Returns
    /// `true` only the first time for a known peer.
    pub fn latch_avaproofs_sent(&mut self, node: NodeId) -> bool {
        match self.nodes.get_mut(&node) {
            Some(peer) if !peer.avaproofs_latched => {
                peer.avaproofs_latched = true;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get_proof(&self, proofid: &ProofId) -> Option<ProofRef> {
        self.proofs.get(proofid).map(|e| e.proof.clone())
    }

    #[must_use]
    pub fn is_bound_to_peer(&self, proofid: &ProofId) -> bool {
        self.proofs.get(proofid).is_some_and(|e| e.pool == ProofPool::Bound)
    }

    #[must_use]
    pub fn is_in_conflicting_pool(&self, proofid: &ProofId) -> bool {
        self.proofs.get(proofid).is_some_and(|e| e.pool == ProofPool::Conflicting)
    }

    #[must_use]
    pub fn is_orphan(&self, proofid: &ProofId) -> bool {
        self.proofs.get(proofid).is_some_and(|e| e.pool == ProofPool::Orphan)
    }

    #[must_use]
    pub fn has_node_attached(&self, proofid: &ProofId) -> bool {
        self.nodes_by_proof.get(proofid).is_some_and(|set| !set.is_empty())
    }

    /// Total score staked by bound proofs, connected or not.
    #[must_use]
    pub fn total_peers_score(&self) -> u64 {
        self.proofs
            .values()
            .filter(|e| e.pool == ProofPool::Bound)
            .map(|e| e.proof.score())
            .sum()
    }

    /// Score of bound proofs with at least one live peer attached.
    #[must_use]
    pub fn connected_peers_score(&self) -> u64 {
        self.proofs
            .values()
            .filter(|e| e.pool == ProofPool::Bound && self.has_node_attached(&e.proof.id()))
            .map(|e| e.proof.score())
            .sum()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
