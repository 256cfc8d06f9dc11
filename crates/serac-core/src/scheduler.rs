//! Poll scheduling and response ingestion.
//!
//! Each event-loop tick sweeps timed-out queries, then packs the most
//! polling-worthy items into bounded polls and dispatches them to eligible
//! peers until either no peer is available or the in-flight cap is
//! reached. Responses arrive event-driven from the network layer, are
//! matched against the outstanding query, and fold each vote into the
//! item's record; status transitions are handed back to the caller.
//!
//! Lock discipline: the peer registry mutex is taken before a record map,
//! a record map before the query registry, and no lock is ever held across
//! a sink emission.

use std::{sync::Arc, time::Duration, time::Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};

use crate::{
    errors::ResponseError,
    interfaces::{ChainView, NetworkSink},
    peers::{PeerManager, ProofRef},
    query::{Query, QueryRegistry},
    quorum::QuorumMonitor,
    record::VoteRecord,
    types::{
        Block, BlockVoteUpdate, Inv, InvKind, ItemId, NodeId, Poll, ProofVoteUpdate, Response,
        VoteStatus, VoteUpdates,
    },
    votemap::{BlockMapKey, BlockVoteMap, ProofMapKey, ProofVoteMap},
};

/// Maximum items packed into a single poll.
pub const MAX_ELEMENT_POLL: usize = 16;

/// Maximum simultaneously outstanding polls.
pub const MAX_INFLIGHT_POLL: usize = 10;

/// Scheduler tunables captured from the validated configuration.
pub(crate) struct SchedulerParams {
    pub stale_vote_threshold: u32,
    pub stale_vote_factor: u32,
    pub query_timeout: Duration,
    pub proof_replacement_enabled: bool,
}

/// The poll scheduler: item registry, outstanding queries and the
/// response-ingestion path.
pub(crate) struct PollScheduler {
    block_records: RwLock<BlockVoteMap>,
    proof_records: RwLock<ProofVoteMap>,
    queries: QueryRegistry,
    peers: Arc<Mutex<PeerManager>>,
    quorum: Arc<QuorumMonitor>,
    chain: Arc<dyn ChainView>,
    sink: Arc<dyn NetworkSink>,
    params: SchedulerParams,
}

impl PollScheduler {
    pub(crate) fn new(
        peers: Arc<Mutex<PeerManager>>,
        quorum: Arc<QuorumMonitor>,
        chain: Arc<dyn ChainView>,
        sink: Arc<dyn NetworkSink>,
        params: SchedulerParams,
    ) -> Self {
        Self {
            block_records: RwLock::new(BlockVoteMap::new()),
            proof_records: RwLock::new(ProofVoteMap::new()),
            queries: QueryRegistry::new(),
            peers,
            quorum,
            chain,
            sink,
            params,
        }
    }

    /// Starts reconciling a block. Returns `true` when newly inserted.
    pub(crate) fn add_block(&self, block: Block) -> bool {
        if !self.chain.is_worth_polling(&block.hash) {
            return false;
        }
        let inserted =
            self.block_records.write().insert(BlockMapKey::new(block), VoteRecord::new(true));
        if inserted {
            debug!(block = %block.hash, "block added to reconciliation");
        }
        inserted
    }

    /// Starts reconciling a proof. The initial side is accept for bound
    /// proofs and reject for conflicting ones; anything else is refused.
    pub(crate) fn add_proof(&self, proof: &ProofRef) -> bool {
        let accepted = {
            let pm = self.peers.lock();
            if !self.is_proof_worth_polling(&pm, &proof.id()) {
                return false;
            }
            pm.is_bound_to_peer(&proof.id())
        };
        let inserted = self
            .proof_records
            .write()
            .insert(ProofMapKey::new(proof.clone()), VoteRecord::new(accepted));
        if inserted {
            debug!(proof = %proof.id(), accepted, "proof added to reconciliation");
        }
        inserted
    }

    pub(crate) fn is_block_accepted(&self, hash: &ItemId) -> bool {
        self.block_records.read().get(hash).is_some_and(VoteRecord::is_accepted)
    }

    pub(crate) fn is_proof_accepted(&self, proofid: &ItemId) -> bool {
        self.proof_records.read().get(proofid).is_some_and(VoteRecord::is_accepted)
    }

    pub(crate) fn block_confidence(&self, hash: &ItemId) -> i32 {
        self.block_records.read().get(hash).map_or(-1, |r| i32::from(r.confidence()))
    }

    pub(crate) fn proof_confidence(&self, proofid: &ItemId) -> i32 {
        self.proof_records.read().get(proofid).map_or(-1, |r| i32::from(r.confidence()))
    }

    /// One scheduler iteration: expire what is overdue, then poll.
    pub(crate) fn tick(&self) {
        let now = Instant::now();
        self.sweep_timeouts(now);
        self.issue_polls(now);
    }

    /// Read-only preview of what the next poll would ask about.
    pub(crate) fn invs_for_next_poll(&self) -> Vec<Inv> {
        self.collect_invs(false)
    }

    pub(crate) fn pending_query_count(&self) -> usize {
        self.queries.len()
    }

    /// Discards every outstanding query and releases the poll slots they
    /// held. No status updates are synthesized.
    pub(crate) fn drain_queries(&self) {
        let dropped = self.queries.drain();
        if dropped.is_empty() {
            return;
        }
        debug!(count = dropped.len(), "discarding outstanding queries");
        for query in &dropped {
            self.release_inflight(&query.invs);
        }
    }

    /// Removes expired queries, releases their poll slots and tells the
    /// peer registry the node never answered.
    fn sweep_timeouts(&self, now: Instant) {
        let expired = self.queries.expire_until(now);
        for query in &expired {
            self.peers.lock().query_failed(query.node);
            self.release_inflight(&query.invs);
            trace!(node = query.node, round = query.round, "query expired");
        }
    }

    /// Issues polls until no peer is eligible, nothing is worth polling,
    /// or [`MAX_INFLIGHT_POLL`] queries are outstanding.
    fn issue_polls(&self, now: Instant) {
        loop {
            if self.queries.len() >= MAX_INFLIGHT_POLL {
                break;
            }

            let Some(node) = self.peers.lock().select_node() else {
                break;
            };

            let invs = self.collect_invs(true);
            if invs.is_empty() {
                // Nothing to ask; the selected peer is left unconsumed.
                break;
            }

            let round = self.queries.next_round();
            let deadline = now + self.params.query_timeout;
            self.queries.register(Query { node, round, deadline, invs: invs.clone() });
            // The peer owes us an answer; do not pick it again before the
            // deadline.
            self.peers.lock().update_next_request_time(node, deadline);

            debug!(node, round, invs = invs.len(), "sending poll");
            self.sink.send_poll(node, Poll { round, invs });
        }
    }

    /// Matches a response to its outstanding query and folds the votes in.
    ///
    /// # Errors
    ///
    /// Returns a [`ResponseError`] when no query matches or the vote list
    /// does not mirror the poll; the ban score to attribute to the peer is
    /// on the error.
    pub(crate) fn register_votes(
        &self,
        node: NodeId,
        response: &Response,
    ) -> Result<VoteUpdates, ResponseError> {
        let query = self
            .queries
            .take(node, response.round)
            .ok_or(ResponseError::Unexpected { node, round: response.round })?;

        // The peer answered; pace it by its requested cooldown whether or
        // not the answer survives validation.
        let resume_at = Instant::now() + Duration::from_millis(response.cooldown_ms);
        self.peers.lock().update_next_request_time(node, resume_at);

        if response.votes.len() != query.invs.len() {
            self.release_inflight(&query.invs);
            return Err(ResponseError::InvalidSize {
                expected: query.invs.len(),
                actual: response.votes.len(),
            });
        }

        for (index, (inv, vote)) in query.invs.iter().zip(&response.votes).enumerate() {
            if inv.id != vote.id {
                self.release_inflight(&query.invs);
                return Err(ResponseError::InvalidContent { index });
            }
        }

        let quorum_established = self.quorum.is_established();
        let mut updates = VoteUpdates::default();

        for (inv, vote) in query.invs.iter().zip(&response.votes) {
            match inv.kind {
                InvKind::Block => self.fold_block_vote(
                    node,
                    inv.id,
                    vote.error_code,
                    quorum_established,
                    &mut updates,
                ),
                InvKind::Proof => self.fold_proof_vote(
                    node,
                    inv.id,
                    vote.error_code,
                    quorum_established,
                    &mut updates,
                ),
            }
        }

        Ok(updates)
    }

    fn fold_block_vote(
        &self,
        node: NodeId,
        hash: ItemId,
        error_code: i32,
        quorum_established: bool,
        updates: &mut VoteUpdates,
    ) {
        let mut blocks = self.block_records.write();
        // The item may have finalized or been pruned since the poll went
        // out; its vote is simply dropped.
        let Some((key, record)) = blocks.key_and_record_mut(&hash) else {
            return;
        };

        if record.register_vote(node, error_code, quorum_established) {
            let status = status_of(record);
            updates.blocks.push(BlockVoteUpdate { block: key.block(), status });
            if status.is_terminal() {
                info!(block = %hash, status = %status, "block vote concluded");
                blocks.remove(&hash);
            }
        } else if record.is_stale(self.params.stale_vote_threshold, self.params.stale_vote_factor)
        {
            info!(block = %hash, "block vote went stale");
            updates
                .blocks
                .push(BlockVoteUpdate { block: key.block(), status: VoteStatus::Stale });
            blocks.remove(&hash);
        }
    }

    fn fold_proof_vote(
        &self,
        node: NodeId,
        proofid: ItemId,
        error_code: i32,
        quorum_established: bool,
        updates: &mut VoteUpdates,
    ) {
        let mut proofs = self.proof_records.write();
        let Some((key, record)) = proofs.key_and_record_mut(&proofid) else {
            return;
        };

        if record.register_vote(node, error_code, quorum_established) {
            let status = status_of(record);
            updates.proofs.push(ProofVoteUpdate { proof: key.proof.clone(), status });
            if status.is_terminal() {
                info!(proof = %proofid, status = %status, "proof vote concluded");
                proofs.remove(&proofid);
            }
        } else if record.is_stale(self.params.stale_vote_threshold, self.params.stale_vote_factor)
        {
            info!(proof = %proofid, "proof vote went stale");
            updates
                .proofs
                .push(ProofVoteUpdate { proof: key.proof.clone(), status: VoteStatus::Stale });
            proofs.remove(&proofid);
        }
    }

    /// Releases the poll slots a dead query held on still-live items.
    fn release_inflight(&self, invs: &[Inv]) {
        let mut blocks = self.block_records.write();
        let mut proofs = self.proof_records.write();
        for inv in invs {
            let record = match inv.kind {
                InvKind::Block => blocks.get_mut(&inv.id),
                InvKind::Proof => proofs.get_mut(&inv.id),
            };
            if let Some(record) = record {
                record.clear_inflight(1);
            }
        }
    }

    /// Prunes items that stopped being worth polling and packs the top of
    /// both record maps into an inv list, blocks before proofs, at most
    /// [`MAX_ELEMENT_POLL`] entries. With `for_poll` set, each included
    /// item has a poll slot claimed.
    fn collect_invs(&self, for_poll: bool) -> Vec<Inv> {
        let mut invs = Vec::new();

        {
            let mut blocks = self.block_records.write();
            blocks.retain(|key, _| self.chain.is_worth_polling(&key.hash));
            for (key, record) in blocks.iter_mut() {
                if invs.len() >= MAX_ELEMENT_POLL {
                    return invs;
                }
                let include = if for_poll { record.register_poll() } else { record.should_poll() };
                if include {
                    invs.push(Inv::block(key.hash));
                }
            }
        }

        let pm = self.peers.lock();
        let mut proofs = self.proof_records.write();
        proofs.retain(|key, _| self.is_proof_worth_polling(&pm, &key.proof.id()));
        for (key, record) in proofs.iter_mut() {
            if invs.len() >= MAX_ELEMENT_POLL {
                break;
            }
            let include = if for_poll { record.register_poll() } else { record.should_poll() };
            if include {
                invs.push(Inv::proof(key.proof.id()));
            }
        }

        invs
    }

    fn is_proof_worth_polling(&self, pm: &PeerManager, proofid: &ItemId) -> bool {
        pm.is_bound_to_peer(proofid) ||
            (self.params.proof_replacement_enabled && pm.is_in_conflicting_pool(proofid))
    }
}

/// Derives the emitted status from the record after a change.
fn status_of(record: &VoteRecord) -> VoteStatus {
    match (record.is_accepted(), record.is_finalized()) {
        (true, true) => VoteStatus::Finalized,
        (true, false) => VoteStatus::Accepted,
        (false, true) => VoteStatus::Invalid,
        (false, false) => VoteStatus::Rejected,
    }
}
