//! The engine facade.
//!
//! A [`Processor`] owns the record maps, the outstanding-query registry,
//! the peer registry and the quorum latch, wires them together, and drives
//! the scheduler from a periodic background task. The host node calls in
//! from its network threads (`register_votes`, `avaproofs_sent`,
//! `peer_disconnected`), its validation code (`add_block_to_reconcile`)
//! and its RPC handlers (`is_block_accepted`, `block_confidence`); all
//! entry points are safe from any thread.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
    config::AvalancheConfig,
    errors::{ConfigError, ResponseError},
    event_loop::EventLoop,
    interfaces::{ChainView, Hello, NetworkSink},
    peers::{Delegation, PeerManager, Proof, ProofRef, PubKey, SessionKey},
    quorum::QuorumMonitor,
    scheduler::{PollScheduler, SchedulerParams},
    types::{Block, Inv, ItemId, NodeId, ProofId, Response, VoteUpdates},
};

/// Everything needed to vote under our own stake identity.
struct LocalPeer {
    proof: ProofRef,
    delegation: Delegation,
}

/// The voting engine.
pub struct Processor {
    scheduler: Arc<PollScheduler>,
    quorum: Arc<QuorumMonitor>,
    peers: Arc<Mutex<PeerManager>>,
    sink: Arc<dyn NetworkSink>,
    session_key: SessionKey,
    local: Option<LocalPeer>,
    event_loop: EventLoop,
    poll_interval: Duration,
}

impl Processor {
    /// Validates the configuration and builds an engine instance.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered; no engine exists on
    /// failure.
    pub fn new(
        config: AvalancheConfig,
        chain: Arc<dyn ChainView>,
        sink: Arc<dyn NetworkSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let min_quorum_score = config.min_quorum_score()?;

        let session_key = SessionKey::generate();
        let local = match &config.local_proof {
            Some(hex_payload) => {
                let proof: ProofRef =
                    Arc::new(Proof::from_hex(hex_payload).map_err(ConfigError::LocalProof)?);
                let delegation = Delegation::new(proof.id(), session_key.pub_key());
                Some(LocalPeer { proof, delegation })
            }
            None => None,
        };

        let peers = Arc::new(Mutex::new(PeerManager::new(config.stake_utxo_confirmations)));
        let quorum = Arc::new(QuorumMonitor::new(
            min_quorum_score,
            config.min_quorum_connected_score_ratio,
            config.min_avaproofs_node_count,
            Arc::clone(&peers),
            local.as_ref().map(|l| l.proof.clone()),
        ));
        let scheduler = Arc::new(PollScheduler::new(
            Arc::clone(&peers),
            Arc::clone(&quorum),
            chain,
            Arc::clone(&sink),
            SchedulerParams {
                stale_vote_threshold: config.stale_vote_threshold,
                stale_vote_factor: config.stale_vote_factor,
                query_timeout: config.query_timeout(),
                proof_replacement_enabled: config.enable_proof_replacement,
            },
        ));

        Ok(Self {
            scheduler,
            quorum,
            peers,
            sink,
            session_key,
            local,
            event_loop: EventLoop::new(),
            poll_interval: config.poll_interval(),
        })
    }

    /// Submits a block for reconciliation. Returns `true` when newly
    /// inserted.
    pub fn add_block_to_reconcile(&self, block: Block) -> bool {
        self.scheduler.add_block(block)
    }

    /// Submits a proof for reconciliation. Returns `true` when newly
    /// inserted and policy-eligible for polling (bound, or conflicting
    /// with replacement enabled).
    pub fn add_proof_to_reconcile(&self, proof: &ProofRef) -> bool {
        self.scheduler.add_proof(proof)
    }

    /// Current side of the majority for a reconciling block; `false` for
    /// unknown items.
    #[must_use]
    pub fn is_block_accepted(&self, hash: &ItemId) -> bool {
        self.scheduler.is_block_accepted(hash)
    }

    #[must_use]
    pub fn is_proof_accepted(&self, proofid: &ProofId) -> bool {
        self.scheduler.is_proof_accepted(proofid)
    }

    /// Confidence of a reconciling block, `-1` for unknown items.
    #[must_use]
    pub fn block_confidence(&self, hash: &ItemId) -> i32 {
        self.scheduler.block_confidence(hash)
    }

    #[must_use]
    pub fn proof_confidence(&self, proofid: &ProofId) -> i32 {
        self.scheduler.proof_confidence(proofid)
    }

    /// Ingests a peer's response to one of our polls.
    ///
    /// # Errors
    ///
    /// Returns a [`ResponseError`] (carrying its ban score) when the
    /// response does not match an outstanding query; vote state is only
    /// touched by fully valid responses.
    pub fn register_votes(
        &self,
        node: NodeId,
        response: &Response,
    ) -> Result<VoteUpdates, ResponseError> {
        self.scheduler.register_votes(node, response)
    }

    /// Runs `f` with the peer registry locked for the duration.
    pub fn with_peer_manager<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut PeerManager) -> R,
    {
        f(&mut self.peers.lock())
    }

    /// Public identity of this session's key.
    #[must_use]
    pub fn session_pub_key(&self) -> PubKey {
        self.session_key.pub_key()
    }

    /// Sends our hello (delegation) to a peer. Returns `false` when the
    /// node has no local stake identity.
    pub fn send_hello(&self, node: NodeId) -> bool {
        let Some(local) = &self.local else {
            return false;
        };
        self.sink.send_hello(node, Hello { delegation: local.delegation.clone() });
        true
    }

    /// Our own stake proof, when participating.
    #[must_use]
    pub fn local_proof(&self) -> Option<ProofRef> {
        self.local.as_ref().map(|l| l.proof.clone())
    }

    /// Whether this node can answer polls under its own stake.
    #[must_use]
    pub fn is_avalanche_service_available(&self) -> bool {
        self.local.is_some()
    }

    /// Records a peer's proofs-exchange-complete signal; idempotent per
    /// peer.
    pub fn avaproofs_sent(&self, node: NodeId) {
        self.quorum.avaproofs_sent(node);
    }

    #[must_use]
    pub fn avaproofs_node_counter(&self) -> i64 {
        self.quorum.avaproofs_node_counter()
    }

    /// Whether enough stake is known and connected for votes to count.
    /// Latches on first success.
    #[must_use]
    pub fn is_quorum_established(&self) -> bool {
        self.quorum.is_established()
    }

    /// Starts the periodic scheduler task. Returns `false` when already
    /// running. Must be called within a tokio runtime.
    pub fn start_event_loop(&self) -> bool {
        let scheduler = Arc::clone(&self.scheduler);
        self.event_loop.start(self.poll_interval, move || scheduler.tick())
    }

    /// Stops the scheduler task and discards outstanding queries. Returns
    /// `false` when not running.
    pub fn stop_event_loop(&self) -> bool {
        if !self.event_loop.stop() {
            return false;
        }
        self.scheduler.drain_queries();
        true
    }

    #[must_use]
    pub fn is_event_loop_running(&self) -> bool {
        self.event_loop.is_running()
    }

    /// Runs one scheduler iteration inline: sweep timeouts, then issue
    /// polls. The background event loop does exactly this every tick;
    /// exposed for hosts that drive scheduling themselves and for tests.
    pub fn tick(&self) {
        self.scheduler.tick();
    }

    /// Read-only preview of what the next poll would ask about.
    #[must_use]
    pub fn invs_for_next_poll(&self) -> Vec<Inv> {
        self.scheduler.invs_for_next_poll()
    }

    /// Number of polls currently awaiting an answer.
    #[must_use]
    pub fn pending_query_count(&self) -> usize {
        self.scheduler.pending_query_count()
    }

    /// Unbinds a disconnected peer. Its outstanding queries die by
    /// timeout.
    pub fn peer_disconnected(&self, node: NodeId) {
        self.peers.lock().remove_node(node);
    }
}
