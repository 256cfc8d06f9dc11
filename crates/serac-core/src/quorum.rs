//! Quorum detection.
//!
//! Voting results are only trustworthy once enough staked score is known
//! and enough of it is actively connected. The monitor checks three
//! thresholds and latches the first time all of them hold; the latch never
//! clears, so a quorum that temporarily degrades (a proof replacement, a
//! burst of disconnects) does not flip the engine back into warm-up.

use std::sync::{
    atomic::{AtomicBool, AtomicI64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    peers::{PeerManager, ProofRef},
    types::NodeId,
};

/// Latching quorum gate over the peer registry.
pub(crate) struct QuorumMonitor {
    min_score: u64,
    min_connected_score_ratio: f64,
    min_avaproofs_node_count: i64,
    peers: Arc<Mutex<PeerManager>>,
    /// Our own stake, counted as connected once its proof is bound.
    local_proof: Option<ProofRef>,
    established: AtomicBool,
    avaproofs_counter: AtomicI64,
}

impl QuorumMonitor {
    pub(crate) fn new(
        min_score: u64,
        min_connected_score_ratio: f64,
        min_avaproofs_node_count: i64,
        peers: Arc<Mutex<PeerManager>>,
        local_proof: Option<ProofRef>,
    ) -> Self {
        Self {
            min_score,
            min_connected_score_ratio,
            min_avaproofs_node_count,
            peers,
            local_proof,
            established: AtomicBool::new(false),
            avaproofs_counter: AtomicI64::new(0),
        }
    }

    /// Whether the quorum has been established. Evaluates the thresholds
    /// and latches on the first success.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn is_established(&self) -> bool {
        if self.established.load(Ordering::Acquire) {
            return true;
        }

        if self.avaproofs_counter.load(Ordering::Acquire) < self.min_avaproofs_node_count {
            return false;
        }

        let (total, mut connected) = {
            let pm = self.peers.lock();
            let mut connected = pm.connected_peers_score();
            if let Some(local) = &self.local_proof {
                // We are always connected to ourselves, but the peer
                // registry only counts remote bindings.
                if pm.is_bound_to_peer(&local.id()) && !pm.has_node_attached(&local.id()) {
                    connected += local.score();
                }
            }
            (pm.total_peers_score(), connected)
        };
        connected = connected.min(total);

        if total < self.min_score {
            return false;
        }

        if (connected as f64) < (total as f64) * self.min_connected_score_ratio {
            debug!(total, connected, "quorum stake known but not connected enough");
            return false;
        }

        info!(total, connected, "avalanche quorum established");
        self.established.store(true, Ordering::Release);
        true
    }

    /// Counts a peer's proofs-exchange-complete signal, once per peer.
    pub(crate) fn avaproofs_sent(&self, node: NodeId) {
        if self.established.load(Ordering::Acquire) {
            // The counter only matters until the latch sets.
            return;
        }
        if self.peers.lock().latch_avaproofs_sent(node) {
            let seen = self.avaproofs_counter.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(node, seen, "avaproofs exchange completed");
        }
    }

    pub(crate) fn avaproofs_node_counter(&self) -> i64 {
        self.avaproofs_counter.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn reset_avaproofs_counter_for_test(&self) {
        self.avaproofs_counter.store(0, Ordering::Release);
    }
}
