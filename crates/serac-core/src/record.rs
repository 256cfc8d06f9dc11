//! Per-item confidence state machine.
//!
//! Each reconciling item owns a [`VoteRecord`] that folds the stream of
//! incoming peer votes into an 8-slot sliding window, derives a short-window
//! supermajority decision from it, and drives a confidence counter toward
//! the finalization ceiling. The record also tracks outstanding polls for
//! the item and how many votes it has absorbed, which feeds the staleness
//! criterion.

use crate::types::{NodeId, NO_NODE};

/// Confidence ceiling: once a side has won this many consecutive window
/// decisions, the verdict is latched.
pub const FINALIZATION_SCORE: u16 = 128;

/// Maximum number of outstanding polls referencing a single item.
pub const MAX_INFLIGHT_PER_ITEM: u8 = 10;

/// Default number of votes an item may absorb before going stale at zero
/// confidence.
pub const VOTE_STALE_THRESHOLD: u32 = 4096;

/// Lowest accepted configuration for the staleness threshold: at least one
/// full vote window must fit before an item can be abandoned.
pub const VOTE_STALE_MIN_THRESHOLD: u32 = 8;

/// Default multiplier extending the staleness allowance as confidence grows.
pub const VOTE_STALE_FACTOR: u32 = 2;

const WINDOW: usize = 8;

/// Vote accounting for one item under reconciliation.
#[derive(Debug, Clone)]
pub struct VoteRecord {
    /// Current side of the majority.
    accepted: bool,
    /// Consecutive same-side window decisions, up to [`FINALIZATION_SCORE`].
    confidence: u16,
    /// Bit-window of the last 8 votes, LSB most recent, 1 = yes.
    votes: u8,
    /// Which of the last 8 slots held a definite (non-neutral) vote.
    consider: u8,
    /// Outstanding polls referencing this item.
    inflight: u8,
    /// Total votes absorbed, also the write cursor of `voter_ring`.
    vote_count: u32,
    /// Mixed hashes of the last 8 voters; repeat voters are ignored so a
    /// single peer cannot fill the window on its own.
    voter_ring: [Option<u16>; WINDOW],
}

impl VoteRecord {
    /// Creates a record starting on the given side with zero confidence.
    #[must_use]
    pub fn new(accepted: bool) -> Self {
        Self {
            accepted,
            confidence: 0,
            votes: 0,
            consider: 0,
            inflight: 0,
            vote_count: 0,
            voter_ring: [None; WINDOW],
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    #[must_use]
    pub fn confidence(&self) -> u16 {
        self.confidence
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.confidence >= FINALIZATION_SCORE
    }

    #[must_use]
    pub fn vote_count(&self) -> u32 {
        self.vote_count
    }

    /// Folds one vote into the record.
    ///
    /// `error_code` follows the wire convention (`0` yes, negative neutral,
    /// positive no). While `quorum_established` is false the window still
    /// shifts but confidence neither advances nor flips.
    ///
    /// Returns `true` when the public status changed: the majority flipped
    /// sides, or the confidence counter just reached the finalization
    /// ceiling.
    pub fn register_vote(
        &mut self,
        node: NodeId,
        error_code: i32,
        quorum_established: bool,
    ) -> bool {
        // The vote answers one outstanding poll.
        self.clear_inflight(1);

        if self.is_finalized() {
            return false;
        }

        if !self.admit_voter(node) {
            return false;
        }

        self.votes = (self.votes << 1) | u8::from(error_code == 0);
        self.consider = (self.consider << 1) | u8::from(error_code >= 0);

        // A side needs at least 7 of the 8 slots to win the window; neutral
        // slots count against both sides.
        let yes = (self.votes & self.consider).count_ones() > 6;
        let no = !yes && (!self.votes & self.consider).count_ones() > 6;
        if !yes && !no {
            // Inconclusive window, nothing moves.
            return false;
        }

        if !quorum_established {
            return false;
        }

        if self.accepted == yes {
            self.confidence += 1;
            return self.confidence == FINALIZATION_SCORE;
        }

        if self.confidence > 0 {
            // A contrary decision erases the streak but does not flip.
            self.confidence = 0;
            return false;
        }

        self.accepted = yes;
        true
    }

    /// Whether the item has exceeded its vote allowance and should be
    /// abandoned. The allowance grows with confidence so that an item close
    /// to finalization is given more room than one stuck at zero.
    #[must_use]
    pub fn is_stale(&self, stale_threshold: u32, stale_factor: u32) -> bool {
        let allowance = stale_threshold
            .saturating_add(stale_factor.saturating_mul(u32::from(self.confidence)));
        self.vote_count > allowance
    }

    /// Whether the item can be referenced by one more poll.
    #[must_use]
    pub fn should_poll(&self) -> bool {
        !self.is_finalized() && self.inflight < MAX_INFLIGHT_PER_ITEM
    }

    /// Claims one poll slot. Returns `false` without side effect when the
    /// item is already at its in-flight cap or finalized.
    pub fn register_poll(&mut self) -> bool {
        if !self.should_poll() {
            return false;
        }
        self.inflight += 1;
        true
    }

    /// Releases poll slots after a response or timeout.
    pub fn clear_inflight(&mut self, count: u8) {
        self.inflight = self.inflight.saturating_sub(count);
    }

    #[must_use]
    pub fn inflight(&self) -> u8 {
        self.inflight
    }

    /// Admits a voter unless it is already among the last 8. The slot about
    /// to be overwritten is exempt, so a set of exactly 8 rotating peers is
    /// never blocked.
    fn admit_voter(&mut self, node: NodeId) -> bool {
        if node == NO_NODE {
            // Anonymous votes bypass the ring; used by direct fixtures.
            return true;
        }

        let tag = mix_node_id(node);
        let cursor = self.vote_count as usize;
        for i in 1..WINDOW {
            if self.voter_ring[(cursor + i) % WINDOW] == Some(tag) {
                return false;
            }
        }

        self.voter_ring[cursor % WINDOW] = Some(tag);
        self.vote_count += 1;
        true
    }
}

/// Mixes a node id down to a 16-bit ring tag (LCG + Fibonacci hashing).
fn mix_node_id(node: NodeId) -> u16 {
    let x = node as u64;
    let r1 = 6_364_136_223_846_793_005u64
        .wrapping_mul(x)
        .wrapping_add(1_442_695_040_888_963_407);
    let r2 = 11_400_714_819_323_198_485u64.wrapping_mul(x);
    (r1.wrapping_add(r2) >> 48) as u16
}
