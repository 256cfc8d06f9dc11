//! Wire-level and identity types shared across the engine.
//!
//! These are semantic types only: serialization to the actual network
//! encoding is owned by the transport layer.

use std::fmt;

/// Identifier of a connected peer, assigned by the host's connection manager.
pub type NodeId = i64;

/// Sentinel returned by peer selection when no peer is eligible.
pub const NO_NODE: NodeId = -1;

/// A 256-bit item identifier (block hash or proof id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ItemId(pub [u8; 32]);

impl ItemId {
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Builds an id with a recognizable low-word, convenient for fixtures.
    #[must_use]
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parses a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns an error message when the input is not exactly 32 hex-encoded
    /// bytes.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let raw = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
        let bytes: [u8; 32] =
            raw.try_into().map_err(|_| "expected 32 bytes".to_string())?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Proof ids share the identifier space with block hashes.
pub type ProofId = ItemId;

/// Accumulated chain work, compared numerically (big-endian bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChainWork(pub [u8; 32]);

impl ChainWork {
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

/// A candidate block as seen by the engine: identity plus the work snapshot
/// used to rank it against other contenders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub hash: ItemId,
    pub work: ChainWork,
}

impl Block {
    #[must_use]
    pub const fn new(hash: ItemId, work: ChainWork) -> Self {
        Self { hash, work }
    }
}

/// Discriminates the two item kinds carried in a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvKind {
    Block,
    Proof,
}

/// Compact item reference carried in a poll: kind tag plus 256-bit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inv {
    pub kind: InvKind,
    pub id: ItemId,
}

impl Inv {
    #[must_use]
    pub const fn block(id: ItemId) -> Self {
        Self { kind: InvKind::Block, id }
    }

    #[must_use]
    pub const fn proof(id: ItemId) -> Self {
        Self { kind: InvKind::Proof, id }
    }
}

/// One peer opinion about one item.
///
/// The error code follows the original wire convention: `0` is a yes vote,
/// a negative value means the peer had no opinion (neutral), and any
/// positive value is a no vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub error_code: i32,
    pub id: ItemId,
}

impl Vote {
    #[must_use]
    pub const fn new(error_code: i32, id: ItemId) -> Self {
        Self { error_code, id }
    }

    #[must_use]
    pub const fn is_yes(&self) -> bool {
        self.error_code == 0
    }

    /// A definite vote is either a yes or a no; neutral votes are not.
    #[must_use]
    pub const fn is_definite(&self) -> bool {
        self.error_code >= 0
    }
}

/// An outgoing poll: the round tag is opaque to the peer and echoed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub round: u64,
    pub invs: Vec<Inv>,
}

/// A peer's answer to a poll.
///
/// `cooldown_ms` asks the querier to wait before polling this peer again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub round: u64,
    pub cooldown_ms: u64,
    pub votes: Vec<Vote>,
}

impl Response {
    #[must_use]
    pub fn new(round: u64, cooldown_ms: u64, votes: Vec<Vote>) -> Self {
        Self { round, cooldown_ms, votes }
    }
}

/// The latched or transitional verdict on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteStatus {
    /// Finalized on the reject side.
    Invalid,
    /// The majority flipped to the reject side.
    Rejected,
    /// The majority flipped to the accept side.
    Accepted,
    /// Finalized on the accept side.
    Finalized,
    /// Abandoned after too many indecisive votes.
    Stale,
}

impl VoteStatus {
    /// Static label for structured log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Rejected => "rejected",
            Self::Accepted => "accepted",
            Self::Finalized => "finalized",
            Self::Stale => "stale",
        }
    }

    /// Terminal statuses end reconciliation for the item.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Finalized | Self::Stale)
    }
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status transition for a block under reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockVoteUpdate {
    pub block: Block,
    pub status: VoteStatus,
}

/// Status transition for a stake proof under reconciliation.
#[derive(Debug, Clone)]
pub struct ProofVoteUpdate {
    pub proof: crate::peers::ProofRef,
    pub status: VoteStatus,
}

/// Status transitions produced while ingesting one response.
#[derive(Debug, Clone, Default)]
pub struct VoteUpdates {
    pub blocks: Vec<BlockVoteUpdate>,
    pub proofs: Vec<ProofVoteUpdate>,
}

impl VoteUpdates {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.proofs.is_empty()
    }
}
