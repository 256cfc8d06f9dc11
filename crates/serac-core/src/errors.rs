//! Engine error taxonomy.
//!
//! Construction errors surface synchronously and prevent the engine from
//! existing at all; response-match errors are returned to the network layer
//! together with a ban-score contribution. Nothing in here aborts: every
//! recoverable failure is a value.

use thiserror::Error;

use crate::{amount::AmountError, types::NodeId};

/// Rejected configuration; no engine instance is created.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid minimum quorum stake: {0}")]
    MinQuorumStake(#[from] AmountError),

    #[error("minimum quorum connected score ratio must be between 0.0 and 1.0, got {0}")]
    ConnectedScoreRatio(f64),

    #[error("minimum avaproofs node count must not be negative, got {0}")]
    AvaproofsNodeCount(i64),

    #[error("stale vote threshold must be at least {min}, got {got}")]
    StaleVoteThreshold { min: u32, got: u32 },

    #[error("stale vote factor must be greater than zero")]
    StaleVoteFactor,

    #[error("query timeout must be greater than zero")]
    QueryTimeout,

    #[error("poll interval must be greater than zero")]
    PollInterval,

    #[error("stake utxo confirmations must be greater than zero")]
    StakeUtxoConfirmations,

    #[error("invalid master key: {0}")]
    MasterKey(String),

    #[error("invalid local proof: {0}")]
    LocalProof(String),

    #[error("a local proof requires a master key")]
    LocalProofWithoutMasterKey,
}

/// A response that could not be applied.
///
/// The display form is the wire-stable identifier reported to the peer
/// layer, matching the original protocol strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// No outstanding query matches `(node, round)`: unsolicited, stale
    /// after timeout, or a replayed round. Engine state is untouched.
    #[error("unexpected-ava-response")]
    Unexpected { node: NodeId, round: u64 },

    /// The vote list length does not match the poll. The query is consumed
    /// and no votes are applied.
    #[error("invalid-ava-response-size")]
    InvalidSize { expected: usize, actual: usize },

    /// A vote references a different item than the poll asked about at
    /// that position. The query is consumed and no votes are applied.
    #[error("invalid-ava-response-content")]
    InvalidContent { index: usize },
}

impl ResponseError {
    /// Misbehavior score the host should attribute to the peer.
    ///
    /// An unexpected response is mild (it is routinely produced by an
    /// honest peer answering after the timeout); a malformed response to a
    /// matched query is not.
    #[must_use]
    pub fn ban_score(&self) -> u32 {
        match self {
            Self::Unexpected { .. } => 2,
            Self::InvalidSize { .. } | Self::InvalidContent { .. } => 100,
        }
    }
}
