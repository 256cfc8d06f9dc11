//! # Serac Core
//!
//! Stake-weighted repeated-poll consensus for a cryptocurrency node: the
//! engine samples remote peers' opinions on contested items (candidate
//! blocks and stake proofs), folds the answers through a per-item
//! confidence machine, and latches each item as finalized, invalid or
//! stale.
//!
//! - **[`record`]**: the per-item confidence state machine folding the
//!   last eight votes into a supermajority decision.
//!
//! - **[`votemap`]**: priority-ordered containers of reconciling items,
//!   blocks by chain work and proofs by stake score.
//!
//! - **[`peers`]**: the stake-proof and peer registry with score
//!   accounting and the rotating peer-selection discipline.
//!
//! - **scheduler** (internal): the event-loop body packing bounded
//!   polls, sweeping timeouts and ingesting responses.
//!
//! - **quorum** (internal): the latch deciding when enough stake is
//!   known and connected for votes to count.
//!
//! - **[`processor`]**: the facade the host node talks to.
//!
//! ## Data flow
//!
//! ```text
//!   host validation ──► add_*_to_reconcile ──► VoteMap (blocks / proofs)
//!                                                   │ top-K by priority
//!   event loop tick ──► timeout sweep ──► poll build ──► NetworkSink::send_poll
//!                                                   │ (node, round) recorded
//!   network thread ───► register_votes(node, resp) ─┘
//!                             │ per-vote fold (VoteRecord)
//!                             ▼
//!                   VoteUpdates {Accepted, Rejected, Finalized, Invalid, Stale}
//! ```
//!
//! The engine never blocks on I/O: poll emission is fire-and-forget into
//! the transport's send queue, and every lock is released before leaving
//! the engine.

pub mod amount;
pub mod config;
pub mod errors;
mod event_loop;
pub mod interfaces;
pub mod peers;
pub mod processor;
mod query;
pub mod record;
mod quorum;
mod scheduler;
pub mod types;
pub mod votemap;

pub use config::AvalancheConfig;
pub use errors::{ConfigError, ResponseError};
pub use interfaces::{ChainView, Hello, NetworkSink};
pub use processor::Processor;
pub use query::Query;
pub use record::{FINALIZATION_SCORE, MAX_INFLIGHT_PER_ITEM};
pub use scheduler::{MAX_ELEMENT_POLL, MAX_INFLIGHT_POLL};
pub use types::{
    Block, BlockVoteUpdate, ChainWork, Inv, InvKind, ItemId, NodeId, Poll, ProofId,
    ProofVoteUpdate, Response, Vote, VoteStatus, VoteUpdates, NO_NODE,
};
