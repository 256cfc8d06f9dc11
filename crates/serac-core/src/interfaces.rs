//! Narrow seams toward the host node.
//!
//! The engine never reaches into the chain or the transport directly; the
//! host hands it these two capabilities at construction. Both are called
//! with no engine lock held across them, and sink emissions are
//! fire-and-forget into a send queue the transport owns.

use crate::{
    peers::Delegation,
    types::{ItemId, NodeId, Poll},
};

/// Read-only view of the chain, answering whether a block is still a live
/// voting candidate (not marked failed, not below the finalized tip).
pub trait ChainView: Send + Sync {
    fn is_worth_polling(&self, block: &ItemId) -> bool;
}

/// Hello payload: proves this session key may speak for a stake proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub delegation: Delegation,
}

/// Outbound message queue owned by the transport layer.
pub trait NetworkSink: Send + Sync {
    fn send_poll(&self, node: NodeId, poll: Poll);
    fn send_hello(&self, node: NodeId, hello: Hello);
}
