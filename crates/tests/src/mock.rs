//! Reusable test doubles and the `TestNode` fixture.

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;
use serac_core::{
    amount::Amount,
    peers::{Proof, ProofRef},
    AvalancheConfig, Block, ChainView, ChainWork, Hello, ItemId, NetworkSink, NodeId, Poll,
    Processor, Response, Vote, VoteUpdates,
};

/// Chain view where every block is live until explicitly failed.
#[derive(Default)]
pub struct MockChain {
    failed: Mutex<HashSet<ItemId>>,
}

impl MockChain {
    pub fn fail_block(&self, hash: ItemId) {
        self.failed.lock().insert(hash);
    }
}

impl ChainView for MockChain {
    fn is_worth_polling(&self, block: &ItemId) -> bool {
        !self.failed.lock().contains(block)
    }
}

/// Transport double collecting every emission.
#[derive(Default)]
pub struct RecordingSink {
    polls: Mutex<Vec<(NodeId, Poll)>>,
    hellos: Mutex<Vec<(NodeId, Hello)>>,
}

impl RecordingSink {
    pub fn take_polls(&self) -> Vec<(NodeId, Poll)> {
        std::mem::take(&mut self.polls.lock())
    }

    pub fn hello_count(&self) -> usize {
        self.hellos.lock().len()
    }
}

impl NetworkSink for RecordingSink {
    fn send_poll(&self, node: NodeId, poll: Poll) {
        self.polls.lock().push((node, poll));
    }

    fn send_hello(&self, node: NodeId, hello: Hello) {
        self.hellos.lock().push((node, hello));
    }
}

/// A node under test: the engine plus its collaborator doubles and a FIFO
/// of polls awaiting an answer.
pub struct TestNode {
    pub processor: Processor,
    pub chain: Arc<MockChain>,
    pub sink: Arc<RecordingSink>,
    pending: Mutex<VecDeque<(NodeId, Poll)>>,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Builds a node after letting the caller adjust the configuration.
    pub fn with_config(adjust: impl FnOnce(&mut AvalancheConfig)) -> Self {
        let mut config = AvalancheConfig::default();
        adjust(&mut config);

        let chain = Arc::new(MockChain::default());
        let sink = Arc::new(RecordingSink::default());
        let processor = Processor::new(
            config,
            Arc::clone(&chain) as Arc<dyn ChainView>,
            Arc::clone(&sink) as Arc<dyn NetworkSink>,
        )
        .expect("test config must validate");

        let node = Self { processor, chain, sink, pending: Mutex::new(VecDeque::new()) };
        node.processor.with_peer_manager(|pm| pm.update_chain_tip(100));
        node
    }

    /// Registers `count` staked peers, each bound to its own proof.
    pub fn connect_peers(&self, count: usize) -> Vec<NodeId> {
        self.processor.with_peer_manager(|pm| {
            (0..count)
                .map(|i| {
                    let node = NodeId::try_from(i).unwrap();
                    let proof = self.make_proof(10, 9_000 + i as u64);
                    assert!(pm.register_proof(&proof));
                    assert!(pm.add_node(node, proof.id()));
                    node
                })
                .collect()
        })
    }

    /// Builds a mature proof with its own staked output set.
    pub fn make_proof(&self, coins: i64, stake_low: u64) -> ProofRef {
        Arc::new(Proof::new(1, ItemId::from_low_u64(stake_low), Amount::from_coins(coins), 10))
    }

    /// Moves freshly sent polls into the answer queue.
    fn pump(&self) {
        self.pending.lock().extend(self.sink.take_polls());
    }

    /// Answers the oldest outstanding poll with the given vote code for
    /// every item it asks about, ticking the scheduler as needed to
    /// produce one.
    pub fn deliver_one(&self, error_code: i32) -> VoteUpdates {
        loop {
            self.pump();
            let front = self.pending.lock().pop_front();
            if let Some((node, poll)) = front {
                let votes = poll.invs.iter().map(|inv| Vote::new(error_code, inv.id)).collect();
                return self
                    .processor
                    .register_votes(node, &Response::new(poll.round, 0, votes))
                    .expect("well-formed response");
            }
            self.processor.tick();
        }
    }

    /// Delivers `count` votes, asserting that none of them changes any
    /// item status.
    pub fn deliver_quietly(&self, error_code: i32, count: u32) {
        for i in 0..count {
            let updates = self.deliver_one(error_code);
            assert!(
                updates.is_empty(),
                "vote {} of {count} unexpectedly produced updates",
                i + 1
            );
        }
    }
}

/// Shorthand for a block with recognizable hash and work values.
pub fn block(low: u64, work: u64) -> Block {
    Block::new(ItemId::from_low_u64(low), ChainWork::from_u64(work))
}
