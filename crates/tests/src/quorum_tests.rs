//! Quorum detection, latching and construction-time parameter validation.

use std::sync::Arc;

use serac_core::{
    amount::Amount,
    peers::Proof,
    AvalancheConfig, ChainView, ItemId, NetworkSink, Processor,
};

use crate::mock::{block, MockChain, RecordingSink, TestNode};

fn try_build(stake: &str, ratio: f64, avaproofs: i64) -> Result<Processor, serac_core::ConfigError> {
    let config = AvalancheConfig {
        min_quorum_stake: stake.to_string(),
        min_quorum_connected_score_ratio: ratio,
        min_avaproofs_node_count: avaproofs,
        ..AvalancheConfig::default()
    };
    Processor::new(
        config,
        Arc::new(MockChain::default()) as Arc<dyn ChainView>,
        Arc::new(RecordingSink::default()) as Arc<dyn NetworkSink>,
    )
}

#[test]
fn test_quorum_parameter_validation() {
    // Out-of-range parameters refuse to build a processor.
    assert!(try_build("-1", 0.0, 0).is_err());
    assert!(try_build("-0.01", 0.0, 0).is_err());
    assert!(try_build("21000000000000.01", 0.0, 0).is_err());
    assert!(try_build("0", -1.0, 0).is_err());
    assert!(try_build("0", 1.1, 0).is_err());
    assert!(try_build("0", 0.0, -1).is_err());
    assert!(try_build("", 0.0, 0).is_err());

    // Valid corners build fine.
    assert!(try_build("0", 0.0, 0).is_ok());
    assert!(try_build("0.01", 0.0, 0).is_ok());
    assert!(try_build("10", 0.5, 0).is_ok());
    assert!(try_build("10", 1.0, 0).is_ok());
    assert!(try_build("21000000000000.00", 0.0, 0).is_ok());
    assert!(try_build("0", 0.0, 100).is_ok());
}

#[test]
fn test_quorum_detection_with_stake_and_connectivity() {
    // Require 100 score total with half of it connected; our own proof
    // stakes a quarter of it.
    let local_proof = Proof::new(1, ItemId::from_low_u64(1), Amount::from_coins(25), 10);
    let local_hex = local_proof.to_hex();
    let node = TestNode::with_config(|config| {
        config.min_quorum_stake = "100".to_string();
        config.min_quorum_connected_score_ratio = 0.5;
        config.master_key = Some("11".repeat(32));
        config.local_proof = Some(local_hex);
    });

    let local = node.processor.local_proof().expect("local proof configured");
    assert_eq!(local.score(), 25);
    assert!(!node.processor.is_quorum_established());

    // Our proof is registered when the chain tip settles; it counts as
    // connected stake but is only a quarter of the requirement.
    node.processor.with_peer_manager(|pm| {
        assert!(pm.register_proof(&local));
        assert!(pm.is_bound_to_peer(&local.id()));
    });
    assert!(!node.processor.is_quorum_established());

    // More stake appears, still short of the total.
    let proof1 = node.make_proof(50, 2);
    node.processor.with_peer_manager(|pm| {
        assert!(pm.register_proof(&proof1));
    });
    assert!(!node.processor.is_quorum_established());

    // The full total is staked, but only our own quarter is connected.
    let proof2 = node.make_proof(25, 3);
    node.processor.with_peer_manager(|pm| {
        assert!(pm.register_proof(&proof2));
        assert_eq!(pm.total_peers_score(), 100);
        assert_eq!(pm.connected_peers_score(), 0);
    });
    assert!(!node.processor.is_quorum_established());

    // Connecting a peer for proof2 brings connected stake to exactly half.
    node.processor.with_peer_manager(|pm| {
        assert!(pm.add_node(0, proof2.id()));
    });
    assert!(node.processor.is_quorum_established());

    // Once latched, the quorum survives losing the peer and the stake.
    node.processor.with_peer_manager(|pm| {
        assert!(pm.remove_node(0));
        assert_eq!(pm.connected_peers_score(), 0);
    });
    assert!(node.processor.is_quorum_established());

    node.processor.with_peer_manager(|pm| {
        pm.reject_proof(&proof1.id(), serac_core::peers::RejectionMode::Invalidate);
    });
    assert!(node.processor.is_quorum_established());
}

#[test]
fn test_min_avaproofs_node_count_gate() {
    let node = TestNode::with_config(|config| {
        config.min_avaproofs_node_count = 3;
    });
    let peers = node.connect_peers(3);
    assert!(!node.processor.is_quorum_established());

    // Signals from unknown peers do not count.
    node.processor.avaproofs_sent(999);
    assert_eq!(node.processor.avaproofs_node_counter(), 0);

    node.processor.avaproofs_sent(peers[0]);
    assert_eq!(node.processor.avaproofs_node_counter(), 1);

    // Idempotent per peer.
    node.processor.avaproofs_sent(peers[0]);
    assert_eq!(node.processor.avaproofs_node_counter(), 1);
    assert!(!node.processor.is_quorum_established());

    node.processor.avaproofs_sent(peers[1]);
    assert!(!node.processor.is_quorum_established());

    node.processor.avaproofs_sent(peers[2]);
    assert_eq!(node.processor.avaproofs_node_counter(), 3);
    assert!(node.processor.is_quorum_established());
}

#[test]
fn test_votes_before_quorum_do_not_build_confidence() {
    let node = TestNode::with_config(|config| {
        config.min_avaproofs_node_count = 1;
    });
    let peers = node.connect_peers(8);

    let b = block(1, 10);
    assert!(node.processor.add_block_to_reconcile(b));

    // Polls go out and votes come back, but confidence is frozen until
    // the quorum latches.
    node.deliver_quietly(0, 20);
    assert_eq!(node.processor.block_confidence(&b.hash), 0);
    assert!(node.processor.is_block_accepted(&b.hash));

    node.processor.avaproofs_sent(peers[0]);
    assert!(node.processor.is_quorum_established());

    // The window is already saturated with yes votes; the next conclusive
    // vote starts the climb immediately.
    node.deliver_quietly(0, 1);
    assert_eq!(node.processor.block_confidence(&b.hash), 1);
    node.deliver_quietly(0, 5);
    assert_eq!(node.processor.block_confidence(&b.hash), 6);
}
