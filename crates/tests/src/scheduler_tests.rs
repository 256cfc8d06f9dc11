//! Polling cadence, timeout handling, in-flight limits and the background
//! event loop.

use std::time::Duration;

use serac_core::{Response, Vote, MAX_INFLIGHT_POLL};

use crate::mock::{block, TestNode};

#[test]
fn test_rounds_are_unique_and_increasing() {
    let node = TestNode::new();
    node.connect_peers(8);
    assert!(node.processor.add_block_to_reconcile(block(1, 10)));

    let mut seen = Vec::new();
    for _ in 0..4 {
        node.processor.tick();
        for (peer, poll) in node.sink.take_polls() {
            seen.push((peer, poll.round));
            let votes = poll.invs.iter().map(|inv| Vote::new(0, inv.id)).collect();
            node.processor
                .register_votes(peer, &Response::new(poll.round, 0, votes))
                .unwrap();
        }
    }

    assert!(!seen.is_empty());
    let rounds: Vec<u64> = seen.iter().map(|(_, r)| *r).collect();
    assert!(rounds.windows(2).all(|w| w[0] < w[1]), "rounds not increasing: {rounds:?}");
}

#[test]
fn test_inflight_cap_with_spare_peer() {
    let node = TestNode::new();
    let peers = node.connect_peers(MAX_INFLIGHT_POLL + 1);
    let b = block(1, 10);
    assert!(node.processor.add_block_to_reconcile(b));

    // Ten ticks worth of polling saturates the cap in one pass.
    for _ in 0..MAX_INFLIGHT_POLL {
        node.processor.tick();
    }
    let polls = node.sink.take_polls();
    assert_eq!(polls.len(), MAX_INFLIGHT_POLL);
    assert_eq!(node.processor.pending_query_count(), MAX_INFLIGHT_POLL);

    // A peer is still available, yet nothing is worth polling.
    let spare_exists = peers.iter().any(|p| !polls.iter().any(|(queried, _)| queried == p));
    assert!(spare_exists);
    assert!(node.processor.invs_for_next_poll().is_empty());

    // Answering one poll frees a slot and polling resumes.
    let (peer, poll) = &polls[0];
    let votes = poll.invs.iter().map(|inv| Vote::new(0, inv.id)).collect();
    node.processor
        .register_votes(*peer, &Response::new(poll.round, 0, votes))
        .unwrap();

    node.processor.tick();
    assert_eq!(node.sink.take_polls().len(), 1);
}

#[test]
fn test_timed_out_query_is_swept_and_reissued() {
    let node = TestNode::with_config(|config| {
        config.query_timeout_ms = 20;
    });
    let peers = node.connect_peers(1);
    let b = block(1, 10);
    assert!(node.processor.add_block_to_reconcile(b));

    node.processor.tick();
    let polls = node.sink.take_polls();
    assert_eq!(polls.len(), 1);
    let stale_round = polls[0].1.round;

    std::thread::sleep(Duration::from_millis(30));
    node.processor.tick();

    // The dead query is gone and the peer was polled again.
    let polls = node.sink.take_polls();
    assert_eq!(polls.len(), 1);
    assert!(polls[0].1.round > stale_round);
    assert_eq!(node.processor.pending_query_count(), 1);

    // Answering the dead round is now rejected without touching state.
    let err = node
        .processor
        .register_votes(peers[0], &Response::new(stale_round, 0, vec![Vote::new(0, b.hash)]))
        .unwrap_err();
    assert_eq!(err.to_string(), "unexpected-ava-response");
    assert_eq!(err.ban_score(), 2);
    assert_eq!(node.processor.block_confidence(&b.hash), 0);
}

#[tokio::test]
async fn test_event_loop_polls_in_background() {
    let node = TestNode::new();
    let peers = node.connect_peers(1);
    let b = block(1, 10);
    assert!(node.processor.add_block_to_reconcile(b));

    assert!(node.processor.start_event_loop());
    assert!(!node.processor.start_event_loop());

    tokio::time::sleep(Duration::from_millis(80)).await;
    let polls = node.sink.take_polls();
    assert_eq!(polls.len(), 1, "one outstanding poll per peer");
    let (peer, poll) = &polls[0];
    assert_eq!(*peer, peers[0]);

    // Answer with a cooldown; the peer must not be polled again before it
    // elapses.
    let votes = poll.invs.iter().map(|inv| Vote::new(0, inv.id)).collect();
    node.processor
        .register_votes(*peer, &Response::new(poll.round, 300, votes))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(node.sink.take_polls().is_empty(), "cooldown not honored");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let polls = node.sink.take_polls();
    assert_eq!(polls.len(), 1, "peer should be polled again after cooldown");
    assert!(polls[0].1.round > poll.round);

    assert!(node.processor.stop_event_loop());
    assert!(!node.processor.stop_event_loop());
}

#[tokio::test]
async fn test_stop_discards_pending_queries() {
    let node = TestNode::new();
    node.connect_peers(4);
    let b = block(1, 10);
    assert!(node.processor.add_block_to_reconcile(b));

    assert!(node.processor.start_event_loop());
    tokio::time::sleep(Duration::from_millis(80)).await;
    let polls = node.sink.take_polls();
    assert_eq!(polls.len(), 4);
    assert_eq!(node.processor.pending_query_count(), 4);

    assert!(node.processor.stop_event_loop());
    assert_eq!(node.processor.pending_query_count(), 0);

    // No terminal updates were synthesized; the item is still reconciling
    // with a clean in-flight budget.
    assert_eq!(node.processor.block_confidence(&b.hash), 0);
    assert_eq!(node.processor.invs_for_next_poll().len(), 1);

    // Discarded queries cannot be answered anymore.
    let (peer, poll) = &polls[0];
    let votes = poll.invs.iter().map(|inv| Vote::new(0, inv.id)).collect();
    let err = node
        .processor
        .register_votes(*peer, &Response::new(poll.round, 0, votes))
        .unwrap_err();
    assert_eq!(err.to_string(), "unexpected-ava-response");
}

#[test]
fn test_poll_preview_does_not_consume_slots() {
    let node = TestNode::new();
    node.connect_peers(1);
    assert!(node.processor.add_block_to_reconcile(block(1, 10)));

    // The preview is repeatable and does not count against the in-flight
    // budget.
    for _ in 0..50 {
        assert_eq!(node.processor.invs_for_next_poll().len(), 1);
    }
    assert_eq!(node.processor.pending_query_count(), 0);

    node.processor.tick();
    assert_eq!(node.sink.take_polls().len(), 1);
}
