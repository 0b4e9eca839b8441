//! # Quorum Flow
//!
//! Eleven equal-stake validators: eight agreeing votes pass a request, four
//! disagreeing votes sink it.
//!
//! ```text
//! [Leader] ──LocalRequest──→ verify ──Vote──→ [Validators]
//! [Validator] ──ConsensusRequest──→ fetch txs → re-execute ──Vote──→ [Validators]
//!                                                  │
//!                          8 agree of 11 ──────────┴──→ PosFinished
//! ```

use super::network::{wait_until, Network, HEIGHT};
use qc_08_block_verify::ProcessState;
use std::time::Duration;

const VALIDATORS: usize = 11;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_eleven_validators_reach_quorum() {
    let network = Network::start(VALIDATORS, &[], 0).await;
    let hash = network.request_hash();
    network.join_all();

    assert!(
        wait_until(|| network.nodes.iter().all(|node| !node.pos_finished().is_empty())).await,
        "every validator should finish"
    );

    for node in &network.nodes {
        let finished = node.pos_finished();
        assert_eq!(finished.len(), 1);
        let finished = &finished[0];
        assert_eq!(finished.number, HEIGHT);
        assert_eq!(finished.header.hash_no_signs_and_nonce(), hash);
        assert_eq!(finished.tx_manifest, network.request().tx_manifest);
        assert!(finished.header.signatures.len() >= 8);
        assert_eq!(node.state(), ProcessState::End);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verified_requests_are_logged_for_recovery() {
    let network = Network::start(VALIDATORS, &[], 0).await;
    network.join_all();

    assert!(wait_until(|| network.nodes.iter().all(|node| !node.local_verified().is_empty())).await);
    for node in &network.nodes {
        assert!(!node.store.is_empty());
        let verified = &node.local_verified()[0];
        assert_eq!(verified.block_hash, network.request_hash());
        assert_eq!(verified.original_txs, network.txs);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_dissenters_do_not_block_quorum() {
    let dissenters = [8, 9, 10];
    let network = Network::start(VALIDATORS, &dissenters, 0).await;
    network.join_all();

    let honest = network.honest();
    assert_eq!(honest.len(), 8);
    assert!(
        wait_until(|| honest.iter().all(|&i| !network.nodes[i].pos_finished().is_empty())).await,
        "honest validators should finish"
    );
    assert!(
        wait_until(|| dissenters.iter().all(|&i| network.nodes[i].state() == ProcessState::End))
            .await,
        "dissenters should follow the quorum"
    );

    // Dissenters never verified the block, so they report nothing upstream.
    for &i in &dissenters {
        assert!(network.nodes[i].pos_finished().is_empty());
        assert!(network.nodes[i].local_verified().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_four_dissenters_fail_quorum() {
    let network = Network::start(VALIDATORS, &[7, 8, 9, 10], 0).await;
    let hash = network.request_hash();
    network.join_all();

    assert!(
        wait_until(|| network
            .nodes
            .iter()
            .all(|node| node.vote_count(&hash) == VALIDATORS))
        .await,
        "every vote should reach every validator"
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    for node in &network.nodes {
        assert!(node.pos_finished().is_empty());
        assert_eq!(node.state(), ProcessState::QuorumVerify);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quorum_waits_for_eighth_agree() {
    // Validators 8..=10 start offline; 7 dissents.
    let network = Network::start(VALIDATORS, &[7], 0).await;
    let hash = network.request_hash();
    for index in 0..8 {
        network.join(index);
    }

    // Seven agree and one disagree: enough votes, not enough agreement.
    assert!(wait_until(|| (0..8).all(|i| network.nodes[i].vote_count(&hash) == 8)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    for node in &network.nodes[..8] {
        assert!(node.pos_finished().is_empty());
        assert_eq!(node.state(), ProcessState::QuorumVerify);
    }

    network.join(8);

    let finishers = [0, 1, 2, 3, 4, 5, 6, 8];
    assert!(
        wait_until(|| finishers
            .iter()
            .all(|&i| !network.nodes[i].pos_finished().is_empty()))
        .await,
        "the eighth agree vote should pass the request"
    );
    assert!(network.nodes[7].pos_finished().is_empty());
}
