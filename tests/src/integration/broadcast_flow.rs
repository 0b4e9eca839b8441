//! # Broadcast Flow
//!
//! Validators that reach quorum forward the posed request, signatures
//! attached, to broadcast nodes. A broadcast node accepts it on the
//! signatures alone and re-executes before announcing the block.

use super::network::{wait_until, Network};
use qc_08_block_verify::{ProcessState, VerifyResult};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcast_node_accepts_posed_block() {
    let network = Network::start(11, &[], 1).await;
    let broadcast = &network.nodes[11];
    network.join_all();

    assert!(
        wait_until(|| !broadcast.broadcast_finished().is_empty()).await,
        "broadcast node should accept the posed block"
    );

    let accepted = &broadcast.broadcast_finished()[0];
    assert_eq!(accepted.block_hash, network.request_hash());
    assert_eq!(accepted.original_txs, network.txs);
    assert!(accepted.header.signatures.len() >= 8);
    assert_eq!(broadcast.local_verified().len(), 1);
    assert_eq!(broadcast.state(), ProcessState::End);

    let record = broadcast.process().record(&network.request_hash()).unwrap();
    assert_eq!(record.verify_result, VerifyResult::Success);
    // Broadcast nodes never vote.
    assert!(broadcast.pos_finished().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcast_node_ignores_unposed_gossip() {
    let network = Network::start(11, &[], 1).await;
    network.join(11);

    // The leader's gossip carries no signatures yet.
    network.deliver_request(11);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let broadcast = &network.nodes[11];
    assert!(broadcast.broadcast_finished().is_empty());
    assert_eq!(broadcast.state(), ProcessState::Start);
}
