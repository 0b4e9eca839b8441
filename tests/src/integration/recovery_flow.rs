//! # Recovery Flow
//!
//! A validator that restarts mid-height reloads the requests it already
//! verified and votes for them again without re-executing. A validator that
//! missed the proposal entirely fetches it from the leader once a recovery
//! notice shows the header reached quorum elsewhere.

use super::network::{wait_until, Network, HEIGHT};
use qc_08_block_verify::{ProcessState, VerifyResult};
use shared_bus::{BlockchainEvent, EventFilter, EventTopic};
use shared_types::{NetworkMessage, RecoveryKind, RecoveryState, RoleType, RoleUpdate};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restarted_validator_revotes_restored_block() {
    let network = Network::start(11, &[], 0).await;
    let hash = network.request_hash();
    network.join_all();
    assert!(wait_until(|| !network.nodes[2].local_verified().is_empty()).await);

    let restarted = network.restart(2);
    let mut outbound = restarted
        .bus
        .subscribe(EventFilter::topic(EventTopic::NetworkOutbound));

    assert_eq!(restarted.dispatcher.reload_verified_blocks(), 1);
    assert_eq!(restarted.dispatcher.manager().pending_len(), 1);

    restarted.dispatch(BlockchainEvent::RoleUpdated(RoleUpdate {
        block_number: HEIGHT - 1,
        role: RoleType::Validator,
        leader: network.leader().account(),
        super_seq: 0,
    }));
    assert_eq!(restarted.dispatcher.manager().pending_len(), 0);
    restarted.dispatch(BlockchainEvent::LeaderChanged(network.leader_notice()));

    let record = restarted.process().record(&hash).unwrap();
    assert_eq!(record.verify_result, VerifyResult::Restored);
    assert_eq!(record.votes().len(), 1);
    assert!(record.votes()[0].agree);
    assert_eq!(restarted.state(), ProcessState::QuorumVerify);

    match outbound.try_recv().unwrap() {
        Some(BlockchainEvent::NetworkSend { message, .. }) => match *message {
            NetworkMessage::Vote(vote) => {
                assert_eq!(vote.sign_hash, hash);
                assert_eq!(vote.from, restarted.account());
            }
            other => panic!("unexpected message: {:?}", other),
        },
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_committed_blocks_are_not_reloaded() {
    let network = Network::start(11, &[], 0).await;
    network.join_all();
    assert!(wait_until(|| !network.nodes[3].local_verified().is_empty()).await);

    network.commit_head(HEIGHT);
    let restarted = network.restart(3);
    assert_eq!(restarted.dispatcher.reload_verified_blocks(), 0);
    assert_eq!(restarted.dispatcher.manager().pending_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lagging_validator_fetches_full_block_from_leader() {
    let network = Network::start(11, &[], 0).await;
    let hash = network.request_hash();
    let lagging = 10;

    for index in 0..lagging {
        network.join(index);
    }
    // Role and leader arrive, the proposal never does.
    network.enter_height(lagging);

    assert!(wait_until(|| !network.leader().pos_finished().is_empty()).await);
    let posed = network.leader().pos_finished()[0].header.clone();
    assert!(network.nodes[lagging].pos_finished().is_empty());

    network.nodes[lagging].dispatch(BlockchainEvent::RecoveryRequested(RecoveryState {
        kind: RecoveryKind::Pos,
        header: posed,
        from: network.leader().account(),
    }));

    assert!(
        wait_until(|| !network.nodes[lagging].pos_finished().is_empty()).await,
        "lagging validator should catch up through the leader"
    );
    let record = network.nodes[lagging].process().record(&hash).unwrap();
    assert_eq!(record.verify_result, VerifyResult::Success);
    assert_eq!(record.original_txs, network.txs);
}
