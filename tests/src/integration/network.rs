//! # Simulated Validator Network
//!
//! Builds a set of nodes that share one chain view and one transaction pool.
//! Each node owns an event bus, a [`Dispatcher`] and an in-memory recovery
//! store. A router task per node watches its `NetworkSend` events and emits
//! the matching inbound event on every addressed peer's bus:
//!
//! ```text
//! [Node A bus] ──NetworkSend──→ [router A] ──VoteReceived──→ [Node B bus]
//!                                         ──VoteReceived──→ [Node C bus]
//! ```
//!
//! Node 0 is always the leader of the simulated height.

use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::U256;
use qc_08_block_verify::adapters::{
    BusMessageSender, BusVerifyNotifier, InMemoryKVStore, Secp256k1VoteSigner,
};
use qc_08_block_verify::ports::ExecutionOutcome;
use qc_08_block_verify::{
    BlockVerifyConfig, ChainReader, Dispatcher, HeaderVerifier, Process, ProcessDeps,
    ProcessState, RecoveryLog, StakeTable, StateExecutor, TimeSource, TransactionFetcher,
    VoteSigner,
};
use shared_bus::{BlockchainEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use shared_types::{
    short_hex, Address, BlockHeader, ConsensusRequest, ConsensusTurn, Hash, LeaderChange,
    LocalConsensusRequest, LocalVerified, MessageTarget, NetworkMessage, PosFinished, RoleType,
    RoleUpdate, StateHandle, Transaction, ZERO_ADDRESS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

pub(crate) const HEIGHT: u64 = 10;
pub(crate) const PARENT_HASH: Hash = [9u8; 32];
const HEADER_TIME: u64 = 1_000;

/// Seven dispatcher topics, the router and the result collector.
const SUBSCRIPTIONS_PER_NODE: usize = 9;

const WAIT_STEP: Duration = Duration::from_millis(10);
const WAIT_LIMIT: Duration = Duration::from_secs(10);

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Short resend intervals so late joiners still hear every vote.
pub(crate) fn test_config() -> BlockVerifyConfig {
    BlockVerifyConfig {
        tx_fetch_timeout_ms: 1_000,
        vote_resend_interval_ms: 50,
        vote_resend_times: 200,
        mining_resend_interval_ms: 100,
        posed_resend_interval_ms: 100,
        ..BlockVerifyConfig::default()
    }
}

/// Poll `condition` until it holds or the wait limit passes.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    condition()
}

// =============================================================================
// COLLABORATORS
// =============================================================================

struct TestChain {
    parent: BlockHeader,
    stakes: StakeTable,
    head: AtomicU64,
}

impl ChainReader for TestChain {
    fn current_number(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    fn header_by_hash(&self, hash: &Hash) -> Option<BlockHeader> {
        (*hash == PARENT_HASH).then(|| self.parent.clone())
    }

    fn stake_table(&self, _parent_hash: &Hash) -> Result<StakeTable, String> {
        Ok(self.stakes.clone())
    }

    fn is_broadcast_number(&self, _number: u64) -> bool {
        false
    }

    fn broadcast_accounts(&self, _parent_hash: &Hash) -> Result<Vec<Address>, String> {
        Ok(vec![])
    }
}

/// Rejecting headers makes a validator vote against every request.
struct TestHeaderVerifier {
    reject: bool,
}

impl HeaderVerifier for TestHeaderVerifier {
    fn verify_version(&self, _header: &BlockHeader, _parent: &BlockHeader) -> Result<(), String> {
        Ok(())
    }

    fn verify_header(&self, _header: &BlockHeader, _parent: &BlockHeader) -> Result<(), String> {
        if self.reject {
            return Err("seed signature mismatch".into());
        }
        Ok(())
    }
}

/// Reproduces the proposed header exactly.
struct EchoExecutor;

impl StateExecutor for EchoExecutor {
    fn execute(&self, header: &BlockHeader, txs: &[Transaction]) -> Result<ExecutionOutcome, String> {
        Ok(ExecutionOutcome {
            header: header.clone(),
            final_txs: txs.to_vec(),
            receipts: vec![],
            state: StateHandle {
                root: header.state_root,
                snapshot_id: header.number,
            },
        })
    }
}

type TxPool = Arc<Mutex<HashMap<Hash, Transaction>>>;

struct PoolFetcher {
    pool: TxPool,
}

#[async_trait]
impl TransactionFetcher for PoolFetcher {
    async fn fetch(
        &self,
        _number: u64,
        manifest: &[Hash],
        _from: Address,
    ) -> Result<Vec<Transaction>, String> {
        let pool = self.pool.lock();
        manifest
            .iter()
            .map(|hash| {
                pool.get(hash)
                    .cloned()
                    .ok_or_else(|| format!("transaction {} not in pool", short_hex(hash)))
            })
            .collect()
    }
}

struct FixedClock;

impl TimeSource for FixedClock {
    fn now_millis(&self) -> u64 {
        HEADER_TIME * 1_000
    }
}

// =============================================================================
// NODES
// =============================================================================

struct Peer {
    account: Address,
    role: RoleType,
    bus: Arc<InMemoryEventBus>,
}

pub(crate) struct Node {
    pub role: RoleType,
    pub signer: Secp256k1VoteSigner,
    pub bus: Arc<InMemoryEventBus>,
    pub dispatcher: Arc<Dispatcher>,
    pub store: InMemoryKVStore,
    reject_headers: bool,
    results: Arc<Mutex<Vec<BlockchainEvent>>>,
}

impl Node {
    fn build(
        role: RoleType,
        signer: Secp256k1VoteSigner,
        reject_headers: bool,
        chain: Arc<TestChain>,
        pool: TxPool,
        store: InMemoryKVStore,
    ) -> Self {
        let bus = Arc::new(InMemoryEventBus::new());
        let config = test_config();
        let recovery =
            Arc::new(RecoveryLog::new(Box::new(store.clone()), config.recovery_capacity).unwrap());
        let deps = Arc::new(ProcessDeps::new(
            config,
            chain,
            Arc::new(TestHeaderVerifier {
                reject: reject_headers,
            }),
            Arc::new(EchoExecutor),
            Arc::new(PoolFetcher { pool }),
            Arc::new(signer.clone()),
            Arc::new(BusMessageSender::new(Arc::clone(&bus))),
            Arc::new(BusVerifyNotifier::new(Arc::clone(&bus))),
            recovery,
            Arc::new(FixedClock),
        ));

        Self {
            role,
            signer,
            dispatcher: Arc::new(Dispatcher::new(deps)),
            bus,
            store,
            reject_headers,
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn spawn(&self, peers: Arc<Vec<Peer>>, shutdown: watch::Receiver<bool>) {
        let outbound = self.bus.subscribe(EventFilter::topic(EventTopic::NetworkOutbound));
        tokio::spawn(route(outbound, peers, self.account()));

        let mut verify_results = self.bus.subscribe(EventFilter::topic(EventTopic::VerifyResult));
        let results = Arc::clone(&self.results);
        tokio::spawn(async move {
            while let Some(event) = verify_results.recv().await {
                results.lock().push(event);
            }
        });

        tokio::spawn(Arc::clone(&self.dispatcher).run(Arc::clone(&self.bus), shutdown));
    }

    pub fn account(&self) -> Address {
        self.signer.account()
    }

    pub fn dispatch(&self, event: BlockchainEvent) {
        self.dispatcher.dispatch(event).unwrap();
    }

    pub fn process(&self) -> Arc<Process> {
        self.dispatcher.manager().process(HEIGHT).unwrap()
    }

    /// Idle until the node has entered the simulated height.
    pub fn state(&self) -> ProcessState {
        self.dispatcher
            .manager()
            .process(HEIGHT)
            .map_or(ProcessState::Idle, |process| process.state())
    }

    pub fn vote_count(&self, hash: &Hash) -> usize {
        self.dispatcher
            .manager()
            .process(HEIGHT)
            .ok()
            .and_then(|process| process.record(hash))
            .map_or(0, |record| record.votes().len())
    }

    pub fn pos_finished(&self) -> Vec<PosFinished> {
        self.results
            .lock()
            .iter()
            .filter_map(|event| match event {
                BlockchainEvent::PosFinished(finished) => Some((**finished).clone()),
                _ => None,
            })
            .collect()
    }

    pub fn broadcast_finished(&self) -> Vec<LocalVerified> {
        self.results
            .lock()
            .iter()
            .filter_map(|event| match event {
                BlockchainEvent::BroadcastPosFinished(verified) => Some((**verified).clone()),
                _ => None,
            })
            .collect()
    }

    pub fn local_verified(&self) -> Vec<LocalVerified> {
        self.results
            .lock()
            .iter()
            .filter_map(|event| match event {
                BlockchainEvent::LocalVerifyOk(verified) => Some((**verified).clone()),
                _ => None,
            })
            .collect()
    }
}

async fn route(mut outbound: Subscription, peers: Arc<Vec<Peer>>, own: Address) {
    while let Some(event) = outbound.recv().await {
        let BlockchainEvent::NetworkSend { target, message } = event else {
            continue;
        };
        let Some(inbound) = inbound_event(*message) else {
            continue;
        };
        for peer in peers.iter().filter(|peer| peer.account != own) {
            let addressed = match target {
                MessageTarget::Node(account) => account == peer.account,
                _ => target.includes_role(peer.role),
            };
            if addressed {
                peer.bus.emit(inbound.clone());
            }
        }
    }
}

/// Miners are not simulated, so mining requests go nowhere.
fn inbound_event(message: NetworkMessage) -> Option<BlockchainEvent> {
    match message {
        NetworkMessage::Vote(vote) => Some(BlockchainEvent::VoteReceived(vote)),
        NetworkMessage::PosedRequest(request) => {
            Some(BlockchainEvent::ConsensusRequestReceived(request))
        }
        NetworkMessage::FullBlockRequest(request) => {
            Some(BlockchainEvent::FullBlockRequested(request))
        }
        NetworkMessage::FullBlockResponse(response) => {
            Some(BlockchainEvent::FullBlockReceived(Box::new(response)))
        }
        NetworkMessage::MiningRequest(_) => None,
    }
}

// =============================================================================
// NETWORK
// =============================================================================

pub(crate) struct Network {
    pub nodes: Vec<Node>,
    pub txs: Vec<Transaction>,
    chain: Arc<TestChain>,
    pool: TxPool,
    shutdown: watch::Sender<bool>,
}

impl Network {
    pub const LEADER: usize = 0;

    /// Start `validators` equal-stake validators followed by
    /// `broadcast_nodes` broadcast nodes. Validators listed in `dissenters`
    /// reject every header.
    pub async fn start(validators: usize, dissenters: &[usize], broadcast_nodes: usize) -> Self {
        init_tracing();

        let validator_keys: Vec<Secp256k1VoteSigner> = (0..validators)
            .map(|i| Secp256k1VoteSigner::from_bytes(&[i as u8 + 1; 32]).unwrap())
            .collect();
        let broadcast_keys: Vec<Secp256k1VoteSigner> = (0..broadcast_nodes)
            .map(|i| Secp256k1VoteSigner::from_bytes(&[i as u8 + 101; 32]).unwrap())
            .collect();

        let chain = Arc::new(TestChain {
            parent: BlockHeader {
                number: HEIGHT - 1,
                ..Default::default()
            },
            stakes: StakeTable::new(validator_keys.iter().map(|key| (key.account(), 1))),
            head: AtomicU64::new(HEIGHT - 1),
        });

        let txs: Vec<Transaction> = (0..3).map(sample_tx).collect();
        let pool: TxPool = Arc::new(Mutex::new(
            txs.iter().map(|tx| (tx.hash(), tx.clone())).collect(),
        ));

        let roles = std::iter::repeat(RoleType::Validator)
            .take(validators)
            .chain(std::iter::repeat(RoleType::Broadcast).take(broadcast_nodes));
        let nodes: Vec<Node> = validator_keys
            .into_iter()
            .chain(broadcast_keys)
            .zip(roles)
            .enumerate()
            .map(|(i, (signer, role))| {
                Node::build(
                    role,
                    signer,
                    dissenters.contains(&i),
                    Arc::clone(&chain),
                    Arc::clone(&pool),
                    InMemoryKVStore::new(),
                )
            })
            .collect();

        let peers: Arc<Vec<Peer>> = Arc::new(
            nodes
                .iter()
                .map(|node| Peer {
                    account: node.account(),
                    role: node.role,
                    bus: Arc::clone(&node.bus),
                })
                .collect(),
        );

        let (shutdown, _) = watch::channel(false);
        for node in &nodes {
            node.spawn(Arc::clone(&peers), shutdown.subscribe());
        }
        for node in &nodes {
            assert!(
                wait_until(|| node.bus.subscriber_count() >= SUBSCRIPTIONS_PER_NODE).await,
                "dispatcher did not subscribe"
            );
        }

        Self {
            nodes,
            txs,
            chain,
            pool,
            shutdown,
        }
    }

    pub fn leader(&self) -> &Node {
        &self.nodes[Self::LEADER]
    }

    pub fn request(&self) -> ConsensusRequest {
        let leader = self.leader().account();
        ConsensusRequest {
            header: BlockHeader {
                parent_hash: PARENT_HASH,
                leader,
                number: HEIGHT,
                time: HEADER_TIME,
                ..Default::default()
            },
            consensus_turn: ConsensusTurn::default(),
            tx_manifest: self.txs.iter().map(Transaction::hash).collect(),
            from: leader,
        }
    }

    pub fn request_hash(&self) -> Hash {
        self.request().hash()
    }

    pub fn leader_notice(&self) -> LeaderChange {
        LeaderChange {
            number: HEIGHT,
            consensus_state: true,
            leader: self.leader().account(),
            next_leader: ZERO_ADDRESS,
            consensus_turn: ConsensusTurn::default(),
            reelect_turn: 0,
            turn_begin_time: HEADER_TIME - 100,
            turn_end_time: HEADER_TIME + 100,
        }
    }

    /// Role notice, plus the leader notice for validators. No request yet.
    pub fn enter_height(&self, index: usize) {
        let node = &self.nodes[index];
        node.dispatch(BlockchainEvent::RoleUpdated(RoleUpdate {
            block_number: HEIGHT - 1,
            role: node.role,
            leader: self.leader().account(),
            super_seq: 0,
        }));
        if node.role == RoleType::Validator {
            node.dispatch(BlockchainEvent::LeaderChanged(self.leader_notice()));
        }
    }

    /// The leader gets its own executed request; everyone else the gossip.
    pub fn deliver_request(&self, index: usize) {
        let event = if index == Self::LEADER {
            BlockchainEvent::LocalRequestCreated(Box::new(LocalConsensusRequest {
                request: self.request(),
                original_txs: self.txs.clone(),
                final_txs: self.txs.clone(),
                receipts: vec![],
                state: StateHandle::default(),
            }))
        } else {
            BlockchainEvent::ConsensusRequestReceived(self.request())
        };
        self.nodes[index].dispatch(event);
    }

    /// Bring a node into the height. Broadcast nodes wait for posed
    /// requests instead of the leader's gossip.
    pub fn join(&self, index: usize) {
        self.enter_height(index);
        if self.nodes[index].role == RoleType::Validator {
            self.deliver_request(index);
        }
    }

    pub fn join_all(&self) {
        for index in 0..self.nodes.len() {
            self.join(index);
        }
    }

    /// Indexes of validators that accept every header.
    pub fn honest(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.role == RoleType::Validator && !node.reject_headers)
            .map(|(i, _)| i)
            .collect()
    }

    /// A fresh node with `index`'s key and recovery store, as after a
    /// process restart. It is not wired into the network.
    pub fn restart(&self, index: usize) -> Node {
        let node = &self.nodes[index];
        Node::build(
            node.role,
            node.signer.clone(),
            node.reject_headers,
            Arc::clone(&self.chain),
            Arc::clone(&self.pool),
            node.store.clone(),
        )
    }

    pub fn commit_head(&self, number: u64) {
        self.chain.head.store(number, Ordering::SeqCst);
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn sample_tx(nonce: u64) -> Transaction {
    Transaction {
        from: [3u8; 20],
        to: Some([4u8; 20]),
        nonce,
        value: U256::from(1u64),
        gas_limit: 21_000,
        data: vec![],
        signature: [1u8; 65],
    }
}
