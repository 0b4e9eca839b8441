//! Bus event loop feeding the process manager

use super::{ProcessDeps, ProcessManager};
use crate::domain::{BlockVerifyError, BlockVerifyResult};
use crate::metrics;
use crate::ports::BlockVerifyApi;
use shared_bus::{BlockchainEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use shared_types::{
    ConsensusRequest, ConsensusVote, FullBlockRequest, FullBlockResponse, LeaderChange,
    LocalConsensusRequest, RecoveryKind, RecoveryState, RoleType, RoleUpdate, ZERO_ADDRESS,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Entry point of block verification.
///
/// Each inbound event is handled on its own task, so events from different
/// subscriptions may be applied in any order.
pub struct Dispatcher {
    deps: Arc<ProcessDeps>,
    manager: Arc<ProcessManager>,
}

impl Dispatcher {
    pub fn new(deps: Arc<ProcessDeps>) -> Self {
        let manager = Arc::new(ProcessManager::new(Arc::clone(&deps)));
        Self { deps, manager }
    }

    pub fn manager(&self) -> &Arc<ProcessManager> {
        &self.manager
    }

    /// Load the recovery log, keeping requests above the committed head.
    ///
    /// Returns how many were handed to the manager.
    pub fn reload_verified_blocks(&self) -> usize {
        let blocks = match self.deps.recovery.load() {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(error = %e, "Recovery log unreadable");
                return 0;
            }
        };

        let head = self.deps.chain.current_number();
        let mut loaded = 0usize;
        for block in blocks {
            if block.request.number() <= head {
                trace!(height = block.request.number(), head, "Skipping committed block");
                continue;
            }
            self.manager.add_verified_block(block);
            loaded += 1;
        }
        metrics::record_recovery_loaded(loaded);
        info!(loaded, head, "Verified blocks reloaded");
        loaded
    }

    /// Consume bus events until `shutdown` flips or the bus closes.
    pub async fn run(self: Arc<Self>, bus: Arc<InMemoryEventBus>, mut shutdown: watch::Receiver<bool>) {
        self.reload_verified_blocks();

        let subscribe = |topic| bus.subscribe(EventFilter::topic(topic));
        let mut roles: Subscription = subscribe(EventTopic::RoleUpdate);
        let mut leaders = subscribe(EventTopic::LeaderChange);
        let mut requests = subscribe(EventTopic::ConsensusRequest);
        let mut locals = subscribe(EventTopic::LocalRequest);
        let mut votes = subscribe(EventTopic::Vote);
        let mut recoveries = subscribe(EventTopic::Recovery);
        let mut full_blocks = subscribe(EventTopic::FullBlock);

        let mut lagged_seen = bus.events_lagged();
        info!("Block verification started");
        loop {
            let event = tokio::select! {
                Some(event) = roles.recv() => event,
                Some(event) = leaders.recv() => event,
                Some(event) = requests.recv() => event,
                Some(event) = locals.recv() => event,
                Some(event) = votes.recv() => event,
                Some(event) = recoveries.recv() => event,
                Some(event) = full_blocks.recv() => event,
                _ = shutdown.changed() => {
                    info!("Shutdown signal received");
                    break;
                }
                else => break,
            };

            let lagged = bus.events_lagged();
            if lagged > lagged_seen {
                metrics::record_bus_events_lagged(lagged - lagged_seen);
                lagged_seen = lagged;
            }

            let this = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = this.dispatch(event) {
                    log_rejection(&e);
                }
            });
        }

        self.manager.clear();
        info!("Block verification stopped");
    }

    /// Route one bus event.
    pub fn dispatch(&self, event: BlockchainEvent) -> BlockVerifyResult<()> {
        match event {
            BlockchainEvent::RoleUpdated(update) => self.handle_role_update(update),
            BlockchainEvent::LeaderChanged(notice) => self.handle_leader_change(notice),
            BlockchainEvent::ConsensusRequestReceived(request) => {
                self.handle_consensus_request(request)
            }
            BlockchainEvent::LocalRequestCreated(local) => self.handle_local_request(*local),
            BlockchainEvent::VoteReceived(vote) => self.handle_vote(vote),
            BlockchainEvent::RecoveryRequested(recovery) => self.handle_recovery(recovery),
            BlockchainEvent::FullBlockRequested(request) => self.handle_full_block_request(request),
            BlockchainEvent::FullBlockReceived(response) => {
                self.handle_full_block_response(*response)
            }
            other => {
                trace!(topic = ?other.topic(), "Ignoring outbound event");
                Ok(())
            }
        }
    }
}

impl BlockVerifyApi for Dispatcher {
    fn handle_role_update(&self, update: RoleUpdate) -> BlockVerifyResult<()> {
        let next = update.block_number.saturating_add(1);
        self.manager.set_current_number(next, update.super_seq);
        info!(height = next, super_seq = update.super_seq, role = ?update.role, "Role updated");

        if matches!(update.role, RoleType::Validator | RoleType::Broadcast) {
            self.manager.process(next)?.start_running(update.role);
        }
        Ok(())
    }

    fn handle_leader_change(&self, notice: LeaderChange) -> BlockVerifyResult<()> {
        self.manager.process(notice.number)?.set_leader_info(&notice);
        Ok(())
    }

    fn handle_consensus_request(&self, request: ConsensusRequest) -> BlockVerifyResult<()> {
        if request.header.leader == ZERO_ADDRESS {
            return Err(BlockVerifyError::InvalidParam("request leader is zero"));
        }
        self.manager
            .process(request.number())?
            .add_request(request)
            .map(|_| ())
    }

    fn handle_local_request(&self, local: LocalConsensusRequest) -> BlockVerifyResult<()> {
        if local.request.header.leader == ZERO_ADDRESS {
            return Err(BlockVerifyError::InvalidParam("request leader is zero"));
        }
        self.manager
            .process(local.request.number())?
            .add_local_request(local)
            .map(|_| ())
    }

    fn handle_vote(&self, vote: ConsensusVote) -> BlockVerifyResult<()> {
        self.manager
            .process(vote.number)?
            .handle_vote(vote.sign_hash, vote.sign, vote.from)
    }

    fn handle_recovery(&self, recovery: RecoveryState) -> BlockVerifyResult<()> {
        if recovery.kind != RecoveryKind::Pos {
            trace!(kind = ?recovery.kind, "Recovery kind handled elsewhere");
            return Ok(());
        }
        let process = self.manager.current_process()?;
        if process.number() != recovery.header.number {
            debug!(
                height = recovery.header.number,
                current = process.number(),
                "Recovery for a height that is not current"
            );
            return Ok(());
        }
        process.process_recovery(&recovery.header)
    }

    fn handle_full_block_request(&self, request: FullBlockRequest) -> BlockVerifyResult<()> {
        self.manager
            .process(request.number)?
            .serve_full_block(&request)
    }

    fn handle_full_block_response(&self, response: FullBlockResponse) -> BlockVerifyResult<()> {
        self.manager
            .process(response.request.number())?
            .add_full_block(response)
            .map(|_| ())
    }
}

fn log_rejection(error: &BlockVerifyError) {
    match error {
        BlockVerifyError::RequestExists(_)
        | BlockVerifyError::LeaderRequestExists { .. }
        | BlockVerifyError::StaleRound { .. }
        | BlockVerifyError::DuplicateVote(_)
        | BlockVerifyError::HeightTooLow { .. } => trace!(error = %error, "Event dropped"),
        _ => debug!(error = %error, "Event rejected"),
    }
}
