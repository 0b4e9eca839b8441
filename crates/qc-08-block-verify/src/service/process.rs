//! Per-height verification state machine

use super::ProcessDeps;
use crate::domain::{
    BlockVerifyError, BlockVerifyResult, LeaderContext, ProcessState, RequestCache, RequestKind,
    RequestRecord, VerifiedVote, VerifyResult, VoteCache,
};
use crate::metrics;
use crate::ports::ExecutionOutcome;
use crate::recovery::RecoveredBlock;
use crate::resend::ResendController;
use parking_lot::Mutex;
use shared_types::{
    short_hex, Address, BlockHeader, ConsensusRequest, ConsensusVote, FullBlockRequest,
    FullBlockResponse, Hash, LeaderChange, LocalConsensusRequest, LocalVerified, MessageTarget,
    MiningRequest, NetworkMessage, PosFinished, RoleType, Signature, Transaction, ZERO_ADDRESS,
    ZERO_HASH, ZERO_SIGNATURE,
};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Verification of the requests for one height.
///
/// Every mutation happens behind one lock. Transaction fetching and the
/// re-execution that follows it run on a spawned task; the outcome is joined
/// back under the lock and dropped if the process has moved on.
pub struct Process {
    number: u64,
    pub(super) deps: Arc<ProcessDeps>,
    this: Weak<Process>,
    inner: Mutex<ProcessInner>,
}

pub(super) struct ProcessInner {
    pub(super) role: RoleType,
    pub(super) state: ProcessState,
    pub(super) leader: LeaderContext,
    /// Request being verified.
    pub(super) current: Option<Hash>,
    pub(super) requests: RequestCache,
    /// Votes for requests other than `current`.
    pub(super) votes: VoteCache,
    /// Tags the in-flight transaction task.
    pub(super) fetch_seq: u64,
    /// Broadcast candidates already tried at this height.
    pub(super) broadcast_done: HashSet<Hash>,
    resenders: Resenders,
}

impl ProcessInner {
    pub(super) fn current_record(&self) -> Option<&RequestRecord> {
        self.current.as_ref().and_then(|hash| self.requests.get(hash))
    }

    fn current_record_mut(&mut self) -> Option<&mut RequestRecord> {
        let hash = self.current?;
        self.requests.get_mut(&hash)
    }
}

/// One controller per message kind; replacing a controller stops the old one.
#[derive(Default)]
struct Resenders {
    vote: Option<ResendController>,
    mining: Option<ResendController>,
    posed: Option<ResendController>,
}

impl Resenders {
    fn stop_all(&mut self) {
        for controller in [&mut self.vote, &mut self.mining, &mut self.posed] {
            if let Some(mut controller) = controller.take() {
                controller.stop();
            }
        }
    }
}

enum TxTaskOutcome {
    Timeout,
    FetchFailed(String),
    Executed {
        txs: Vec<Transaction>,
        result: Result<ExecutionOutcome, String>,
    },
}

impl Process {
    pub fn new(number: u64, deps: Arc<ProcessDeps>) -> Arc<Self> {
        let requests = RequestCache::new(deps.config.other_request_limit);
        let votes = VoteCache::new(
            deps.config.vote_pool_timeout_ms,
            deps.config.vote_pool_sender_limit,
        );
        Arc::new_cyclic(|this| Self {
            number,
            deps,
            this: this.clone(),
            inner: Mutex::new(ProcessInner {
                role: RoleType::Nil,
                state: ProcessState::Idle,
                leader: LeaderContext::default(),
                current: None,
                requests,
                votes,
                fetch_seq: 0,
                broadcast_done: HashSet::new(),
                resenders: Resenders::default(),
            }),
        })
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    pub fn role(&self) -> RoleType {
        self.inner.lock().role
    }

    pub fn leader_context(&self) -> LeaderContext {
        self.inner.lock().leader.clone()
    }

    /// Identity of the request being verified.
    pub fn current_hash(&self) -> Option<Hash> {
        self.inner.lock().current
    }

    /// Snapshot of a cached request.
    pub fn record(&self, hash: &Hash) -> Option<RequestRecord> {
        self.inner.lock().requests.get(hash).cloned()
    }

    /// Votes waiting for a request that is not current.
    pub fn buffered_votes(&self) -> usize {
        self.inner.lock().votes.len()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start_running(&self, role: RoleType) {
        let mut inner = self.inner.lock();
        inner.role = role;
        self.advance_to(&mut inner, ProcessState::Start);
        info!(height = self.number, ?role, "Process started");
        self.start_request_verify(&mut inner);
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.state = ProcessState::Idle;
        inner.current = None;
        inner.fetch_seq += 1;
        inner.resenders.stop_all();
        debug!(height = self.number, "Process closed");
    }

    pub fn set_leader_info(&self, notice: &LeaderChange) {
        let mut inner = self.inner.lock();
        inner.leader.consensus_state = notice.consensus_state;

        if !notice.consensus_state {
            inner.resenders.mining = None;
            inner.leader.reset_leader();
            inner.current = None;
            if inner.state.is_running() {
                inner.state = ProcessState::Start;
            }
            debug!(height = self.number, "Leader consensus in progress, process paused");
            return;
        }

        if inner.leader.is_same_round(notice) {
            return;
        }

        info!(
            height = self.number,
            leader = %short_hex(&notice.leader),
            turn = %notice.consensus_turn,
            "Leader changed"
        );
        inner.leader.update(notice);
        inner.current = None;
        inner.requests.set_current_turn(notice.consensus_turn);
        inner.resenders.stop_all();

        if !inner.state.is_running() {
            return;
        }
        self.reset_to_start(&mut inner);
        let role = inner.role;
        match role {
            RoleType::Validator => self.start_validator_path(&mut inner),
            RoleType::Broadcast => {
                debug!(height = self.number, "Broadcast node ignores leader change")
            }
            _ => {}
        }
    }

    // =========================================================================
    // Inbound requests
    // =========================================================================

    /// Cache a request from the network. Duplicates and stale rounds come
    /// back as errors and leave the cache untouched.
    pub fn add_request(&self, request: ConsensusRequest) -> BlockVerifyResult<Hash> {
        let mut inner = self.inner.lock();
        let incoming_signs =
            (inner.role == RoleType::Broadcast).then(|| request.header.signatures.clone());

        match inner.requests.add(RequestRecord::new(request)) {
            Ok(hash) => {
                debug!(height = self.number, hash = %short_hex(&hash), "Request cached");
                self.start_request_verify(&mut inner);
                Ok(hash)
            }
            Err(BlockVerifyError::RequestExists(hash)) => {
                if let Some(signs) = incoming_signs {
                    self.refresh_broadcast_signatures(&mut inner, hash, signs);
                }
                Err(BlockVerifyError::RequestExists(hash))
            }
            Err(e) => Err(e),
        }
    }

    /// Cache a request this node built as leader, with early votes merged in.
    pub fn add_local_request(&self, local: LocalConsensusRequest) -> BlockVerifyResult<Hash> {
        let mut inner = self.inner.lock();
        let hash = inner.requests.add_local(local)?;
        debug!(height = self.number, hash = %short_hex(&hash), "Local request cached");
        self.merge_buffered_votes(&mut inner, hash);
        self.start_request_verify(&mut inner);
        Ok(hash)
    }

    /// Cache a request reloaded from the recovery log.
    pub fn add_verified_block(&self, block: RecoveredBlock) -> BlockVerifyResult<Hash> {
        let mut inner = self.inner.lock();
        let hash = inner
            .requests
            .add(RequestRecord::restored(block.request, block.txs))?;
        info!(height = self.number, hash = %short_hex(&hash), "Restored verified request");
        self.start_request_verify(&mut inner);
        Ok(hash)
    }

    /// Cache a request a peer sent back with all of its transactions.
    pub fn add_full_block(&self, response: FullBlockResponse) -> BlockVerifyResult<Hash> {
        let manifest = &response.request.tx_manifest;
        let matches = response.txs.len() == manifest.len()
            && response
                .txs
                .iter()
                .zip(manifest)
                .all(|(tx, hash)| tx.hash() == *hash);
        if !matches {
            return Err(BlockVerifyError::InvalidParam(
                "full block transactions do not match manifest",
            ));
        }

        let mut inner = self.inner.lock();
        let hash = inner
            .requests
            .add(RequestRecord::from_full_block(response))?;
        debug!(height = self.number, hash = %short_hex(&hash), "Full block cached");
        self.start_request_verify(&mut inner);
        Ok(hash)
    }

    /// Answer a peer's full-block request if every transaction is held.
    pub fn serve_full_block(&self, request: &FullBlockRequest) -> BlockVerifyResult<()> {
        let response = {
            let inner = self.inner.lock();
            let record = inner
                .requests
                .get(&request.hash)
                .ok_or(BlockVerifyError::RequestNotFound)?;
            record.full_block()
        };
        let Some(response) = response else {
            debug!(height = self.number, hash = %short_hex(&request.hash), "Transactions missing, full block not served");
            return Ok(());
        };
        if let Err(e) = self.deps.sender.send(
            NetworkMessage::FullBlockResponse(response),
            MessageTarget::Node(request.from),
        ) {
            warn!(height = self.number, error = %e, "Full block response send failed");
        }
        Ok(())
    }

    // =========================================================================
    // Votes and recovery
    // =========================================================================

    pub fn handle_vote(
        &self,
        sign_hash: Hash,
        signature: Signature,
        from: Address,
    ) -> BlockVerifyResult<()> {
        if sign_hash == ZERO_HASH {
            return Err(BlockVerifyError::InvalidParam("vote sign hash is zero"));
        }
        if signature == ZERO_SIGNATURE {
            return Err(BlockVerifyError::InvalidParam("vote signature is zero"));
        }
        if from == ZERO_ADDRESS {
            return Err(BlockVerifyError::InvalidParam("vote sender is zero"));
        }
        metrics::record_vote_received();

        let mut inner = self.inner.lock();
        if inner.current != Some(sign_hash) {
            let now = self.deps.time.now_millis();
            trace!(height = self.number, from = %short_hex(&from), "Vote buffered");
            return inner.votes.add_vote(sign_hash, signature, from, now);
        }

        let voted = inner
            .current_record()
            .map_or(true, |record| record.has_vote_from(&from));
        if voted {
            trace!(height = self.number, from = %short_hex(&from), "Sender already voted");
            return Ok(());
        }

        let vote = self.verify_vote(&sign_hash, &signature, Some(from))?;
        if let Some(record) = inner.requests.get_mut(&sign_hash) {
            record.add_vote(vote)?;
        }
        self.evaluate_quorum(&mut inner);
        Ok(())
    }

    /// Replace a request's votes with the signatures carried by `header`.
    ///
    /// An unknown request is fetched from the header's leader instead.
    pub fn process_recovery(&self, header: &BlockHeader) -> BlockVerifyResult<()> {
        let hash = header.hash_no_signs_and_nonce();
        let mut inner = self.inner.lock();
        if !inner.requests.contains(&hash) {
            drop(inner);
            self.request_full_block(hash, header.leader);
            return Ok(());
        }

        let mut added = 0usize;
        if let Some(record) = inner.requests.get_mut(&hash) {
            record.clear_votes();
            for signature in &header.signatures {
                match self.verify_vote(&hash, signature, None) {
                    Ok(vote) => {
                        if record.add_vote(vote).is_ok() {
                            added += 1;
                        }
                    }
                    Err(e) => debug!(height = self.number, error = %e, "Recovered signature rejected"),
                }
            }
        }
        info!(height = self.number, hash = %short_hex(&hash), added, "Recovered quorum signatures");

        if inner.current == Some(hash) && inner.state == ProcessState::QuorumVerify {
            self.evaluate_quorum(&mut inner);
        } else {
            self.start_request_verify(&mut inner);
        }
        Ok(())
    }

    fn request_full_block(&self, hash: Hash, leader: Address) {
        if leader == ZERO_ADDRESS {
            warn!(height = self.number, "Recovery header has no leader");
            return;
        }
        let request = FullBlockRequest {
            number: self.number,
            hash,
            from: self.deps.signer.account(),
        };
        info!(height = self.number, hash = %short_hex(&hash), leader = %short_hex(&leader), "Requesting full block");
        if let Err(e) = self.deps.sender.send(
            NetworkMessage::FullBlockRequest(request),
            MessageTarget::Node(leader),
        ) {
            warn!(height = self.number, error = %e, "Full block request send failed");
        }
    }

    pub(super) fn verify_vote(
        &self,
        sign_hash: &Hash,
        signature: &Signature,
        expected_from: Option<Address>,
    ) -> BlockVerifyResult<VerifiedVote> {
        let (signer, agree) = self
            .deps
            .signer
            .recover_vote(sign_hash, signature)
            .map_err(BlockVerifyError::Signer)?;
        if let Some(from) = expected_from {
            if signer != from {
                return Err(BlockVerifyError::VoteSignerMismatch { signer, from });
            }
        }
        Ok(VerifiedVote {
            signature: *signature,
            account: signer,
            agree,
            stake: 0,
        })
    }

    // =========================================================================
    // Request verification
    // =========================================================================

    pub(super) fn advance_to(&self, inner: &mut ProcessInner, target: ProcessState) -> bool {
        if target.predecessor() != Some(inner.state) {
            trace!(height = self.number, from = %inner.state, to = %target, "State change skipped");
            return false;
        }
        trace!(height = self.number, from = %inner.state, to = %target, "State changed");
        inner.state = target;
        true
    }

    pub(super) fn reset_to_start(&self, inner: &mut ProcessInner) {
        inner.current = None;
        inner.state = ProcessState::Start;
        inner.fetch_seq += 1;
    }

    fn start_request_verify(&self, inner: &mut ProcessInner) {
        let role = inner.role;
        match role {
            RoleType::Validator => self.start_validator_path(inner),
            RoleType::Broadcast => self.start_broadcast_path(inner),
            _ => {}
        }
    }

    fn start_validator_path(&self, inner: &mut ProcessInner) {
        if inner.state != ProcessState::Start || !inner.leader.consensus_state {
            return;
        }
        let Some(hash) = inner
            .requests
            .leader_request(&inner.leader.leader, inner.leader.consensus_turn)
            .map(RequestRecord::hash)
        else {
            trace!(height = self.number, "Waiting for leader request");
            return;
        };

        inner.current = Some(hash);
        self.advance_to(inner, ProcessState::RequestVerify);
        debug!(height = self.number, hash = %short_hex(&hash), "Verifying leader request");
        self.process_request(inner);
    }

    fn process_request(&self, inner: &mut ProcessInner) {
        let Some(record) = inner.current_record() else {
            self.reset_to_start(inner);
            return;
        };

        let verdict = if record.kind == RequestKind::Local {
            Some(VerifyResult::Success)
        } else if record.verify_result != VerifyResult::Processing {
            Some(record.verify_result)
        } else {
            self.check_request(&inner.leader, record).err()
        };

        match verdict {
            Some(result) => self.local_verify_done(inner, result),
            None => self.start_tx_verify(inner),
        }
    }

    /// Header checks that run before any transaction is touched.
    fn check_request(
        &self,
        leader: &LeaderContext,
        record: &RequestRecord,
    ) -> Result<(), VerifyResult> {
        let header = &record.request.header;
        if !leader.time_in_window(header.time) {
            warn!(
                height = self.number,
                time = header.time,
                begin = leader.turn_begin_time,
                end = leader.turn_end_time,
                "Header time outside turn window"
            );
            return Err(VerifyResult::StateFailed);
        }

        let Some(parent) = self.deps.chain.header_by_hash(&header.parent_hash) else {
            warn!(height = self.number, parent = %short_hex(&header.parent_hash), "Parent header missing");
            return Err(VerifyResult::StateFailed);
        };

        if let Err(e) = self.deps.header_verifier.verify_version(header, &parent) {
            warn!(height = self.number, error = %e, "Version check failed");
            return Err(VerifyResult::StateFailed);
        }
        if let Err(e) = self.deps.header_verifier.verify_header(header, &parent) {
            warn!(height = self.number, error = %e, "Header check failed");
            return Err(VerifyResult::FailedButRecoverable);
        }
        Ok(())
    }

    pub(super) fn start_tx_verify(&self, inner: &mut ProcessInner) {
        if !self.advance_to(inner, ProcessState::TransactionVerify) {
            return;
        }
        let Some(record) = inner.current_record() else {
            return;
        };

        if record.has_all_txs() {
            let result = self
                .deps
                .executor
                .execute(&record.request.header, &record.original_txs);
            self.apply_execution(inner, result);
            return;
        }

        let number = record.request.number();
        let manifest = record.request.tx_manifest.clone();
        let from = record.request.from;
        let header = record.request.header.clone();

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(height = self.number, "No runtime available to fetch transactions");
                self.local_verify_done(inner, VerifyResult::FailedButRecoverable);
                return;
            }
        };

        inner.fetch_seq += 1;
        let seq = inner.fetch_seq;
        let this = self.this.clone();
        let deps = Arc::clone(&self.deps);
        debug!(height = self.number, seq, txs = manifest.len(), "Fetching transactions");
        handle.spawn(async move {
            let outcome = fetch_and_execute(&deps, number, manifest, from, header).await;
            if let Some(process) = this.upgrade() {
                process.join_tx_task(seq, outcome);
            }
        });
    }

    fn join_tx_task(&self, seq: u64, outcome: TxTaskOutcome) {
        let mut inner = self.inner.lock();
        if seq != inner.fetch_seq || inner.state != ProcessState::TransactionVerify {
            debug!(height = self.number, seq, current = inner.fetch_seq, state = %inner.state, "Discarding stale transaction result");
            return;
        }

        match outcome {
            TxTaskOutcome::Timeout => {
                warn!(height = self.number, "Transaction fetch timed out");
                self.local_verify_done(&mut inner, VerifyResult::FailedButRecoverable);
            }
            TxTaskOutcome::FetchFailed(e) => {
                warn!(height = self.number, error = %e, "Transaction fetch failed");
                self.local_verify_done(&mut inner, VerifyResult::FailedButRecoverable);
            }
            TxTaskOutcome::Executed { txs, result } => {
                if let Some(record) = inner.current_record_mut() {
                    record.original_txs = txs;
                }
                self.apply_execution(&mut inner, result);
            }
        }
    }

    fn apply_execution(
        &self,
        inner: &mut ProcessInner,
        result: Result<ExecutionOutcome, String>,
    ) {
        let Some(record) = inner.current_record_mut() else {
            return;
        };

        let verdict = match result {
            Err(e) => {
                warn!(height = self.number, error = %e, "Re-execution failed");
                VerifyResult::StateFailed
            }
            Ok(outcome) => {
                let rebuilt = outcome.header.hash_no_signs_and_nonce();
                if rebuilt != record.hash() {
                    warn!(
                        height = self.number,
                        claimed = %short_hex(&record.hash()),
                        rebuilt = %short_hex(&rebuilt),
                        "Re-executed header does not match request"
                    );
                    VerifyResult::StateFailed
                } else {
                    record.final_txs = outcome.final_txs;
                    record.receipts = outcome.receipts;
                    record.state = Some(outcome.state);
                    VerifyResult::Success
                }
            }
        };
        self.local_verify_done(inner, verdict);
    }

    pub(super) fn local_verify_done(&self, inner: &mut ProcessInner, result: VerifyResult) {
        metrics::record_request_verified(result.as_str());
        if inner.role == RoleType::Broadcast {
            self.finish_broadcast(inner, result);
        } else {
            self.enter_quorum(inner, result);
        }
    }

    // =========================================================================
    // Quorum
    // =========================================================================

    fn enter_quorum(&self, inner: &mut ProcessInner, result: VerifyResult) {
        if inner.state >= ProcessState::QuorumVerify {
            return;
        }
        let Some(hash) = inner.current else {
            return;
        };

        match result {
            VerifyResult::Success => {
                self.cast_vote(inner, hash, true);
                if let Some(record) = inner.requests.get(&hash) {
                    self.deps.notifier.local_verified(local_verified(record));
                    if let Err(e) =
                        self.deps
                            .recovery
                            .save(hash, &record.request, &record.original_txs)
                    {
                        warn!(height = self.number, error = %e, "Recovery log save failed");
                    }
                }
            }
            VerifyResult::Restored => self.cast_vote(inner, hash, true),
            VerifyResult::FailedButRecoverable => self.cast_vote(inner, hash, false),
            VerifyResult::StateFailed | VerifyResult::Processing => {}
        }

        if let Some(record) = inner.requests.get_mut(&hash) {
            record.verify_result = result;
        }
        self.merge_buffered_votes(inner, hash);
        inner.state = ProcessState::QuorumVerify;
        info!(height = self.number, hash = %short_hex(&hash), result = result.as_str(), "Local verification done");
        self.evaluate_quorum(inner);
    }

    fn cast_vote(&self, inner: &mut ProcessInner, hash: Hash, agree: bool) {
        let signature = match self.deps.signer.sign_vote(&hash, agree) {
            Ok(signature) => signature,
            Err(e) => {
                error!(height = self.number, error = %e, "Vote signing failed");
                return;
            }
        };
        let account = self.deps.signer.account();
        let vote = ConsensusVote {
            sign_hash: hash,
            sign: signature,
            from: account,
            number: self.number,
        };

        let sender = Arc::clone(&self.deps.sender);
        let number = self.number;
        inner.resenders.vote = Some(ResendController::start(
            vote,
            self.deps.config.vote_resend_interval(),
            self.deps.config.vote_resend_times,
            move |vote: &ConsensusVote, times| {
                if let Err(e) = sender.send(NetworkMessage::Vote(vote.clone()), MessageTarget::Validators) {
                    warn!(height = number, times, error = %e, "Vote send failed");
                }
            },
        ));

        if let Some(record) = inner.requests.get_mut(&hash) {
            if let Err(e) = record.add_vote(VerifiedVote {
                signature,
                account,
                agree,
                stake: 0,
            }) {
                trace!(height = self.number, error = %e, "Own vote not added");
            }
        }
        debug!(height = self.number, agree, "Vote cast");
    }

    /// Move every buffered vote for `hash` onto its record. The buffer
    /// entries are dropped whether or not they verify.
    fn merge_buffered_votes(&self, inner: &mut ProcessInner, hash: Hash) {
        if !inner.requests.contains(&hash) {
            return;
        }
        let buffered_votes = inner.votes.votes_for(&hash);
        inner.votes.remove_votes(&hash);
        for buffered in buffered_votes {
            let vote = match self.verify_vote(&hash, &buffered.signature, Some(buffered.from)) {
                Ok(vote) => vote,
                Err(e) => {
                    debug!(height = self.number, error = %e, "Buffered vote rejected");
                    continue;
                }
            };
            if let Some(record) = inner.requests.get_mut(&hash) {
                if let Err(e) = record.add_vote(vote) {
                    trace!(height = self.number, error = %e, "Buffered vote not added");
                }
            }
        }
    }

    fn evaluate_quorum(&self, inner: &mut ProcessInner) {
        if inner.state != ProcessState::QuorumVerify {
            return;
        }
        let Some(hash) = inner.current else {
            return;
        };
        let Some(record) = inner.requests.get(&hash) else {
            return;
        };
        if record.pos_finished {
            return;
        }

        let table = match self.deps.chain.stake_table(&record.parent_hash()) {
            Ok(table) => table,
            Err(e) => {
                warn!(height = self.number, error = %e, "Stake table unavailable");
                return;
            }
        };
        let signatures = match self.deps.quorum.verify(record.votes(), &table) {
            Ok(signatures) => signatures,
            Err(e) => {
                trace!(height = self.number, votes = record.votes().len(), reason = %e, "Quorum not reached");
                return;
            }
        };

        if let Some(record) = inner.requests.get_mut(&hash) {
            record.pos_finished = true;
            record.request.header.signatures = signatures;
        }
        metrics::record_quorum_passed();
        info!(height = self.number, hash = %short_hex(&hash), "Quorum reached");
        self.finish(inner, hash);
    }

    fn finish(&self, inner: &mut ProcessInner, hash: Hash) {
        let Some(record) = inner.requests.get(&hash) else {
            return;
        };

        match record.verify_result {
            VerifyResult::Processing => {
                error!(height = self.number, hash = %short_hex(&hash), "Quorum passed before local verification");
                return;
            }
            VerifyResult::StateFailed => {
                metrics::record_hard_failure();
                error!(height = self.number, hash = %short_hex(&hash), "Local state failed but quorum passed");
                return;
            }
            VerifyResult::Success | VerifyResult::Restored => {
                self.deps.notifier.pos_finished(PosFinished {
                    number: self.number,
                    header: record.request.header.clone(),
                    consensus_turn: record.request.consensus_turn,
                    tx_manifest: record.request.tx_manifest.clone(),
                });
            }
            VerifyResult::FailedButRecoverable => {
                warn!(height = self.number, hash = %short_hex(&hash), "Quorum passed against local verdict");
            }
        }

        let mining = MiningRequest {
            header: record.request.header.clone(),
        };
        let mut posed = record.request.clone();
        posed.from = self.deps.signer.account();

        let number = self.number;
        let sender = Arc::clone(&self.deps.sender);
        inner.resenders.mining = Some(ResendController::start(
            mining,
            self.deps.config.mining_resend_interval(),
            0,
            move |request: &MiningRequest, times| {
                if let Err(e) = sender.send(NetworkMessage::MiningRequest(request.clone()), MessageTarget::Miners) {
                    warn!(height = number, times, error = %e, "Mining request send failed");
                }
            },
        ));

        let sender = Arc::clone(&self.deps.sender);
        inner.resenders.posed = Some(ResendController::start(
            posed,
            self.deps.config.posed_resend_interval(),
            0,
            move |request: &ConsensusRequest, times| {
                if let Err(e) = sender.send(NetworkMessage::PosedRequest(request.clone()), MessageTarget::Broadcast) {
                    warn!(height = number, times, error = %e, "Posed request send failed");
                }
            },
        ));

        inner.state = ProcessState::End;
        info!(height = self.number, hash = %short_hex(&hash), "Block verification finished");
    }
}

/// Local verification notice for a record.
pub(super) fn local_verified(record: &RequestRecord) -> LocalVerified {
    LocalVerified {
        header: record.request.header.clone(),
        block_hash: record.hash(),
        original_txs: record.original_txs.clone(),
        final_txs: record.final_txs.clone(),
        receipts: record.receipts.clone(),
        state: record.state.clone().unwrap_or_default(),
    }
}

async fn fetch_and_execute(
    deps: &ProcessDeps,
    number: u64,
    manifest: Vec<Hash>,
    from: Address,
    header: BlockHeader,
) -> TxTaskOutcome {
    let started = Instant::now();
    let fetched = tokio::time::timeout(
        deps.config.tx_fetch_timeout(),
        deps.tx_fetcher.fetch(number, &manifest, from),
    )
    .await;
    metrics::record_tx_fetch_latency(started.elapsed().as_secs_f64());

    let txs = match fetched {
        Err(_) => return TxTaskOutcome::Timeout,
        Ok(Err(e)) => return TxTaskOutcome::FetchFailed(e),
        Ok(Ok(txs)) => txs,
    };
    if txs.len() != manifest.len() || txs.iter().zip(&manifest).any(|(tx, h)| tx.hash() != *h) {
        return TxTaskOutcome::FetchFailed(format!(
            "fetched {} transactions do not match manifest of {}",
            txs.len(),
            manifest.len()
        ));
    }

    let executor = Arc::clone(&deps.executor);
    let exec_txs = txs.clone();
    let result = tokio::task::spawn_blocking(move || executor.execute(&header, &exec_txs))
        .await
        .unwrap_or_else(|e| Err(format!("execution task failed: {e}")));
    TxTaskOutcome::Executed { txs, result }
}
