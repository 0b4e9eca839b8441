//! Process state and leader context

use shared_types::{Address, ConsensusTurn, LeaderChange, ZERO_ADDRESS};
use std::fmt;

/// Per-height verification state.
///
/// Validator path: `Idle → Start → RequestVerify → TransactionVerify →
/// QuorumVerify → End`. Broadcast nodes skip `QuorumVerify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ProcessState {
    #[default]
    Idle,
    Start,
    RequestVerify,
    TransactionVerify,
    QuorumVerify,
    End,
}

impl ProcessState {
    /// The state a forward step into `self` must come from.
    pub fn predecessor(self) -> Option<ProcessState> {
        match self {
            Self::Idle => None,
            Self::Start => Some(Self::Idle),
            Self::RequestVerify => Some(Self::Start),
            Self::TransactionVerify => Some(Self::RequestVerify),
            Self::QuorumVerify => Some(Self::TransactionVerify),
            Self::End => Some(Self::QuorumVerify),
        }
    }

    pub fn is_running(self) -> bool {
        self > Self::Idle
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Start => "start",
            Self::RequestVerify => "request_verify",
            Self::TransactionVerify => "transaction_verify",
            Self::QuorumVerify => "quorum_verify",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

/// Outcome of local verification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerifyResult {
    /// Not verified yet.
    #[default]
    Processing,
    /// Re-execution matched the claimed header.
    Success,
    /// Topology, VRF, election or fetch failure; the request is voted against.
    FailedButRecoverable,
    /// Structurally invalid or state mismatch.
    StateFailed,
    /// Loaded from the recovery log; verified before a restart.
    Restored,
}

impl VerifyResult {
    /// Whether the local node accepts the block.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Success | Self::Restored)
    }

    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Success => "success",
            Self::FailedButRecoverable => "failed_recoverable",
            Self::StateFailed => "state_failed",
            Self::Restored => "restored",
        }
    }
}

/// Leader and turn window currently in force for a height.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeaderContext {
    pub consensus_state: bool,
    pub leader: Address,
    pub next_leader: Address,
    pub consensus_turn: ConsensusTurn,
    pub reelect_turn: u32,
    pub turn_begin_time: u64,
    pub turn_end_time: u64,
}

impl LeaderContext {
    /// Whether `notice` names the leader and round already in force.
    pub fn is_same_round(&self, notice: &LeaderChange) -> bool {
        self.leader == notice.leader && self.consensus_turn == notice.consensus_turn
    }

    pub fn update(&mut self, notice: &LeaderChange) {
        self.leader = notice.leader;
        self.next_leader = notice.next_leader;
        self.consensus_turn = notice.consensus_turn;
        self.reelect_turn = notice.reelect_turn;
        self.turn_begin_time = notice.turn_begin_time;
        self.turn_end_time = notice.turn_end_time;
    }

    /// Forget the leader while keeping `consensus_state`.
    pub fn reset_leader(&mut self) {
        self.leader = ZERO_ADDRESS;
        self.next_leader = ZERO_ADDRESS;
        self.consensus_turn = ConsensusTurn::default();
        self.reelect_turn = 0;
        self.turn_begin_time = 0;
        self.turn_end_time = 0;
    }

    pub fn time_in_window(&self, time: u64) -> bool {
        time >= self.turn_begin_time && time <= self.turn_end_time
    }
}
