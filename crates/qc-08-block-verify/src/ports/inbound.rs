//! Driving ports (Inbound API)

use crate::domain::BlockVerifyResult;
use shared_types::{
    ConsensusRequest, ConsensusVote, FullBlockRequest, FullBlockResponse, LeaderChange,
    LocalConsensusRequest, RecoveryState, RoleUpdate,
};

/// Primary block verification API
///
/// One entry point per inbound event. Each call routes the event to the
/// process for its height; events outside the live height window are
/// rejected with `HeightTooLow` / `HeightTooHigh`.
pub trait BlockVerifyApi: Send + Sync {
    /// A block was committed; start the next height with `update.role`
    fn handle_role_update(&self, update: RoleUpdate) -> BlockVerifyResult<()>;

    /// Leader election produced (or withdrew) a leader
    fn handle_leader_change(&self, notice: LeaderChange) -> BlockVerifyResult<()>;

    /// A consensus request arrived from the network
    fn handle_consensus_request(&self, request: ConsensusRequest) -> BlockVerifyResult<()>;

    /// This node built and executed a request as leader
    fn handle_local_request(&self, local: LocalConsensusRequest) -> BlockVerifyResult<()>;

    /// A vote arrived from the network
    fn handle_vote(&self, vote: ConsensusVote) -> BlockVerifyResult<()>;

    /// Quorum signatures gathered elsewhere for a header
    fn handle_recovery(&self, recovery: RecoveryState) -> BlockVerifyResult<()>;

    /// A peer asks for a request and its transactions
    fn handle_full_block_request(&self, request: FullBlockRequest) -> BlockVerifyResult<()>;

    /// A peer answered our full-block request
    fn handle_full_block_response(&self, response: FullBlockResponse) -> BlockVerifyResult<()>;
}
