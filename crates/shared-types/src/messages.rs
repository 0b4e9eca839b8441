//! # Block Verification Messages
//!
//! Payloads exchanged between the block-verification subsystem and the rest of
//! the node: role and leader notices, consensus requests, votes, recovery
//! notices, and the notifications emitted once a block is verified.

use crate::entities::{
    Address, BlockHeader, ConsensusTurn, Hash, Receipt, RoleType, Signature, StateHandle,
    Transaction,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

// =============================================================================
// INBOUND
// =============================================================================

/// Role assignment for the next height, emitted after a block is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdate {
    /// Height of the block just committed.
    pub block_number: u64,
    /// Role of this node for `block_number + 1`.
    pub role: RoleType,
    /// Leader for `block_number + 1`, if already known.
    pub leader: Address,
    /// Super-block sequence the committed block belongs to. An increase
    /// means the chain was reset by a super block.
    pub super_seq: u64,
}

/// Leader election outcome for a height and round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeaderChange {
    pub number: u64,
    /// False while leader consensus is still running.
    pub consensus_state: bool,
    pub leader: Address,
    pub next_leader: Address,
    pub consensus_turn: ConsensusTurn,
    pub reelect_turn: u32,
    /// Turn window (unix seconds) the leader's header time must fall in.
    pub turn_begin_time: u64,
    pub turn_end_time: u64,
}

/// A block proposal gossiped by its leader (or forwarded by a validator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusRequest {
    pub header: BlockHeader,
    pub consensus_turn: ConsensusTurn,
    /// Hashes of the block's transactions, in block order.
    pub tx_manifest: Vec<Hash>,
    /// Node that sent this request.
    pub from: Address,
}

impl ConsensusRequest {
    /// Identity of the proposal.
    pub fn hash(&self) -> Hash {
        self.header.hash_no_signs_and_nonce()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn txs_count(&self) -> usize {
        self.tx_manifest.len()
    }
}

/// A request built by this node as leader; already executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConsensusRequest {
    pub request: ConsensusRequest,
    pub original_txs: Vec<Transaction>,
    pub final_txs: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
    pub state: StateHandle,
}

/// A validator's vote on a request identity.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusVote {
    pub sign_hash: Hash,
    #[serde_as(as = "Bytes")]
    pub sign: Signature,
    pub from: Address,
    pub number: u64,
}

/// Kind of recovery notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryKind {
    /// Quorum signatures for a known request.
    Pos,
    /// Whole header recovery (handled by the generation pipeline).
    FullHeader,
}

/// Recovery notice carrying a header whose signatures reached quorum elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryState {
    pub kind: RecoveryKind,
    pub header: BlockHeader,
    pub from: Address,
}

/// Request for a full block (request + transactions) by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullBlockRequest {
    pub number: u64,
    pub hash: Hash,
    pub from: Address,
}

/// Answer to a [`FullBlockRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullBlockResponse {
    pub request: ConsensusRequest,
    pub txs: Vec<Transaction>,
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Local verification succeeded; carries the execution artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVerified {
    pub header: BlockHeader,
    pub block_hash: Hash,
    pub original_txs: Vec<Transaction>,
    pub final_txs: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
    pub state: StateHandle,
}

/// Quorum reached: the header now carries the right-signature set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosFinished {
    pub number: u64,
    pub header: BlockHeader,
    pub consensus_turn: ConsensusTurn,
    pub tx_manifest: Vec<Hash>,
}

/// Header handed to miners for sealing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningRequest {
    pub header: BlockHeader,
}

/// Messages this subsystem sends over the network layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NetworkMessage {
    Vote(ConsensusVote),
    MiningRequest(MiningRequest),
    /// Posed request forwarded with its right-signature set.
    PosedRequest(ConsensusRequest),
    FullBlockRequest(FullBlockRequest),
    FullBlockResponse(FullBlockResponse),
}

impl NetworkMessage {
    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Vote(_) => "vote",
            Self::MiningRequest(_) => "mining_request",
            Self::PosedRequest(_) => "posed_request",
            Self::FullBlockRequest(_) => "full_block_request",
            Self::FullBlockResponse(_) => "full_block_response",
        }
    }
}

/// Addressing for a [`NetworkMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageTarget {
    /// Every current validator.
    Validators,
    /// Every miner, including inner miners.
    Miners,
    /// Every broadcast node.
    Broadcast,
    /// A single node.
    Node(Address),
}

impl MessageTarget {
    /// Whether a node with `role` is addressed by this target.
    pub fn includes_role(&self, role: RoleType) -> bool {
        match self {
            Self::Validators => role == RoleType::Validator,
            Self::Miners => matches!(role, RoleType::Miner | RoleType::InnerMiner),
            Self::Broadcast => role == RoleType::Broadcast,
            Self::Node(_) => false,
        }
    }
}
