//! Error types for the block verification subsystem

use shared_types::{Address, ConsensusTurn, Hash};

/// Block verification error types
#[derive(Debug, thiserror::Error)]
pub enum BlockVerifyError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error("Stale round: request {request}, current {current}")]
    StaleRound {
        request: ConsensusTurn,
        current: ConsensusTurn,
    },

    #[error("Leader request already exists for {leader:?} at round {existing}")]
    LeaderRequestExists {
        leader: Address,
        existing: ConsensusTurn,
    },

    #[error("Request already exists: {0:?}")]
    RequestExists(Hash),

    #[error("Request not found in cache")]
    RequestNotFound,

    #[error("Vote already exists from {0:?}")]
    DuplicateVote(Address),

    #[error("Height {number} is below current height {current}")]
    HeightTooLow { number: u64, current: u64 },

    #[error("Height {number} is too far above current height {current}")]
    HeightTooHigh { number: u64, current: u64 },

    #[error("Vote signer {signer:?} does not match sender {from:?}")]
    VoteSignerMismatch { signer: Address, from: Address },

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Transaction fetch error: {0}")]
    Fetch(String),
}

/// Result type for block verification operations
pub type BlockVerifyResult<T> = Result<T, BlockVerifyError>;

/// Quorum evaluation failures
///
/// A failed evaluation is not fatal: the process keeps collecting votes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuorumError {
    #[error("Stake count {count} is less than minimum {min}")]
    StakeCountTooLow { count: usize, min: usize },

    #[error("Sign count not enough: {got} < {target}")]
    SignCountNotEnough { got: usize, target: usize },

    #[error("Sign stake not enough: {got} < {target}")]
    SignStakeNotEnough { got: u64, target: u64 },

    #[error("Disagree count too high: {got} > {max}")]
    DisagreeCountExceeded { got: usize, max: usize },

    #[error("Disagree stake too high: {got} > {max}")]
    DisagreeStakeExceeded { got: u64, max: u64 },

    #[error("Broadcast block must carry exactly one signature, got {0}")]
    BroadcastSignCount(usize),

    #[error("Broadcast signer {signer:?} is not block leader {leader:?}")]
    BroadcastSignerNotLeader { signer: Address, leader: Address },

    #[error("Broadcast block signature is a disagree vote")]
    BroadcastSignFalse,

    #[error("Broadcast signer {0:?} is not a broadcast node")]
    BroadcastSignerNotBroadcast(Address),
}

/// Recovery log failures
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Store error: {0}")]
    Store(#[from] KVStoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Blob size mismatch: total {total} != 16 + {req_len} + {txs_len}")]
    BlobSize {
        total: usize,
        req_len: u64,
        txs_len: u64,
    },

    #[error("Transaction count {txs} does not match manifest count {manifest}")]
    TxCountMismatch { txs: usize, manifest: usize },

    #[error("Recovery index corrupt: {0}")]
    IndexCorrupt(&'static str),

    #[error("Recovery index capacity is zero")]
    ZeroCapacity,
}

/// Key-value store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KVStoreError {
    #[error("IO error: {message}")]
    IOError { message: String },

    #[error("Key not found")]
    NotFound,
}
