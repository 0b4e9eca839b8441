//! Driven ports (Outbound dependencies)

use crate::domain::{KVStoreError, StakeTable};
use async_trait::async_trait;
use shared_types::{
    Address, BlockHeader, Hash, LocalVerified, MessageTarget, NetworkMessage, PosFinished,
    Receipt, Signature, StateHandle, Transaction,
};

/// Read access to the committed chain
pub trait ChainReader: Send + Sync {
    /// Height of the committed chain head
    fn current_number(&self) -> u64;

    /// Committed header by hash
    fn header_by_hash(&self, hash: &Hash) -> Option<BlockHeader>;

    /// Validator stakes for the block built on top of `parent_hash`
    fn stake_table(&self, parent_hash: &Hash) -> Result<StakeTable, String>;

    /// Whether `number` is sealed by a broadcast node instead of a quorum
    fn is_broadcast_number(&self, number: u64) -> bool;

    /// Accounts holding the broadcast role after `parent_hash`
    fn broadcast_accounts(&self, parent_hash: &Hash) -> Result<Vec<Address>, String>;
}

/// Protocol checks on a proposed header
pub trait HeaderVerifier: Send + Sync {
    /// Protocol version and its super-node signatures
    fn verify_version(&self, header: &BlockHeader, parent: &BlockHeader) -> Result<(), String>;

    /// Topology, election and VRF
    fn verify_header(&self, header: &BlockHeader, parent: &BlockHeader) -> Result<(), String>;
}

/// Result of re-executing a block's transactions
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Header rebuilt from the execution results
    pub header: BlockHeader,
    pub final_txs: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
    pub state: StateHandle,
}

/// Transaction execution engine
pub trait StateExecutor: Send + Sync {
    /// Replay `txs` on top of the parent state of `header`
    fn execute(&self, header: &BlockHeader, txs: &[Transaction])
        -> Result<ExecutionOutcome, String>;
}

/// Retrieval of a request's transactions from the pool or from peers
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    /// Transactions for `manifest`, in manifest order
    async fn fetch(
        &self,
        number: u64,
        manifest: &[Hash],
        from: Address,
    ) -> Result<Vec<Transaction>, String>;
}

/// Vote signing and recovery
pub trait VoteSigner: Send + Sync {
    /// Account this node votes as
    fn account(&self) -> Address;

    /// Sign `sign_hash` with the agree flag
    fn sign_vote(&self, sign_hash: &Hash, agree: bool) -> Result<Signature, String>;

    /// Signer and agree flag of a vote signature
    fn recover_vote(&self, sign_hash: &Hash, signature: &Signature)
        -> Result<(Address, bool), String>;
}

/// Outgoing network messages
pub trait MessageSender: Send + Sync {
    fn send(&self, message: NetworkMessage, target: MessageTarget) -> Result<(), String>;
}

/// Verification results for the block generation pipeline
pub trait VerifyNotifier: Send + Sync {
    /// Local re-execution succeeded
    fn local_verified(&self, verified: LocalVerified);

    /// Quorum reached; the header carries the right signatures
    fn pos_finished(&self, finished: PosFinished);

    /// A broadcast node accepted a posed block
    fn broadcast_finished(&self, verified: LocalVerified);
}

/// Key-value store for the recovery log
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Apply every operation or none.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Time source for vote buffering
pub trait TimeSource: Send + Sync {
    /// Current unix time in milliseconds
    fn now_millis(&self) -> u64;
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
