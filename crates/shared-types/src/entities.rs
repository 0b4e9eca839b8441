//! # Core Domain Entities
//!
//! Chain entities shared by the block-verification subsystem and its
//! collaborators (generation pipeline, network layer, execution engine).
//!
//! ## Clusters
//!
//! - **Primitives**: `Hash`, `Address`, `Signature`
//! - **Chain**: `BlockHeader`, `Transaction`, `Receipt`, `StateHandle`
//! - **Consensus**: `RoleType`, `ConsensusTurn`, topology and election nodes

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::{Digest, Keccak256};
use std::cmp::Ordering;
use std::fmt;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// A 65-byte recoverable ECDSA signature (r, s, v).
pub type Signature = [u8; 65];

/// The all-zero hash, used as "unset".
pub const ZERO_HASH: Hash = [0u8; 32];

/// The all-zero address, used as "unset".
pub const ZERO_ADDRESS: Address = [0u8; 20];

/// The all-zero signature, used as "unset".
pub const ZERO_SIGNATURE: Signature = [0u8; 65];

/// Keccak-256 over a byte slice.
pub fn keccak256(data: &[u8]) -> Hash {
    let result = Keccak256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Short hex prefix of a hash for log fields.
pub fn short_hex(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

// =============================================================================
// CONSENSUS
// =============================================================================

/// Role a node plays at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoleType {
    /// No role (not elected).
    #[default]
    Nil,
    /// Proof-of-work miner.
    Miner,
    /// Foundation-run miner.
    InnerMiner,
    /// Voting validator.
    Validator,
    /// Elected but not active validator.
    BackupValidator,
    /// Broadcast node: seals broadcast heights with a single signature.
    Broadcast,
}

/// Consensus turn (round) at a height.
///
/// Ordered by total turns, then by `pre_consensus_turn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ConsensusTurn {
    /// Turns consumed by leader consensus before re-election.
    pub pre_consensus_turn: u32,
    /// Turns consumed by re-election.
    pub used_reelect_turn: u32,
}

impl ConsensusTurn {
    pub fn new(pre_consensus_turn: u32, used_reelect_turn: u32) -> Self {
        Self {
            pre_consensus_turn,
            used_reelect_turn,
        }
    }

    pub fn total_turns(&self) -> u32 {
        self.pre_consensus_turn.saturating_add(self.used_reelect_turn)
    }
}

impl Ord for ConsensusTurn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_turns()
            .cmp(&other.total_turns())
            .then(self.pre_consensus_turn.cmp(&other.pre_consensus_turn))
    }
}

impl PartialOrd for ConsensusTurn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConsensusTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{},{}]",
            self.total_turns(),
            self.pre_consensus_turn,
            self.used_reelect_turn
        )
    }
}

/// A node in the active network topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub account: Address,
    pub role: RoleType,
    pub position: u16,
}

/// A node in the election result, carrying its stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectNode {
    pub account: Address,
    pub role: RoleType,
    pub stock: u16,
}

// =============================================================================
// CHAIN
// =============================================================================

/// Block header as proposed by the leader.
///
/// The identity of a proposal is [`BlockHeader::hash_no_signs_and_nonce`]: the
/// signature list and PoW nonce are filled in after verification and mining.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Proposer of this block.
    pub leader: Address,
    /// Block height.
    pub number: u64,
    /// Unix timestamp (seconds) at proposal.
    pub time: u64,
    /// Protocol version string.
    pub version: Vec<u8>,
    /// Super-node signatures over the version.
    #[serde_as(as = "Vec<Bytes>")]
    pub version_signatures: Vec<Signature>,
    /// VRF output and proof for leader election.
    pub vrf_value: Vec<u8>,
    /// Active topology after this block.
    pub net_topology: Vec<TopologyNode>,
    /// Election result in force for this block.
    pub elect: Vec<ElectNode>,
    /// State root after executing the block.
    pub state_root: Hash,
    /// Transactions root.
    pub tx_root: Hash,
    /// Receipts root.
    pub receipt_root: Hash,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub extra: Vec<u8>,
    /// PoW nonce, set by the miner.
    pub nonce: u64,
    /// Validator signatures over the identity hash.
    #[serde_as(as = "Vec<Bytes>")]
    pub signatures: Vec<Signature>,
}

impl BlockHeader {
    /// Identity hash: Keccak-256 over every field except `signatures` and `nonce`.
    pub fn hash_no_signs_and_nonce(&self) -> Hash {
        let mut hasher = Keccak256::new();
        self.hash_body(&mut hasher);
        finalize(hasher)
    }

    /// Full hash including signatures and nonce.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        self.hash_body(&mut hasher);
        hasher.update(self.nonce.to_le_bytes());
        hasher.update((self.signatures.len() as u64).to_le_bytes());
        for sign in &self.signatures {
            hasher.update(sign);
        }
        finalize(hasher)
    }

    fn hash_body(&self, hasher: &mut Keccak256) {
        hasher.update(self.parent_hash);
        hasher.update(self.leader);
        hasher.update(self.number.to_le_bytes());
        hasher.update(self.time.to_le_bytes());
        update_bytes(hasher, &self.version);
        hasher.update((self.version_signatures.len() as u64).to_le_bytes());
        for sign in &self.version_signatures {
            hasher.update(sign);
        }
        update_bytes(hasher, &self.vrf_value);
        hasher.update((self.net_topology.len() as u64).to_le_bytes());
        for node in &self.net_topology {
            hasher.update(node.account);
            hasher.update([role_tag(node.role)]);
            hasher.update(node.position.to_le_bytes());
        }
        hasher.update((self.elect.len() as u64).to_le_bytes());
        for node in &self.elect {
            hasher.update(node.account);
            hasher.update([role_tag(node.role)]);
            hasher.update(node.stock.to_le_bytes());
        }
        hasher.update(self.state_root);
        hasher.update(self.tx_root);
        hasher.update(self.receipt_root);
        hasher.update(self.gas_limit.to_le_bytes());
        hasher.update(self.gas_used.to_le_bytes());
        update_bytes(hasher, &self.extra);
    }
}

fn update_bytes(hasher: &mut Keccak256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn role_tag(role: RoleType) -> u8 {
    match role {
        RoleType::Nil => 0,
        RoleType::Miner => 1,
        RoleType::InnerMiner => 2,
        RoleType::Validator => 3,
        RoleType::BackupValidator => 4,
        RoleType::Broadcast => 5,
    }
}

fn finalize(hasher: Keccak256) -> Hash {
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// A signed transaction as carried in a block.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    /// Recipient (None for contract creation).
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub gas_limit: u64,
    pub data: Vec<u8>,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

impl Transaction {
    /// Transaction hash, as referenced from a request's tx manifest.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.from);
        match self.to {
            Some(to) => {
                hasher.update([1u8]);
                hasher.update(to);
            }
            None => hasher.update([0u8]),
        }
        hasher.update(self.nonce.to_le_bytes());
        let mut value = [0u8; 32];
        self.value.to_big_endian(&mut value);
        hasher.update(value);
        hasher.update(self.gas_limit.to_le_bytes());
        update_bytes(&mut hasher, &self.data);
        hasher.update(self.signature);
        finalize(hasher)
    }
}

/// Execution receipt for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub success: bool,
    pub gas_used: u64,
}

/// Opaque handle to the post-execution state produced by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StateHandle {
    /// State root the handle commits to.
    pub root: Hash,
    /// Engine-specific snapshot identifier.
    pub snapshot_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            parent_hash: [1u8; 32],
            leader: [2u8; 20],
            number: 10,
            time: 1_000,
            version: b"1.0.0".to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_ignores_signatures_and_nonce() {
        let header = sample_header();
        let mut sealed = header.clone();
        sealed.nonce = 42;
        sealed.signatures = vec![[7u8; 65]];

        assert_eq!(
            header.hash_no_signs_and_nonce(),
            sealed.hash_no_signs_and_nonce()
        );
        assert_ne!(header.hash(), sealed.hash());
    }

    #[test]
    fn test_identity_covers_body_fields() {
        let header = sample_header();
        let mut other = header.clone();
        other.state_root = [9u8; 32];
        assert_ne!(
            header.hash_no_signs_and_nonce(),
            other.hash_no_signs_and_nonce()
        );
    }

    #[test]
    fn test_consensus_turn_ordering() {
        let a = ConsensusTurn::new(1, 0);
        let b = ConsensusTurn::new(0, 2);
        let c = ConsensusTurn::new(2, 0);
        let d = ConsensusTurn::new(1, 1);

        assert!(a < b);
        // same total: higher pre-consensus turn wins
        assert!(d < c);
        assert_eq!(a.cmp(&ConsensusTurn::new(1, 0)), Ordering::Equal);
        assert_eq!(c.to_string(), "2[2,0]");
    }

    #[test]
    fn test_transaction_hash_distinguishes_recipient() {
        let tx = Transaction {
            from: [1u8; 20],
            to: None,
            nonce: 0,
            value: U256::from(5u64),
            gas_limit: 21_000,
            data: vec![],
            signature: [0u8; 65],
        };
        let mut to_self = tx.clone();
        to_self.to = Some([1u8; 20]);
        assert_ne!(tx.hash(), to_self.hash());
    }

    #[test]
    fn test_header_serde_roundtrip_with_signatures() {
        let mut header = sample_header();
        header.signatures = vec![[3u8; 65], [4u8; 65]];
        let bytes = bincode::serialize(&header).unwrap();
        let decoded: BlockHeader = bincode::deserialize(&bytes).unwrap();
        assert_eq!(header, decoded);
    }
}
