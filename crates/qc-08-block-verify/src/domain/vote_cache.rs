//! Buffer for votes that arrive before their request

use super::error::{BlockVerifyError, BlockVerifyResult};
use shared_types::{Address, Hash, Signature, ZERO_ADDRESS, ZERO_HASH, ZERO_SIGNATURE};
use std::collections::{BTreeMap, HashMap};

/// A buffered vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub sign_hash: Hash,
    pub signature: Signature,
    pub from: Address,
    pub arrived_at_ms: u64,
    seq: u64,
}

/// Votes keyed by sender then signed hash, bounded by age and per-sender count.
///
/// Not synchronized; owned by a single process.
#[derive(Debug)]
pub struct VoteCache {
    by_sender: HashMap<Address, HashMap<Hash, VoteRecord>>,
    /// Insertion order, oldest first.
    order: BTreeMap<u64, (Address, Hash)>,
    next_seq: u64,
    timeout_ms: u64,
    sender_limit: usize,
}

impl VoteCache {
    pub fn new(timeout_ms: u64, sender_limit: usize) -> Self {
        Self {
            by_sender: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            timeout_ms,
            sender_limit,
        }
    }

    pub fn add_vote(
        &mut self,
        sign_hash: Hash,
        signature: Signature,
        from: Address,
        now_ms: u64,
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

        let votes = self.by_sender.entry(from).or_default();
        if votes.contains_key(&sign_hash) {
            return Err(BlockVerifyError::DuplicateVote(from));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        votes.insert(
            sign_hash,
            VoteRecord {
                sign_hash,
                signature,
                from,
                arrived_at_ms: now_ms,
                seq,
            },
        );
        self.order.insert(seq, (from, sign_hash));

        self.evict_expired(now_ms);
        self.evict_over_limit(&from);
        Ok(())
    }

    /// Every buffered vote for `sign_hash`, oldest first.
    pub fn votes_for(&self, sign_hash: &Hash) -> Vec<VoteRecord> {
        let mut found: Vec<VoteRecord> = self
            .by_sender
            .values()
            .filter_map(|votes| votes.get(sign_hash).cloned())
            .collect();
        found.sort_by_key(|v| v.seq);
        found
    }

    pub fn remove_votes(&mut self, sign_hash: &Hash) {
        let mut removed = Vec::new();
        self.by_sender.retain(|_, votes| {
            if let Some(vote) = votes.remove(sign_hash) {
                removed.push(vote.seq);
            }
            !votes.is_empty()
        });
        for seq in removed {
            self.order.remove(&seq);
        }
    }

    pub fn clear(&mut self) {
        self.by_sender.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn sender_count(&self, from: &Address) -> usize {
        self.by_sender.get(from).map_or(0, HashMap::len)
    }

    fn evict_expired(&mut self, now_ms: u64) {
        while let Some((&seq, &(from, hash))) = self.order.first_key_value() {
            let expired = self
                .by_sender
                .get(&from)
                .and_then(|votes| votes.get(&hash))
                .map_or(true, |v| now_ms.saturating_sub(v.arrived_at_ms) > self.timeout_ms);
            if !expired {
                break;
            }
            self.order.remove(&seq);
            self.remove_one(&from, &hash);
        }
    }

    fn evict_over_limit(&mut self, from: &Address) {
        while self.sender_count(from) > self.sender_limit {
            let oldest = self
                .by_sender
                .get(from)
                .and_then(|votes| votes.values().min_by_key(|v| v.seq))
                .map(|v| (v.seq, v.sign_hash));
            let Some((seq, hash)) = oldest else {
                break;
            };
            self.order.remove(&seq);
            self.remove_one(from, &hash);
        }
    }

    fn remove_one(&mut self, from: &Address, hash: &Hash) {
        if let Some(votes) = self.by_sender.get_mut(from) {
            votes.remove(hash);
            if votes.is_empty() {
                self.by_sender.remove(from);
            }
        }
    }
}
