//! Consensus request buffer: one slot per leader plus a ring for other senders

use super::error::{BlockVerifyError, BlockVerifyResult};
use super::request::{RequestKind, RequestRecord};
use super::state::VerifyResult;
use shared_types::{Address, ConsensusTurn, Hash, LocalConsensusRequest, ZERO_ADDRESS};
use std::collections::{HashMap, VecDeque};

/// Requests for a single height.
///
/// Not synchronized; owned by a single process.
#[derive(Debug)]
pub struct RequestCache {
    records: HashMap<Hash, RequestRecord>,
    leader_slots: HashMap<Address, Hash>,
    other_ring: VecDeque<Hash>,
    current_turn: ConsensusTurn,
    other_limit: usize,
}

impl RequestCache {
    pub fn new(other_limit: usize) -> Self {
        Self {
            records: HashMap::new(),
            leader_slots: HashMap::new(),
            other_ring: VecDeque::with_capacity(other_limit),
            current_turn: ConsensusTurn::default(),
            other_limit,
        }
    }

    /// Insert a record, returning its identity.
    pub fn add(&mut self, record: RequestRecord) -> BlockVerifyResult<Hash> {
        if record.request.from == ZERO_ADDRESS && record.kind != RequestKind::Local {
            return Err(BlockVerifyError::InvalidParam("request sender is zero"));
        }
        if record.request.header.leader == ZERO_ADDRESS {
            return Err(BlockVerifyError::InvalidParam("request leader is zero"));
        }
        let turn = record.request.consensus_turn;
        if turn < self.current_turn {
            return Err(BlockVerifyError::StaleRound {
                request: turn,
                current: self.current_turn,
            });
        }
        let hash = record.hash();
        if self.records.contains_key(&hash) {
            return Err(BlockVerifyError::RequestExists(hash));
        }

        match record.kind {
            RequestKind::Local | RequestKind::Leader => {
                let leader = record.leader();
                self.check_leader_slot(&leader, turn, &hash)?;
                if let Some(existing) = self.leader_slots.insert(leader, hash) {
                    self.records.remove(&existing);
                }
            }
            RequestKind::Other => {
                if self.other_limit == 0 {
                    return Ok(hash);
                }
                while self.other_ring.len() >= self.other_limit {
                    if let Some(evicted) = self.other_ring.pop_front() {
                        self.records.remove(&evicted);
                    }
                }
                self.other_ring.push_back(hash);
            }
        }

        self.records.insert(hash, record);
        Ok(hash)
    }

    /// Insert or upgrade a request this node built and executed itself.
    ///
    /// A matching record already cached keeps its votes and takes over the
    /// execution artifacts.
    pub fn add_local(&mut self, local: LocalConsensusRequest) -> BlockVerifyResult<Hash> {
        let hash = local.request.hash();
        let Some(existing) = self.records.get(&hash) else {
            return self.add(RequestRecord::local(local));
        };

        if existing.kind == RequestKind::Other {
            // Build and check the upgrade before the network copy goes away.
            let votes = existing.votes().to_vec();
            let mut record = RequestRecord::local(local);
            for vote in votes {
                record.add_vote(vote)?;
            }
            self.check_leader_slot(&record.leader(), record.request.consensus_turn, &hash)?;
            self.remove(&hash);
            return self.add(record);
        }

        if let Some(record) = self.records.get_mut(&hash) {
            record.kind = RequestKind::Local;
            record.original_txs = local.original_txs;
            record.final_txs = local.final_txs;
            record.receipts = local.receipts;
            record.state = Some(local.state);
            if record.verify_result == VerifyResult::Processing {
                record.verify_result = VerifyResult::Success;
            }
        }
        Ok(hash)
    }

    /// Advance the current round and purge every request below it.
    pub fn set_current_turn(&mut self, turn: ConsensusTurn) {
        if turn <= self.current_turn {
            return;
        }
        self.current_turn = turn;

        let stale: Vec<Hash> = self
            .records
            .iter()
            .filter(|(_, r)| r.request.consensus_turn < turn)
            .map(|(h, _)| *h)
            .collect();
        for hash in stale {
            self.remove(&hash);
        }
    }

    pub fn current_turn(&self) -> ConsensusTurn {
        self.current_turn
    }

    /// The leader's own request, if it was made in exactly `turn`.
    pub fn leader_request(&self, leader: &Address, turn: ConsensusTurn) -> Option<&RequestRecord> {
        let hash = self.leader_slots.get(leader)?;
        self.records
            .get(hash)
            .filter(|r| r.request.consensus_turn == turn)
    }

    pub fn get(&self, hash: &Hash) -> Option<&RequestRecord> {
        self.records.get(hash)
    }

    pub fn get_mut(&mut self, hash: &Hash) -> Option<&mut RequestRecord> {
        self.records.get_mut(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.records.contains_key(hash)
    }

    /// Identities of every cached request, newest header first.
    pub fn all_hashes(&self) -> Vec<Hash> {
        let mut records: Vec<&RequestRecord> = self.records.values().collect();
        records.sort_by(|a, b| b.request.header.time.cmp(&a.request.header.time));
        records.into_iter().map(RequestRecord::hash).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.leader_slots.clear();
        self.other_ring.clear();
    }

    /// Fails if `leader` already holds a different request at `turn` or later.
    fn check_leader_slot(
        &self,
        leader: &Address,
        turn: ConsensusTurn,
        hash: &Hash,
    ) -> BlockVerifyResult<()> {
        let Some(existing) = self.leader_slots.get(leader) else {
            return Ok(());
        };
        if existing == hash {
            return Ok(());
        }
        match self.records.get(existing) {
            Some(old) if old.request.consensus_turn >= turn => {
                Err(BlockVerifyError::LeaderRequestExists {
                    leader: *leader,
                    existing: old.request.consensus_turn,
                })
            }
            _ => Ok(()),
        }
    }

    fn remove(&mut self, hash: &Hash) {
        if self.records.remove(hash).is_none() {
            return;
        }
        self.leader_slots.retain(|_, h| h != hash);
        self.other_ring.retain(|h| h != hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quorum::VerifiedVote;
    use shared_types::{BlockHeader, ConsensusRequest, StateHandle};

    const LEADER: Address = [1u8; 20];
    const OTHER: Address = [2u8; 20];

    fn request(from: Address, turn: ConsensusTurn, time: u64) -> ConsensusRequest {
        ConsensusRequest {
            header: BlockHeader {
                leader: LEADER,
                number: 10,
                time,
                ..Default::default()
            },
            consensus_turn: turn,
            tx_manifest: vec![],
            from,
        }
    }

    #[test]
    fn test_leader_slot_replaced_only_by_higher_round() {
        let mut cache = RequestCache::new(20);
        let turn2 = ConsensusTurn::new(2, 0);
        let first = cache
            .add(RequestRecord::new(request(LEADER, turn2, 1)))
            .unwrap();

        assert!(matches!(
            cache.add(RequestRecord::new(request(LEADER, turn2, 2))),
            Err(BlockVerifyError::LeaderRequestExists { .. })
        ));
        assert_eq!(cache.leader_request(&LEADER, turn2).unwrap().hash(), first);

        let turn3 = ConsensusTurn::new(3, 0);
        let second = cache
            .add(RequestRecord::new(request(LEADER, turn3, 3)))
            .unwrap();
        assert_eq!(cache.leader_request(&LEADER, turn3).unwrap().hash(), second);
        assert!(cache.leader_request(&LEADER, turn2).is_none());
        assert!(!cache.contains(&first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_redelivery_keeps_cached_record() {
        let mut cache = RequestCache::new(20);
        let req = request(LEADER, ConsensusTurn::default(), 1);
        let hash = cache.add(RequestRecord::new(req.clone())).unwrap();
        cache.get_mut(&hash).unwrap().verify_result = VerifyResult::Success;

        assert!(matches!(
            cache.add(RequestRecord::new(req)),
            Err(BlockVerifyError::RequestExists(_))
        ));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&hash).unwrap().verify_result, VerifyResult::Success);
    }

    #[test]
    fn test_other_ring_drops_oldest() {
        let mut cache = RequestCache::new(3);
        let hashes: Vec<Hash> = (0..4)
            .map(|t| {
                cache
                    .add(RequestRecord::new(request(OTHER, ConsensusTurn::default(), t)))
                    .unwrap()
            })
            .collect();

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&hashes[0]));
        assert_eq!(cache.all_hashes(), vec![hashes[3], hashes[2], hashes[1]]);
    }

    #[test]
    fn test_round_advance_purges_stale() {
        let mut cache = RequestCache::new(20);
        let old = cache
            .add(RequestRecord::new(request(LEADER, ConsensusTurn::new(1, 0), 1)))
            .unwrap();
        let other = cache
            .add(RequestRecord::new(request(OTHER, ConsensusTurn::new(1, 0), 2)))
            .unwrap();

        cache.set_current_turn(ConsensusTurn::new(1, 1));
        assert!(!cache.contains(&old));
        assert!(!cache.contains(&other));

        assert!(matches!(
            cache.add(RequestRecord::new(request(LEADER, ConsensusTurn::new(1, 0), 3))),
            Err(BlockVerifyError::StaleRound { .. })
        ));

        // never moves backwards
        cache.set_current_turn(ConsensusTurn::new(0, 0));
        assert_eq!(cache.current_turn(), ConsensusTurn::new(1, 1));
    }

    #[test]
    fn test_local_request_upgrades_network_copy() {
        let mut cache = RequestCache::new(20);
        let req = request(OTHER, ConsensusTurn::default(), 1);
        let hash = cache.add(RequestRecord::new(req.clone())).unwrap();
        assert_eq!(cache.get(&hash).unwrap().kind, RequestKind::Other);

        let local = LocalConsensusRequest {
            request: req,
            original_txs: vec![],
            final_txs: vec![],
            receipts: vec![],
            state: StateHandle::default(),
        };
        assert_eq!(cache.add_local(local).unwrap(), hash);
        let record = cache.get(&hash).unwrap();
        assert_eq!(record.kind, RequestKind::Local);
        assert!(record.state.is_some());
        assert_eq!(
            cache.leader_request(&LEADER, ConsensusTurn::default()).unwrap().hash(),
            hash
        );
    }

    #[test]
    fn test_rejected_upgrade_keeps_network_copy() {
        let mut cache = RequestCache::new(20);
        let turn = ConsensusTurn::default();
        let leader_hash = cache
            .add(RequestRecord::new(request(LEADER, turn, 1)))
            .unwrap();

        let req = request(OTHER, turn, 2);
        let hash = cache.add(RequestRecord::new(req.clone())).unwrap();
        cache
            .get_mut(&hash)
            .unwrap()
            .add_vote(VerifiedVote {
                signature: [4u8; 65],
                account: [4u8; 20],
                agree: true,
                stake: 0,
            })
            .unwrap();

        let local = LocalConsensusRequest {
            request: req,
            original_txs: vec![],
            final_txs: vec![],
            receipts: vec![],
            state: StateHandle::default(),
        };
        assert!(matches!(
            cache.add_local(local),
            Err(BlockVerifyError::LeaderRequestExists { .. })
        ));

        let record = cache.get(&hash).unwrap();
        assert_eq!(record.kind, RequestKind::Other);
        assert_eq!(record.votes().len(), 1);
        assert_eq!(cache.leader_request(&LEADER, turn).unwrap().hash(), leader_hash);
        assert_eq!(cache.all_hashes(), vec![hash, leader_hash]);
    }
}
