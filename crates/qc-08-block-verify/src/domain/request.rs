//! Request records tracked by a process

use super::error::{BlockVerifyError, BlockVerifyResult};
use super::quorum::VerifiedVote;
use super::state::VerifyResult;
use shared_types::{
    Address, ConsensusRequest, FullBlockResponse, Hash, LocalConsensusRequest, Receipt,
    StateHandle, Transaction, ZERO_ADDRESS,
};

/// How a request entered the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Built by this node; already executed.
    Local,
    /// Sent by the header's leader (or restored under the leader's slot).
    Leader,
    /// Sent by anyone else.
    Other,
}

/// A consensus request plus its verification progress.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub kind: RequestKind,
    pub request: ConsensusRequest,
    hash: Hash,
    pub original_txs: Vec<Transaction>,
    pub final_txs: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
    pub state: Option<StateHandle>,
    pub verify_result: VerifyResult,
    pub pos_finished: bool,
    votes: Vec<VerifiedVote>,
}

impl RequestRecord {
    /// Record for a request received from the network.
    pub fn new(request: ConsensusRequest) -> Self {
        let kind = if request.from == request.header.leader {
            RequestKind::Leader
        } else {
            RequestKind::Other
        };
        Self::with_kind(request, kind)
    }

    /// Record for a request this node produced.
    pub fn local(local: LocalConsensusRequest) -> Self {
        let mut record = Self::with_kind(local.request, RequestKind::Local);
        record.original_txs = local.original_txs;
        record.final_txs = local.final_txs;
        record.receipts = local.receipts;
        record.state = Some(local.state);
        record
    }

    /// Record reloaded from the recovery log.
    pub fn restored(request: ConsensusRequest, txs: Vec<Transaction>) -> Self {
        let mut record = Self::with_kind(request, RequestKind::Leader);
        record.original_txs = txs;
        record.verify_result = VerifyResult::Restored;
        record
    }

    /// Record built from a peer's full-block answer; still needs verification.
    pub fn from_full_block(response: FullBlockResponse) -> Self {
        let mut record = Self::with_kind(response.request, RequestKind::Leader);
        record.original_txs = response.txs;
        record
    }

    fn with_kind(request: ConsensusRequest, kind: RequestKind) -> Self {
        let hash = request.hash();
        Self {
            kind,
            request,
            hash,
            original_txs: Vec::new(),
            final_txs: Vec::new(),
            receipts: Vec::new(),
            state: None,
            verify_result: VerifyResult::Processing,
            pos_finished: false,
            votes: Vec::new(),
        }
    }

    /// Identity of the request. Fixed at creation.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn parent_hash(&self) -> Hash {
        self.request.header.parent_hash
    }

    pub fn leader(&self) -> Address {
        self.request.header.leader
    }

    /// Whether every manifest entry has a transaction attached.
    pub fn has_all_txs(&self) -> bool {
        self.request.txs_count() == 0 || self.request.txs_count() == self.original_txs.len()
    }

    /// Whether `account` already voted. The zero address counts as voted.
    pub fn has_vote_from(&self, account: &Address) -> bool {
        *account == ZERO_ADDRESS || self.votes.iter().any(|v| v.account == *account)
    }

    pub fn add_vote(&mut self, vote: VerifiedVote) -> BlockVerifyResult<()> {
        if vote.account == ZERO_ADDRESS {
            return Err(BlockVerifyError::InvalidParam("vote account is zero"));
        }
        if self.votes.iter().any(|v| v.account == vote.account) {
            return Err(BlockVerifyError::DuplicateVote(vote.account));
        }
        self.votes.push(vote);
        Ok(())
    }

    pub fn votes(&self) -> &[VerifiedVote] {
        &self.votes
    }

    pub fn clear_votes(&mut self) {
        self.votes.clear();
    }

    /// Full block answer, if this node holds every transaction.
    pub fn full_block(&self) -> Option<FullBlockResponse> {
        if !self.has_all_txs() {
            return None;
        }
        Some(FullBlockResponse {
            request: self.request.clone(),
            txs: self.original_txs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{BlockHeader, ConsensusTurn};

    fn request(from: Address, leader: Address) -> ConsensusRequest {
        ConsensusRequest {
            header: BlockHeader {
                leader,
                number: 3,
                ..Default::default()
            },
            consensus_turn: ConsensusTurn::default(),
            tx_manifest: vec![[1u8; 32]],
            from,
        }
    }

    fn vote(account: u8, agree: bool) -> VerifiedVote {
        VerifiedVote {
            signature: [account; 65],
            account: [account; 20],
            agree,
            stake: 0,
        }
    }

    #[test]
    fn test_kind_from_sender() {
        assert_eq!(
            RequestRecord::new(request([1u8; 20], [1u8; 20])).kind,
            RequestKind::Leader
        );
        assert_eq!(
            RequestRecord::new(request([2u8; 20], [1u8; 20])).kind,
            RequestKind::Other
        );
    }

    #[test]
    fn test_restored_record_is_preverified() {
        let record = RequestRecord::restored(request([1u8; 20], [1u8; 20]), vec![]);
        assert_eq!(record.verify_result, VerifyResult::Restored);
        assert!(!record.has_all_txs());
    }

    #[test]
    fn test_votes_unique_per_account() {
        let mut record = RequestRecord::new(request([1u8; 20], [1u8; 20]));
        record.add_vote(vote(5, true)).unwrap();
        assert!(matches!(
            record.add_vote(vote(5, false)),
            Err(BlockVerifyError::DuplicateVote(_))
        ));
        assert!(record.has_vote_from(&[5u8; 20]));
        assert!(record.has_vote_from(&ZERO_ADDRESS));
        assert_eq!(record.votes().len(), 1);

        record.clear_votes();
        assert!(record.votes().is_empty());
    }
}
