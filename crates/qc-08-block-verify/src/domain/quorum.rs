//! Stake-weighted supermajority decision over signed votes

use super::error::QuorumError;
use serde::Deserialize;
use shared_types::{Address, ElectNode, Signature};
use std::collections::HashMap;

/// Stake assumed for a validator missing from the election list.
pub const DEFAULT_STOCK: u16 = 1;

/// A vote whose signature has been recovered and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedVote {
    pub signature: Signature,
    pub account: Address,
    pub agree: bool,
    /// Filled from the stake table during evaluation.
    pub stake: u16,
}

/// Validator stakes anchored to one parent block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakeTable {
    stakes: HashMap<Address, u16>,
}

impl StakeTable {
    pub fn new(entries: impl IntoIterator<Item = (Address, u16)>) -> Self {
        Self {
            stakes: entries.into_iter().collect(),
        }
    }

    /// Every validator gets its elected stock, or [`DEFAULT_STOCK`] if unelected.
    pub fn from_validators(validators: &[Address], elect: &[ElectNode]) -> Self {
        let stocks: HashMap<Address, u16> = elect.iter().map(|e| (e.account, e.stock)).collect();
        Self::new(validators.iter().map(|account| {
            let stock = stocks.get(account).copied().unwrap_or(DEFAULT_STOCK);
            (*account, stock)
        }))
    }

    pub fn total_count(&self) -> usize {
        self.stakes.len()
    }

    pub fn total_stake(&self) -> u64 {
        self.stakes.values().map(|s| u64::from(*s)).sum()
    }

    pub fn get(&self, account: &Address) -> Option<u16> {
        self.stakes.get(account).copied()
    }

    pub fn contains(&self, account: &Address) -> bool {
        self.stakes.contains_key(account)
    }
}

/// Quorum thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    /// Share of signers that must agree (default: 0.66667)
    pub target_sign_count_ratio: f64,
    /// Share of stake that must agree (default: 0, count-only)
    pub target_stake_ratio: f64,
    /// Fewer signers than this and nothing can pass (default: 3)
    pub min_stake_count: usize,
    /// At or below this many signers every one must agree (default: 7)
    pub full_sign_threshold: usize,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            target_sign_count_ratio: 0.66667,
            target_stake_ratio: 0.0,
            min_stake_count: 3,
            full_sign_threshold: 7,
        }
    }
}

impl QuorumConfig {
    /// Thresholds for single-node and small test networks.
    pub fn simple() -> Self {
        Self {
            min_stake_count: 1,
            ..Self::default()
        }
    }
}

/// Thresholds derived from a stake table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumTarget {
    pub total_count: usize,
    pub total_stake: u64,
    pub target_count: usize,
    pub target_stake: u64,
    pub max_disagree_count: usize,
    pub max_disagree_stake: u64,
}

/// Stateless quorum evaluator.
#[derive(Debug, Clone, Default)]
pub struct QuorumEngine {
    config: QuorumConfig,
}

impl QuorumEngine {
    pub fn new(config: QuorumConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// Compute the thresholds for `table`.
    pub fn target(&self, table: &StakeTable) -> Result<QuorumTarget, QuorumError> {
        let total_count = table.total_count();
        if total_count < self.config.min_stake_count {
            return Err(QuorumError::StakeCountTooLow {
                count: total_count,
                min: self.config.min_stake_count,
            });
        }
        let total_stake = table.total_stake();

        let (target_count, target_stake) = if total_count <= self.config.full_sign_threshold {
            (total_count, total_stake)
        } else {
            let count = (total_count as f64 * self.config.target_sign_count_ratio).ceil() as usize;
            let stake = (total_stake as f64 * self.config.target_stake_ratio).ceil() as u64;
            (count.min(total_count), stake.min(total_stake))
        };

        Ok(QuorumTarget {
            total_count,
            total_stake,
            target_count,
            target_stake,
            max_disagree_count: total_count - target_count,
            max_disagree_stake: total_stake - target_stake,
        })
    }

    /// Decide whether `votes` reach quorum under `table`.
    ///
    /// Returns the agreeing signatures on success. Disagreement past the
    /// tolerated maximum fails as soon as it is seen.
    pub fn verify(
        &self,
        votes: &[VerifiedVote],
        table: &StakeTable,
    ) -> Result<Vec<Signature>, QuorumError> {
        let target = self.target(table)?;
        if votes.len() < target.target_count {
            return Err(QuorumError::SignCountNotEnough {
                got: votes.len(),
                target: target.target_count,
            });
        }

        let counted = dedup_votes(votes, table);
        if counted.len() < target.target_count {
            return Err(QuorumError::SignCountNotEnough {
                got: counted.len(),
                target: target.target_count,
            });
        }

        let mut agree_count = 0usize;
        let mut agree_stake = 0u64;
        let mut disagree_count = 0usize;
        let mut disagree_stake = 0u64;
        let mut right_signs = Vec::with_capacity(counted.len());

        for vote in &counted {
            let stake = u64::from(vote.stake);
            if vote.agree {
                agree_count += 1;
                agree_stake += stake;
                right_signs.push(vote.signature);
                continue;
            }

            disagree_count += 1;
            disagree_stake += stake;
            if disagree_count > target.max_disagree_count {
                return Err(QuorumError::DisagreeCountExceeded {
                    got: disagree_count,
                    max: target.max_disagree_count,
                });
            }
            if disagree_stake > target.max_disagree_stake {
                return Err(QuorumError::DisagreeStakeExceeded {
                    got: disagree_stake,
                    max: target.max_disagree_stake,
                });
            }
        }

        if agree_count < target.target_count {
            return Err(QuorumError::SignCountNotEnough {
                got: agree_count,
                target: target.target_count,
            });
        }
        if agree_stake < target.target_stake {
            return Err(QuorumError::SignStakeNotEnough {
                got: agree_stake,
                target: target.target_stake,
            });
        }
        Ok(right_signs)
    }

    /// Broadcast heights carry a single agree signature from the block
    /// leader, who must hold the broadcast role.
    pub fn verify_broadcast(
        &self,
        leader: &Address,
        signers: &[(Address, bool)],
        broadcast_accounts: &[Address],
    ) -> Result<(), QuorumError> {
        let [(signer, agree)] = signers else {
            return Err(QuorumError::BroadcastSignCount(signers.len()));
        };
        if signer != leader {
            return Err(QuorumError::BroadcastSignerNotLeader {
                signer: *signer,
                leader: *leader,
            });
        }
        if !agree {
            return Err(QuorumError::BroadcastSignFalse);
        }
        if !broadcast_accounts.contains(signer) {
            return Err(QuorumError::BroadcastSignerNotBroadcast(*signer));
        }
        Ok(())
    }
}

/// One vote per known account, in first-seen order. A later agree replaces
/// an earlier disagree from the same account.
fn dedup_votes(votes: &[VerifiedVote], table: &StakeTable) -> Vec<VerifiedVote> {
    let mut order: Vec<VerifiedVote> = Vec::with_capacity(votes.len());
    let mut index: HashMap<Address, usize> = HashMap::with_capacity(votes.len());

    for vote in votes {
        let Some(stake) = table.get(&vote.account) else {
            continue;
        };
        match index.get(&vote.account) {
            Some(&pos) => {
                if vote.agree && !order[pos].agree {
                    order[pos] = VerifiedVote {
                        stake,
                        ..vote.clone()
                    };
                }
            }
            None => {
                index.insert(vote.account, order.len());
                order.push(VerifiedVote {
                    stake,
                    ..vote.clone()
                });
            }
        }
    }
    order
}
