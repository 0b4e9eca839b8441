//! Configuration types for block verification

use crate::domain::QuorumConfig;
use serde::Deserialize;
use std::time::Duration;

/// Runtime configuration for block verification
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BlockVerifyConfig {
    /// Buffered votes older than this are dropped (default: 55s)
    pub vote_pool_timeout_ms: u64,

    /// Maximum buffered votes per sender (default: 5)
    pub vote_pool_sender_limit: usize,

    /// Capacity of the non-leader request ring (default: 20)
    pub other_request_limit: usize,

    /// Transaction fetch timeout (default: 5s)
    pub tx_fetch_timeout_ms: u64,

    /// Slots in the recovery ring (default: 3)
    pub recovery_capacity: u8,

    /// Heights above the current one that may hold a process (default: 2)
    pub look_ahead: u64,

    /// Vote resend cadence (default: 3s)
    pub vote_resend_interval_ms: u64,

    /// Vote resend attempts, 0 = unbounded (default: 8)
    pub vote_resend_times: u32,

    /// Mining request resend cadence, unbounded (default: 3s)
    pub mining_resend_interval_ms: u64,

    /// Posed request resend cadence, unbounded (default: 10s)
    pub posed_resend_interval_ms: u64,

    /// Quorum thresholds
    pub quorum: QuorumConfig,
}

impl Default for BlockVerifyConfig {
    fn default() -> Self {
        Self {
            vote_pool_timeout_ms: 55 * 1000,
            vote_pool_sender_limit: 5,
            other_request_limit: 20,
            tx_fetch_timeout_ms: 5 * 1000,
            recovery_capacity: 3,
            look_ahead: 2,
            vote_resend_interval_ms: 3 * 1000,
            vote_resend_times: 8,
            mining_resend_interval_ms: 3 * 1000,
            posed_resend_interval_ms: 10 * 1000,
            quorum: QuorumConfig::default(),
        }
    }
}

impl BlockVerifyConfig {
    pub fn tx_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_fetch_timeout_ms)
    }

    pub fn vote_resend_interval(&self) -> Duration {
        Duration::from_millis(self.vote_resend_interval_ms)
    }

    pub fn mining_resend_interval(&self) -> Duration {
        Duration::from_millis(self.mining_resend_interval_ms)
    }

    pub fn posed_resend_interval(&self) -> Duration {
        Duration::from_millis(self.posed_resend_interval_ms)
    }
}
