//! Block verification service
//!
//! # Architecture
//! - One [`Process`] per height drives a request through local verification
//!   and vote collection.
//! - [`ProcessManager`] keeps the processes for the current height window.
//! - [`Dispatcher`] fans bus events out to the manager, one task per event.

mod broadcast;
mod dispatcher;
mod manager;
mod process;

pub use dispatcher::Dispatcher;
pub use manager::ProcessManager;
pub use process::Process;

use crate::config::BlockVerifyConfig;
use crate::domain::QuorumEngine;
use crate::ports::{
    ChainReader, HeaderVerifier, MessageSender, StateExecutor, TimeSource, TransactionFetcher,
    VerifyNotifier, VoteSigner,
};
use crate::recovery::RecoveryLog;
use std::sync::Arc;

/// Collaborators shared by every process.
///
/// Built once at startup and handed around by `Arc`.
pub struct ProcessDeps {
    pub config: BlockVerifyConfig,
    pub chain: Arc<dyn ChainReader>,
    pub header_verifier: Arc<dyn HeaderVerifier>,
    pub executor: Arc<dyn StateExecutor>,
    pub tx_fetcher: Arc<dyn TransactionFetcher>,
    pub signer: Arc<dyn VoteSigner>,
    pub sender: Arc<dyn MessageSender>,
    pub notifier: Arc<dyn VerifyNotifier>,
    pub recovery: Arc<RecoveryLog>,
    pub time: Arc<dyn TimeSource>,
    pub quorum: QuorumEngine,
}

impl ProcessDeps {
    /// Quorum engine derived from `config.quorum`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BlockVerifyConfig,
        chain: Arc<dyn ChainReader>,
        header_verifier: Arc<dyn HeaderVerifier>,
        executor: Arc<dyn StateExecutor>,
        tx_fetcher: Arc<dyn TransactionFetcher>,
        signer: Arc<dyn VoteSigner>,
        sender: Arc<dyn MessageSender>,
        notifier: Arc<dyn VerifyNotifier>,
        recovery: Arc<RecoveryLog>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let quorum = QuorumEngine::new(config.quorum.clone());
        Self {
            config,
            chain,
            header_verifier,
            executor,
            tx_fetcher,
            signer,
            sender,
            notifier,
            recovery,
            time,
            quorum,
        }
    }
}
