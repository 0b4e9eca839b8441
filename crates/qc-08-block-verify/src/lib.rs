//! # qc-08-block-verify
//!
//! Block verification for the hybrid PoS/PoW chain.
//!
//! ## Architecture
//!
//! For every height a [`Process`](service::Process) takes the leader's
//! consensus request, re-executes it locally, casts a signed vote and gathers
//! the other validators' votes until a stake-weighted quorum is reached. The
//! header then carries the quorum signatures and goes to miners for sealing.
//!
//! ```text
//! [Event Bus] ──role/leader/request/vote──→ Dispatcher ──→ ProcessManager
//!                                                              │
//!                                               Process(h), Process(h+1), Process(h+2)
//!                                                              │
//!           LocalVerifyOk / PosFinished / NetworkSend ←────────┘
//! ```
//!
//! Broadcast nodes follow a shorter path: they accept any cached request
//! whose attached signatures already prove a quorum (or, at broadcast
//! heights, the leader's single signature) and never vote.
//!
//! ## Crash Recovery
//!
//! Requests this node verified are written to a small ring in a key-value
//! store. After a restart they come back as restored records, so the node
//! re-casts its vote without executing the block again.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qc_08_block_verify::{Dispatcher, ProcessDeps, BlockVerifyConfig};
//!
//! let deps = Arc::new(ProcessDeps::new(config, chain, header_verifier, executor,
//!     tx_fetcher, signer, sender, notifier, recovery, time));
//! let dispatcher = Arc::new(Dispatcher::new(deps));
//! tokio::spawn(dispatcher.run(bus, shutdown_rx));
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod recovery;
pub mod resend;
pub mod service;

// Re-export main types
pub use config::BlockVerifyConfig;
pub use domain::{
    BlockVerifyError, BlockVerifyResult, ProcessState, QuorumConfig, QuorumEngine, QuorumError,
    StakeTable, VerifiedVote, VerifyResult,
};
pub use ports::{
    BlockVerifyApi, ChainReader, HeaderVerifier, MessageSender, StateExecutor, TimeSource,
    TransactionFetcher, VerifyNotifier, VoteSigner,
};
pub use recovery::{RecoveredBlock, RecoveryLog};
pub use service::{Dispatcher, Process, ProcessDeps, ProcessManager};
