//! Domain layer for block verification
//!
//! - quorum: stake-weighted supermajority over signed votes
//! - request_cache / vote_cache: per-height buffers owned by a process
//! - state: process states and leader context

mod error;
mod quorum;
mod request;
mod request_cache;
mod state;
mod vote_cache;

pub use error::*;
pub use quorum::*;
pub use request::*;
pub use request_cache::*;
pub use state::*;
pub use vote_cache::*;
