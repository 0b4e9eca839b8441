//! Adapters layer (Hexagonal Architecture)

mod event_bus;
mod signer;
mod storage;

pub use event_bus::*;
pub use signer::*;
pub use storage::*;
