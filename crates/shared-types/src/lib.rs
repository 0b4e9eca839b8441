//! # Shared Types Crate
//!
//! Chain entities and message payloads shared between the block-verification
//! subsystem, the event bus, and the node's other services.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Identity by Hash**: A proposal is identified by its header hash without
//!   signatures and nonce; see [`BlockHeader::hash_no_signs_and_nonce`].

pub mod entities;
pub mod messages;

pub use entities::*;
pub use messages::*;
