//! Crash-recovery log for verified requests
//!
//! A small ring (default three slots) of requests whose local verification
//! succeeded. After a restart they are fed back as restored records so the
//! node re-casts its vote without re-executing the block.

mod codec;
mod index;
mod log;

pub use codec::{decode_blob, encode_blob};
pub use index::RecoveryIndex;
pub use log::{RecoveredBlock, RecoveryLog};
