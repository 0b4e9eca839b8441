//! Ring index of recovery slots
//!
//! Encoded as `[capacity:1][last:1][capacity × 32-byte identity]`.

use crate::domain::RecoveryError;
use shared_types::{Hash, ZERO_HASH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryIndex {
    capacity: u8,
    last: u8,
    slots: Vec<Hash>,
}

impl RecoveryIndex {
    /// Empty index. The first save lands in slot 0.
    pub fn new(capacity: u8) -> Result<Self, RecoveryError> {
        if capacity == 0 {
            return Err(RecoveryError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            last: capacity - 1,
            slots: vec![ZERO_HASH; capacity as usize],
        })
    }

    pub fn capacity(&self) -> u8 {
        self.capacity
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    /// Claim the next slot for `hash`, overwriting the oldest entry.
    pub fn save_slot(&mut self, hash: Hash) -> u8 {
        self.last = (self.last + 1) % self.capacity;
        self.slots[self.last as usize] = hash;
        self.last
    }

    pub fn position_of(&self, hash: &Hash) -> Option<u8> {
        if *hash == ZERO_HASH {
            return None;
        }
        self.slots.iter().position(|h| h == hash).map(|p| p as u8)
    }

    /// Non-empty slots as `(position, identity)`.
    pub fn occupied(&self) -> impl Iterator<Item = (u8, Hash)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, h)| **h != ZERO_HASH)
            .map(|(pos, h)| (pos as u8, *h))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.slots.len() * 32);
        out.push(self.capacity);
        out.push(self.last);
        for slot in &self.slots {
            out.extend_from_slice(slot);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecoveryError> {
        let [capacity, last, rest @ ..] = bytes else {
            return Err(RecoveryError::IndexCorrupt("index shorter than header"));
        };
        let (capacity, last) = (*capacity, *last);
        if capacity == 0 {
            return Err(RecoveryError::ZeroCapacity);
        }
        if last >= capacity {
            return Err(RecoveryError::IndexCorrupt("cursor outside ring"));
        }
        if rest.len() != capacity as usize * 32 {
            return Err(RecoveryError::IndexCorrupt("slot array length mismatch"));
        }

        let slots = rest
            .chunks_exact(32)
            .map(|chunk| {
                let mut hash = ZERO_HASH;
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();
        Ok(Self {
            capacity,
            last,
            slots,
        })
    }
}
