//! Restart-safe log of locally verified requests

use super::codec::{decode_blob, encode_blob};
use super::index::RecoveryIndex;
use crate::domain::RecoveryError;
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::Mutex;
use shared_types::{short_hex, ConsensusRequest, Hash, Transaction};
use tracing::{debug, info, warn};

const INDEX_KEY: &[u8] = b"blkverify:index";
const SLOT_PREFIX: &[u8] = b"blkverify:slot:";

fn slot_key(pos: u8) -> Vec<u8> {
    let mut key = SLOT_PREFIX.to_vec();
    key.push(pos);
    key
}

/// A request reloaded from the log.
#[derive(Debug, Clone)]
pub struct RecoveredBlock {
    pub hash: Hash,
    pub request: ConsensusRequest,
    pub txs: Vec<Transaction>,
}

/// Fixed-capacity ring of verified requests.
///
/// The index and the slot blob are written in one atomic batch. The stored
/// index decides the ring size; `capacity` only applies to a fresh store.
pub struct RecoveryLog {
    store: Mutex<Box<dyn KeyValueStore>>,
    capacity: u8,
}

impl RecoveryLog {
    pub fn new(store: Box<dyn KeyValueStore>, capacity: u8) -> Result<Self, RecoveryError> {
        if capacity == 0 {
            return Err(RecoveryError::ZeroCapacity);
        }
        Ok(Self {
            store: Mutex::new(store),
            capacity,
        })
    }

    /// Persist `request` with its full transaction set; returns the slot used.
    pub fn save(
        &self,
        hash: Hash,
        request: &ConsensusRequest,
        txs: &[Transaction],
    ) -> Result<u8, RecoveryError> {
        let blob = encode_blob(request, txs)?;

        let mut store = self.store.lock();
        let mut index = self.read_index(&**store)?;
        let pos = index.save_slot(hash);
        store.atomic_batch_write(vec![
            BatchOperation::put(INDEX_KEY, index.encode()),
            BatchOperation::put(slot_key(pos), blob),
        ])?;

        debug!(
            height = request.number(),
            hash = %short_hex(&hash),
            slot = pos,
            "Saved verified request to recovery log"
        );
        Ok(pos)
    }

    /// Every slot that decodes cleanly and matches its index entry.
    pub fn load(&self) -> Result<Vec<RecoveredBlock>, RecoveryError> {
        let store = self.store.lock();
        let index = self.read_index(&**store)?;

        let mut blocks = Vec::new();
        for (pos, hash) in index.occupied() {
            let data = match store.get(&slot_key(pos)) {
                Ok(Some(data)) => data,
                Ok(None) => {
                    warn!(slot = pos, hash = %short_hex(&hash), "Recovery slot missing");
                    continue;
                }
                Err(e) => {
                    warn!(slot = pos, hash = %short_hex(&hash), error = %e, "Recovery slot read failed");
                    continue;
                }
            };

            let (request, txs) = match decode_blob(&data) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(slot = pos, hash = %short_hex(&hash), error = %e, "Recovery slot decode failed");
                    continue;
                }
            };

            if request.hash() != hash {
                warn!(
                    slot = pos,
                    index_hash = %short_hex(&hash),
                    data_hash = %short_hex(&request.hash()),
                    "Recovery slot identity mismatch"
                );
                continue;
            }
            if request.txs_count() != txs.len() {
                warn!(
                    slot = pos,
                    hash = %short_hex(&hash),
                    manifest = request.txs_count(),
                    txs = txs.len(),
                    "Recovery slot transaction count mismatch"
                );
                continue;
            }

            blocks.push(RecoveredBlock {
                hash,
                request,
                txs,
            });
        }

        info!(count = blocks.len(), "Loaded recovery log");
        Ok(blocks)
    }

    fn read_index(&self, store: &dyn KeyValueStore) -> Result<RecoveryIndex, RecoveryError> {
        match store.get(INDEX_KEY)? {
            Some(bytes) => RecoveryIndex::decode(&bytes),
            None => RecoveryIndex::new(self.capacity),
        }
    }
}
