//! Recovery blob encoding
//!
//! `[req_len: u64 BE][txs_len: u64 BE][request bytes][txs bytes]`, each part
//! serialized with bincode.

use crate::domain::RecoveryError;
use shared_types::{ConsensusRequest, Transaction};

const HEADER_LEN: usize = 16;

pub fn encode_blob(
    request: &ConsensusRequest,
    txs: &[Transaction],
) -> Result<Vec<u8>, RecoveryError> {
    if request.txs_count() != txs.len() {
        return Err(RecoveryError::TxCountMismatch {
            txs: txs.len(),
            manifest: request.txs_count(),
        });
    }
    let req_bytes = bincode::serialize(request)?;
    let txs_bytes = bincode::serialize(txs)?;

    let mut out = Vec::with_capacity(HEADER_LEN + req_bytes.len() + txs_bytes.len());
    out.extend_from_slice(&(req_bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(&(txs_bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(&req_bytes);
    out.extend_from_slice(&txs_bytes);
    Ok(out)
}

pub fn decode_blob(data: &[u8]) -> Result<(ConsensusRequest, Vec<Transaction>), RecoveryError> {
    if data.len() < HEADER_LEN {
        return Err(RecoveryError::BlobSize {
            total: data.len(),
            req_len: 0,
            txs_len: 0,
        });
    }
    let req_len = read_u64(&data[..8]);
    let txs_len = read_u64(&data[8..HEADER_LEN]);
    let size_error = RecoveryError::BlobSize {
        total: data.len(),
        req_len,
        txs_len,
    };

    let expected = (HEADER_LEN as u64)
        .checked_add(req_len)
        .and_then(|n| n.checked_add(txs_len));
    if expected != Some(data.len() as u64) {
        return Err(size_error);
    }

    let split = HEADER_LEN + req_len as usize;
    let request: ConsensusRequest = bincode::deserialize(&data[HEADER_LEN..split])?;
    let txs: Vec<Transaction> = bincode::deserialize(&data[split..])?;
    Ok((request, txs))
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}
