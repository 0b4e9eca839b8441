//! Broadcast-role path: accept a block on its attached signatures

use super::process::{local_verified, Process, ProcessInner};
use crate::domain::{ProcessState, RequestKind, RequestRecord, VerifiedVote, VerifyResult};
use rand::seq::SliceRandom;
use shared_types::{short_hex, Hash, Signature};
use tracing::{debug, info, warn};

impl Process {
    /// Try cached requests in random order until one carries a valid
    /// signature set.
    pub(super) fn start_broadcast_path(&self, inner: &mut ProcessInner) {
        if inner.state != ProcessState::Start {
            return;
        }

        let mut candidates = inner.requests.all_hashes();
        candidates.shuffle(&mut rand::thread_rng());

        for hash in candidates {
            if inner.broadcast_done.contains(&hash) {
                continue;
            }
            let Some(record) = inner.requests.get(&hash) else {
                continue;
            };
            if let Err(reason) = self.verify_block_signatures(record) {
                debug!(height = self.number(), hash = %short_hex(&hash), %reason, "Broadcast candidate rejected");
                if let Some(record) = inner.requests.get_mut(&hash) {
                    record.verify_result = VerifyResult::StateFailed;
                }
                continue;
            }

            inner.current = Some(hash);
            self.advance_to(inner, ProcessState::RequestVerify);
            debug!(height = self.number(), hash = %short_hex(&hash), "Verifying broadcast candidate");
            self.broadcast_request_verify(inner);
            return;
        }
        debug!(height = self.number(), "No broadcast candidate ready");
    }

    /// Broadcast heights carry the leader's single signature; other heights
    /// carry a full quorum.
    fn verify_block_signatures(&self, record: &RequestRecord) -> Result<(), String> {
        let deps = &self.deps;
        let header = &record.request.header;
        let hash = record.hash();

        if deps.chain.is_broadcast_number(header.number) {
            let signers = header
                .signatures
                .iter()
                .map(|signature| deps.signer.recover_vote(&hash, signature))
                .collect::<Result<Vec<_>, _>>()?;
            let accounts = deps.chain.broadcast_accounts(&header.parent_hash)?;
            return deps
                .quorum
                .verify_broadcast(&header.leader, &signers, &accounts)
                .map_err(|e| e.to_string());
        }

        let votes: Vec<VerifiedVote> = header
            .signatures
            .iter()
            .filter_map(|signature| self.verify_vote(&hash, signature, None).ok())
            .collect();
        let table = deps.chain.stake_table(&header.parent_hash)?;
        deps.quorum
            .verify(&votes, &table)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn broadcast_request_verify(&self, inner: &mut ProcessInner) {
        let Some(record) = inner.current_record() else {
            return;
        };

        if record.kind == RequestKind::Local {
            self.finish_broadcast(inner, VerifyResult::Success);
            return;
        }
        if record.verify_result.is_accepted() {
            let result = record.verify_result;
            self.finish_broadcast(inner, result);
            return;
        }

        let header = &record.request.header;
        let Some(parent) = self.deps.chain.header_by_hash(&header.parent_hash) else {
            warn!(height = self.number(), "Parent header missing for broadcast candidate");
            self.finish_broadcast(inner, VerifyResult::StateFailed);
            return;
        };
        if let Err(e) = self.deps.header_verifier.verify_header(header, &parent) {
            warn!(height = self.number(), error = %e, "Broadcast candidate header check failed");
            self.finish_broadcast(inner, VerifyResult::StateFailed);
            return;
        }
        self.start_tx_verify(inner);
    }

    /// Accept the current candidate, or fall back to the next one.
    pub(super) fn finish_broadcast(&self, inner: &mut ProcessInner, result: VerifyResult) {
        let Some(hash) = inner.current else {
            return;
        };
        if result == VerifyResult::Processing {
            warn!(height = self.number(), hash = %short_hex(&hash), "Broadcast candidate finished unverified");
            return;
        }
        if let Some(record) = inner.requests.get_mut(&hash) {
            record.verify_result = result;
        }
        inner.broadcast_done.insert(hash);

        if !result.is_accepted() {
            warn!(height = self.number(), hash = %short_hex(&hash), result = result.as_str(), "Broadcast candidate failed");
            self.reset_to_start(inner);
            self.start_broadcast_path(inner);
            return;
        }

        if let Some(record) = inner.requests.get(&hash) {
            let verified = local_verified(record);
            self.deps.notifier.local_verified(verified.clone());
            self.deps.notifier.broadcast_finished(verified);
        }
        inner.state = ProcessState::End;
        info!(height = self.number(), hash = %short_hex(&hash), "Broadcast block accepted");
    }

    /// A posed copy of a cached request may carry more signatures than the
    /// copy that arrived first.
    pub(super) fn refresh_broadcast_signatures(
        &self,
        inner: &mut ProcessInner,
        hash: Hash,
        signatures: Vec<Signature>,
    ) {
        if inner.broadcast_done.contains(&hash) {
            return;
        }
        let Some(record) = inner.requests.get_mut(&hash) else {
            return;
        };
        if signatures.len() <= record.request.header.signatures.len() {
            return;
        }
        record.request.header.signatures = signatures;
        debug!(height = self.number(), hash = %short_hex(&hash), "Broadcast candidate signatures refreshed");
        self.start_broadcast_path(inner);
    }
}
