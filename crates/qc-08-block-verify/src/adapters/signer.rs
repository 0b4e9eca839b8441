//! secp256k1 vote signer
//!
//! A vote is `r ‖ s ‖ v` over `keccak256(sign_hash)`. The recovery byte also
//! carries the vote: `v = recid + 27` agrees, `v = recid + 29` disagrees.

use crate::ports::VoteSigner;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use shared_types::{keccak256, Address, Hash, Signature};

const AGREE_V: u8 = 27;
const DISAGREE_V: u8 = 29;

/// Address of a public key: last 20 bytes of keccak over the uncompressed point.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let point = public_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Signs votes with a local secp256k1 key.
#[derive(Clone)]
pub struct Secp256k1VoteSigner {
    key: SigningKey,
    account: Address,
}

impl Secp256k1VoteSigner {
    pub fn new(key: SigningKey) -> Self {
        let account = address_from_pubkey(key.verifying_key());
        Self { key, account }
    }

    /// Fresh random key, for tests and dev networks.
    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut rand::thread_rng()))
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, String> {
        SigningKey::from_slice(secret)
            .map(Self::new)
            .map_err(|e| format!("invalid secret key: {}", e))
    }
}

impl VoteSigner for Secp256k1VoteSigner {
    fn account(&self) -> Address {
        self.account
    }

    fn sign_vote(&self, sign_hash: &Hash, agree: bool) -> Result<Signature, String> {
        let digest = keccak256(sign_hash);
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| format!("vote signing failed: {}", e))?;
        let recid = recid.to_byte();
        if recid > 1 {
            return Err(format!("unsupported recovery id {}", recid));
        }

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recid + if agree { AGREE_V } else { DISAGREE_V };
        Ok(out)
    }

    fn recover_vote(
        &self,
        sign_hash: &Hash,
        signature: &Signature,
    ) -> Result<(Address, bool), String> {
        recover_vote(sign_hash, signature)
    }
}

/// Signer and agree flag of a vote signature.
pub fn recover_vote(sign_hash: &Hash, signature: &Signature) -> Result<(Address, bool), String> {
    let v = signature[64];
    let (recid, agree) = match v {
        27 | 28 => (v - AGREE_V, true),
        29 | 30 => (v - DISAGREE_V, false),
        _ => return Err(format!("invalid vote recovery byte {}", v)),
    };
    let recid = RecoveryId::try_from(recid).map_err(|e| format!("invalid recovery id: {}", e))?;
    let sig = EcdsaSignature::from_slice(&signature[..64])
        .map_err(|e| format!("invalid signature: {}", e))?;

    let digest = keccak256(sign_hash);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recid)
        .map_err(|e| format!("public key recovery failed: {}", e))?;
    Ok((address_from_pubkey(&key), agree))
}
