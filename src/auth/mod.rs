//! Gasless authorization: deterministic message hashing, ed25519 signature
//! checks, and the per-owner nonce registry.
//!
//! An owner signs `hash(op ‖ payload ‖ nonce ‖ owner)` off-line and any
//! relayer submits it. The nonce is read before signing, must equal the
//! stored value at apply time, and is advanced in the same code path that
//! applies the effect, so a replay can never reuse a consumed signature.

use dashmap::DashMap;
use serde::Serialize;
use solana_sdk::hash::{Hash, hash};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::error::{EngineError, Result};

/// Operation tags bound into the signed message, so a create signature can
/// never be replayed as a cancel.
pub mod op {
    pub const CREATE: &str = "strategy/create";
    pub const UPDATE: &str = "strategy/update";
    pub const CANCEL: &str = "strategy/cancel";
}

/// Per-owner monotonic counters, starting at zero.
#[derive(Default)]
pub struct NonceRegistry {
    nonces: DashMap<Pubkey, u64>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: &Pubkey) -> u64 {
        self.nonces.get(owner).map(|n| *n).unwrap_or(0)
    }

    /// Freshness check without advancing, run before the effect is applied.
    pub fn check(&self, owner: &Pubkey, nonce: u64) -> Result<()> {
        let stored = self.get(owner);
        if stored != nonce {
            return Err(EngineError::Unauthorized(format!(
                "nonce mismatch: expected {stored}, got {nonce}"
            )));
        }
        Ok(())
    }

    /// Check-and-advance. Called only after the signature verified and only
    /// in the same path that applies the operation.
    pub fn consume(&self, owner: &Pubkey, nonce: u64) -> Result<()> {
        let mut cell = self.nonces.entry(*owner).or_insert(0);
        if *cell != nonce {
            return Err(EngineError::Unauthorized(format!(
                "nonce mismatch: expected {}, got {nonce}",
                *cell
            )));
        }
        *cell += 1;
        Ok(())
    }
}

/// Deterministic digest the owner signs: operation tag, bincode-encoded
/// payload, nonce, and the owner key itself.
pub fn message_hash<T: Serialize>(
    op: &str,
    payload: &T,
    nonce: u64,
    owner: &Pubkey,
) -> Result<Hash> {
    let encoded = bincode::serialize(payload)
        .map_err(|e| EngineError::InvalidParameters(format!("unencodable payload: {e}")))?;
    let mut message = Vec::with_capacity(op.len() + 1 + encoded.len() + 8 + 32);
    message.extend_from_slice(op.as_bytes());
    message.push(0);
    message.extend_from_slice(&encoded);
    message.extend_from_slice(&nonce.to_le_bytes());
    message.extend_from_slice(owner.as_ref());
    Ok(hash(&message))
}

/// Verify a relayed signature against the claimed owner. Nonce freshness is
/// checked separately by [`NonceRegistry::consume`].
pub fn verify_signature<T: Serialize>(
    op: &str,
    payload: &T,
    nonce: u64,
    owner: &Pubkey,
    signature: &Signature,
) -> Result<()> {
    let digest = message_hash(op, payload, nonce, owner)?;
    if signature.verify(owner.as_ref(), digest.as_ref()) {
        Ok(())
    } else {
        Err(EngineError::Unauthorized("signature does not match owner".into()))
    }
}
