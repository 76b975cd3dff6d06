//! HTTP handlers, grouped by operation family.

pub mod execute;
pub mod health;
pub mod oracle_admin;
pub mod strategy;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::error::{EngineError, Result};

pub(crate) fn parse_pubkey(s: &str) -> Result<Pubkey> {
    s.parse()
        .map_err(|_| EngineError::InvalidParameters(format!("invalid pubkey {s}")))
}

pub(crate) fn parse_signature(s: &str) -> Result<Signature> {
    s.parse()
        .map_err(|_| EngineError::InvalidParameters("invalid signature encoding".into()))
}
