//! The strategy engine: store, validator, and execution operations.
//!
//! `Engine` owns every collaborator the operations need and serializes all
//! state-mutating calls behind one transaction guard, so each operation
//! observes and commits a consistent snapshot. Read paths go around the
//! guard.

pub mod pricing;
pub mod store;
pub mod types;

mod executor;
mod validator;

pub use executor::{ExecutionReport, RoundWindow};
pub use validator::validate_parameters;

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;

use crate::auth::NonceRegistry;
use crate::error::Result;
use crate::oracle::FeedRegistry;
use crate::swap::{DexRegistry, TokenLedger};
use store::StrategyStore;
use types::Strategy;

pub struct Engine {
    store: StrategyStore,
    feeds: Arc<FeedRegistry>,
    ledger: Arc<TokenLedger>,
    dexes: DexRegistry,
    nonces: NonceRegistry,
    /// Custody account all escrow is held under.
    account: Pubkey,
    /// Serializes every mutating operation, modeling sequential transaction
    /// processing. Held across the swap call so a failed post-swap check can
    /// restore the ledger before anyone else observes it.
    tx_guard: Mutex<()>,
}

impl Engine {
    pub fn new(feeds: Arc<FeedRegistry>, ledger: Arc<TokenLedger>) -> Self {
        Self {
            store: StrategyStore::new(),
            feeds,
            ledger,
            dexes: DexRegistry::new(),
            nonces: NonceRegistry::new(),
            account: Pubkey::new_unique(),
            tx_guard: Mutex::new(()),
        }
    }

    /// The engine's custody key. Swap call data names it as the trader.
    pub fn account(&self) -> Pubkey {
        self.account
    }

    pub fn feeds(&self) -> &FeedRegistry {
        &self.feeds
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn dexes(&self) -> &DexRegistry {
        &self.dexes
    }

    pub fn nonce_of(&self, owner: &Pubkey) -> u64 {
        self.nonces.get(owner)
    }

    pub fn get_strategy(&self, id: u64) -> Result<Strategy> {
        self.store.get(id)
    }

    pub fn strategy_count(&self) -> usize {
        self.store.len()
    }
}
