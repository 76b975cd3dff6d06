//! Swap capability boundary and the in-memory token ledger it settles on.
//!
//! The engine never prices trades itself. It authorizes an adapter
//! implementing [`SwapExecutor`] to pull an exact input amount from its
//! escrow account, lets the adapter run opaque call data, and then measures
//! what actually moved on the ledger. [`ScenarioDex`] is the
//! fixed-exchange-rate adapter used by tests and local runs.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::engine::pricing;
use crate::engine::types::AssetId;
use crate::error::{EngineError, Result};

// ─── Token ledger ────────────────────────────────────────────────────────────

/// In-memory balance book with ERC-20-shaped semantics: balances,
/// allowances, and a per-asset decimals registry. All engine escrow and all
/// adapter settlement happens against this one ledger.
#[derive(Default)]
pub struct TokenLedger {
    balances: DashMap<(AssetId, Pubkey), u128>,
    allowances: DashMap<(AssetId, Pubkey, Pubkey), u128>,
    decimals: DashMap<AssetId, u8>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_asset(&self, asset: &str, decimals: u8) {
        self.decimals.insert(asset.to_string(), decimals);
    }

    pub fn decimals(&self, asset: &str) -> Result<u8> {
        self.decimals
            .get(asset)
            .map(|d| *d)
            .ok_or_else(|| EngineError::FeedMissing(format!("asset {asset} not registered")))
    }

    pub fn mint(&self, asset: &str, to: Pubkey, amount: u128) {
        let mut cell = self.balances.entry((asset.to_string(), to)).or_insert(0);
        *cell = cell.saturating_add(amount);
    }

    pub fn balance_of(&self, asset: &str, account: Pubkey) -> u128 {
        self.balances
            .get(&(asset.to_string(), account))
            .map(|b| *b)
            .unwrap_or(0)
    }

    pub fn approve(&self, asset: &str, owner: Pubkey, spender: Pubkey, amount: u128) {
        self.allowances.insert((asset.to_string(), owner, spender), amount);
    }

    pub fn allowance(&self, asset: &str, owner: Pubkey, spender: Pubkey) -> u128 {
        self.allowances
            .get(&(asset.to_string(), owner, spender))
            .map(|a| *a)
            .unwrap_or(0)
    }

    pub fn transfer(&self, asset: &str, from: Pubkey, to: Pubkey, amount: u128) -> Result<()> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                token: asset.to_string(),
                needed: amount,
                available,
            });
        }
        self.balances.insert((asset.to_string(), from), available - amount);
        let mut cell = self.balances.entry((asset.to_string(), to)).or_insert(0);
        *cell = cell.saturating_add(amount);
        Ok(())
    }

    /// Allowance-gated transfer, the path adapters use to pull engine funds.
    pub fn transfer_from(
        &self,
        asset: &str,
        spender: Pubkey,
        from: Pubkey,
        to: Pubkey,
        amount: u128,
    ) -> Result<()> {
        let allowed = self.allowance(asset, from, spender);
        if allowed < amount {
            return Err(EngineError::Unauthorized(format!(
                "allowance of {asset} for {spender} is {allowed}, needed {amount}"
            )));
        }
        self.transfer(asset, from, to, amount)?;
        self.allowances
            .insert((asset.to_string(), from, spender), allowed - amount);
        Ok(())
    }

    /// Snapshot the given balance cells so a failed post-swap check can put
    /// the ledger back exactly as it was.
    pub fn checkpoint(&self, cells: &[(&str, Pubkey)]) -> LedgerCheckpoint {
        LedgerCheckpoint {
            cells: cells
                .iter()
                .map(|(asset, account)| {
                    (asset.to_string(), *account, self.balance_of(asset, *account))
                })
                .collect(),
        }
    }

    pub fn restore(&self, checkpoint: &LedgerCheckpoint) {
        for (asset, account, balance) in &checkpoint.cells {
            self.balances.insert((asset.clone(), *account), *balance);
        }
    }
}

/// Saved balances for rollback. Covers exactly the cells an execution can
/// touch; allowances are reset separately on both paths.
pub struct LedgerCheckpoint {
    cells: Vec<(AssetId, Pubkey, u128)>,
}

// ─── Executor boundary ───────────────────────────────────────────────────────

/// Caller-supplied routing for one trade: which adapter, and the opaque call
/// data forwarded to it untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorCall {
    pub dex: String,
    pub call_data: serde_json::Value,
}

#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Ledger identity of the adapter, the spender the engine approves.
    fn account(&self) -> Pubkey;

    /// Run the trade described by `call_data` and declare the output amount.
    /// The engine re-measures the declared amount against its own balance
    /// deltas, so a lying adapter only fails the call.
    async fn swap(&self, call_data: &serde_json::Value) -> Result<u128>;
}

#[derive(Default)]
pub struct DexRegistry {
    adapters: DashMap<String, Arc<dyn SwapExecutor>>,
}

impl DexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, adapter: Arc<dyn SwapExecutor>) {
        self.adapters.insert(name.to_string(), adapter);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SwapExecutor>> {
        self.adapters
            .get(name)
            .map(|a| a.clone())
            .ok_or_else(|| EngineError::InvalidParameters(format!("unknown dex {name}")))
    }
}

// ─── Scenario adapter ────────────────────────────────────────────────────────

/// Call data shape the scenario adapter understands.
#[derive(Debug, Deserialize)]
struct ScenarioCall {
    from_token: AssetId,
    to_token: AssetId,
    amount_in: u128,
    trader: String,
}

/// Fixed-rate exchange over the shared ledger. Each asset carries an 8-dec
/// USD rate independent from the oracle feeds, which is exactly what the
/// slippage tests need: the oracle can move while the venue's rate stays put.
pub struct ScenarioDex {
    account: Pubkey,
    ledger: Arc<TokenLedger>,
    rates: DashMap<AssetId, u128>,
}

impl ScenarioDex {
    pub fn new(ledger: Arc<TokenLedger>) -> Arc<Self> {
        Arc::new(Self {
            account: Pubkey::new_unique(),
            ledger,
            rates: DashMap::new(),
        })
    }

    pub fn set_rate(&self, asset: &str, usd_price: u128) {
        self.rates.insert(asset.to_string(), usd_price);
    }

    fn rate(&self, asset: &str) -> Result<u128> {
        self.rates
            .get(asset)
            .map(|r| *r)
            .ok_or_else(|| EngineError::InvalidParameters(format!("no venue rate for {asset}")))
    }
}

#[async_trait]
impl SwapExecutor for ScenarioDex {
    fn account(&self) -> Pubkey {
        self.account
    }

    async fn swap(&self, call_data: &serde_json::Value) -> Result<u128> {
        let call: ScenarioCall = serde_json::from_value(call_data.clone())
            .map_err(|e| EngineError::InvalidParameters(format!("bad call data: {e}")))?;
        let trader: Pubkey = call
            .trader
            .parse()
            .map_err(|_| EngineError::InvalidParameters("bad trader key".into()))?;

        let out = pricing::implied_amount_out(
            call.amount_in,
            self.rate(&call.from_token)?,
            self.rate(&call.to_token)?,
            self.ledger.decimals(&call.from_token)?,
            self.ledger.decimals(&call.to_token)?,
        )?;

        self.ledger.transfer_from(
            &call.from_token,
            self.account,
            trader,
            self.account,
            call.amount_in,
        )?;
        self.ledger.transfer(&call.to_token, self.account, trader, out)?;
        Ok(out)
    }
}
