//! Core data model: the strategy record, its parameter bundle, and the
//! trigger enums.
//!
//! All prices are unsigned fixed-point with 8 decimals (USD style, the scale
//! Chainlink-type feeds publish). Token amounts are kept in the token's own
//! native decimals; conversions happen at comparison points in
//! [`crate::engine::pricing`]. Trigger *price* values are denominated in
//! stable-token units (e.g. `1_500_000000` is 1500.00 against a 6-decimal
//! stable) and normalized through the stable feed.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Asset identifier. Mint-style opaque string; decimals and feeds are
/// registered against it.
pub type AssetId = String;

/// Internal price scale: 8 decimals.
pub const PRICE_SCALE: u128 = 100_000_000;

/// Basis-point denominator for percentages and slippage tolerances.
pub const BPS_DENOMINATOR: u128 = 10_000;

// ─── Trigger enums ───────────────────────────────────────────────────────────

/// How a buy/sell trigger value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Unset,
    /// Value is an absolute price in stable-token units.
    FixedPrice,
    /// Value is a basis-point offset from the captured baseline price.
    CurrentPricePercent,
}

/// How a buy-the-dip / sell-the-rally movement threshold is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    #[default]
    Unset,
    /// High-round price must reach an absolute level (stable-token units).
    FixedPrice,
    /// Movement between the two rounds must be at least this many bps of the
    /// low-round price.
    Percent,
    /// Movement must be at least this absolute 8-decimal price delta.
    FixedAmount,
}

/// Stop-loss threshold interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorType {
    #[default]
    Unset,
    /// Absolute price in stable-token units.
    FixedPrice,
    /// Basis points below the position's entry price.
    PercentDrop,
    /// Unrealized loss in stable-token units.
    FixedLoss,
}

/// Unit for the TWAP inter-tranche interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Unset,
    Hours,
    Minutes,
}

impl TimeUnit {
    pub fn seconds(self) -> u64 {
        match self {
            TimeUnit::Unset => 0,
            TimeUnit::Hours => 3600,
            TimeUnit::Minutes => 60,
        }
    }
}

/// Dollar-cost-average cap: how much of the remaining side one execution
/// call may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DcaUnit {
    #[default]
    Unset,
    /// Slice is `value` bps of the remaining amount (naturally decaying).
    Percent,
    /// Slice is a fixed amount in the side's native token units.
    Fixed,
}

/// Which side's live price is captured as the relative-trigger baseline at
/// creation time, when the creator does not rely on the per-type default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentPriceSelector {
    #[default]
    Unset,
    BuySide,
    SellSide,
}

// ─── Parameter bundle ────────────────────────────────────────────────────────

/// The immutable-until-update configuration bundle of a strategy. All trigger
/// blocks are optional; a disabled block keeps its zero/`Unset` defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParameters {
    /// Stable-asset budget escrowed for buys.
    pub stable_amount: u128,
    /// Invest-asset position escrowed for sells.
    pub invest_amount: u128,
    /// Tolerance band applied to every trade, in bps.
    pub slippage_bps: u64,

    // Floor / stop-loss
    pub floor: bool,
    pub floor_type: FloorType,
    pub floor_value: u128,
    pub liquidate_on_floor: bool,
    pub cancel_on_floor: bool,

    // Buy trigger
    pub buy: bool,
    pub buy_type: TriggerType,
    pub buy_value: u128,
    pub buy_twap: bool,
    pub buy_twap_time: u64,
    pub buy_twap_unit: TimeUnit,
    pub btd: bool,
    pub btd_type: MoveType,
    pub btd_value: u128,
    pub buy_dca_unit: DcaUnit,
    pub buy_dca_value: u128,

    // Sell trigger
    pub sell: bool,
    pub sell_type: TriggerType,
    pub sell_value: u128,
    /// Ceiling price (stable units). Reaching it sells the whole remaining
    /// position regardless of TWAP/rally throttling and completes the
    /// strategy. Zero disables.
    pub high_sell_value: u128,
    pub str_: bool,
    pub str_type: MoveType,
    pub str_value: u128,
    pub sell_twap: bool,
    pub sell_twap_time: u64,
    pub sell_twap_unit: TimeUnit,
    pub sell_dca_unit: DcaUnit,
    pub sell_dca_value: u128,
    pub complete_on_sell: bool,

    /// Baseline override selector for relative triggers.
    pub current_price: CurrentPriceSelector,
}

impl StrategyParameters {
    /// Seconds the buy-side TWAP throttle requires between tranches.
    pub fn buy_twap_interval_secs(&self) -> u64 {
        self.buy_twap_time.saturating_mul(self.buy_twap_unit.seconds())
    }

    /// Seconds the sell-side TWAP throttle requires between tranches.
    pub fn sell_twap_interval_secs(&self) -> u64 {
        self.sell_twap_time.saturating_mul(self.sell_twap_unit.seconds())
    }
}

// ─── Strategy record ─────────────────────────────────────────────────────────

/// Lifecycle status. Cancelled and Completed are terminal: every execution
/// and update against them fails, reads keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Active,
    Cancelled,
    Completed,
}

/// Highest oracle round pair (stable, invest) consumed by a dip/rally
/// attestation. `(0, 0)` means none consumed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsumedRounds {
    pub stable: u64,
    pub invest: u64,
}

/// The canonical per-strategy record held by the store. Mutated in place by
/// the execution engine on every successful trade; never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Strategy {
    pub id: u64,
    pub owner: Pubkey,
    pub invest_token: AssetId,
    pub stable_token: AssetId,
    pub parameters: StrategyParameters,
    pub status: StrategyStatus,

    /// Cumulative stable volume routed through the strategy: stable spent on
    /// buys plus stable received from sells.
    pub budget: u128,
    /// Realized profit/loss in stable units, updated at each completed sell.
    pub profit: i128,

    /// Entry price baseline for the invest position (8-dec USD). Set at
    /// creation when a position is escrowed, volume-weighted on buys.
    pub invest_price: u128,
    /// Reference price for a relative buy trigger, captured at creation.
    pub buy_baseline: u128,
    /// Reference price for a relative sell trigger, captured at creation.
    pub sell_baseline: u128,

    /// Round bookkeeping preventing dip attestations from being replayed.
    pub btd_rounds: ConsumedRounds,
    /// Round bookkeeping preventing rally attestations from being replayed.
    pub str_rounds: ConsumedRounds,

    /// Unix seconds of the last buy-side TWAP tranche (0 = never).
    pub buy_twap_executed_at: u64,
    /// Unix seconds of the last sell-side TWAP tranche (0 = never).
    pub sell_twap_executed_at: u64,

    pub created_at: u64,
    pub updated_at: u64,
}

impl Strategy {
    pub fn is_active(&self) -> bool {
        self.status == StrategyStatus::Active
    }
}

/// Fields a strategy owner may adjust after creation. Values only; the
/// structural shape (which triggers exist, their types) is immutable.
/// Toggle fields use set semantics: the supplied boolean is stored directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyUpdate {
    pub buy_value: Option<u128>,
    pub sell_value: Option<u128>,
    pub floor_value: Option<u128>,
    pub high_sell_value: Option<u128>,
    pub btd_value: Option<u128>,
    pub str_value: Option<u128>,
    pub buy_twap_time: Option<u64>,
    pub sell_twap_time: Option<u64>,
    pub buy_dca_value: Option<u128>,
    pub sell_dca_value: Option<u128>,
    pub slippage_bps: Option<u64>,
    pub liquidate_on_floor: Option<bool>,
    pub cancel_on_floor: Option<bool>,
    pub complete_on_sell: Option<bool>,
}
