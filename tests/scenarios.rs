//! End-to-end engine scenarios over the scenario feed, scenario DEX, and the
//! in-memory ledger: lifecycle, each execution kind, the gasless layer, and
//! the atomicity guarantees around rejected calls.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

use autostrat::auth::{self, op};
use autostrat::engine::Engine;
use autostrat::engine::RoundWindow;
use autostrat::engine::types::{
    DcaUnit, FloorType, MoveType, StrategyParameters, StrategyStatus, StrategyUpdate, TimeUnit,
    TriggerType,
};
use autostrat::error::EngineError;
use autostrat::oracle::{FeedRegistry, ScenarioFeed, now_secs};
use autostrat::swap::{ExecutorCall, ScenarioDex, SwapExecutor, TokenLedger};

const USD: u128 = 100_000_000;
const USDC: &str = "USDC";
const WETH: &str = "WETH";
const ONE_USDC: u128 = 1_000_000;
const ONE_WETH: u128 = 1_000_000_000_000_000_000;

struct Fixture {
    engine: Engine,
    ledger: Arc<TokenLedger>,
    usdc_feed: Arc<ScenarioFeed>,
    weth_feed: Arc<ScenarioFeed>,
    dex: Arc<ScenarioDex>,
    owner: Pubkey,
}

impl Fixture {
    fn new() -> Self {
        let feeds = Arc::new(FeedRegistry::new(3600));
        let ledger = Arc::new(TokenLedger::new());
        ledger.register_asset(USDC, 6);
        ledger.register_asset(WETH, 18);

        let usdc_feed = ScenarioFeed::new(USD);
        let weth_feed = ScenarioFeed::new(1500 * USD);
        feeds.register(USDC.into(), usdc_feed.clone());
        feeds.register(WETH.into(), weth_feed.clone());

        let dex = ScenarioDex::new(ledger.clone());
        dex.set_rate(USDC, USD);
        dex.set_rate(WETH, 1500 * USD);
        ledger.mint(WETH, dex.account(), 1_000 * ONE_WETH);
        ledger.mint(USDC, dex.account(), 10_000_000 * ONE_USDC);

        let engine = Engine::new(feeds, ledger.clone());
        engine.dexes().register("scenario", dex.clone());

        let owner = Pubkey::new_unique();
        ledger.mint(USDC, owner, 1_000_000 * ONE_USDC);
        ledger.mint(WETH, owner, 100 * ONE_WETH);

        Fixture { engine, ledger, usdc_feed, weth_feed, dex, owner }
    }

    fn fund_and_approve(&self, owner: Pubkey, params: &StrategyParameters) {
        self.ledger
            .approve(USDC, owner, self.engine.account(), params.stable_amount);
        self.ledger
            .approve(WETH, owner, self.engine.account(), params.invest_amount);
    }

    async fn create(&self, params: StrategyParameters) -> u64 {
        self.fund_and_approve(self.owner, &params);
        self.engine
            .create_strategy(self.owner, WETH.into(), USDC.into(), params)
            .await
            .unwrap()
    }

    /// Move both the oracle and the venue to `price` (8-dec USD).
    fn reprice_weth(&self, price: u128, round_id: u64) {
        self.weth_feed.set_price(price, round_id);
        self.dex.set_rate(WETH, price);
    }

    fn call(&self, from: &str, to: &str, amount_in: u128) -> ExecutorCall {
        ExecutorCall {
            dex: "scenario".into(),
            call_data: serde_json::json!({
                "from_token": from,
                "to_token": to,
                "amount_in": amount_in as u64,
                "trader": self.engine.account().to_string(),
            }),
        }
    }
}

fn buy_params(stable_amount: u128, buy_value: u128) -> StrategyParameters {
    StrategyParameters {
        stable_amount,
        slippage_bps: 1_000,
        buy: true,
        buy_type: TriggerType::FixedPrice,
        buy_value,
        ..Default::default()
    }
}

fn sell_params(invest_amount: u128, sell_value: u128) -> StrategyParameters {
    StrategyParameters {
        invest_amount,
        slippage_bps: 1_000,
        sell: true,
        sell_type: TriggerType::FixedPrice,
        sell_value,
        ..Default::default()
    }
}

// ── lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_escrows_funds_and_captures_entry() {
    let fx = Fixture::new();
    let before = fx.ledger.balance_of(USDC, fx.owner);

    let mut params = sell_params(2 * ONE_WETH, 1_600_000000);
    params.stable_amount = 3_000 * ONE_USDC;
    params.buy = true;
    params.buy_type = TriggerType::FixedPrice;
    params.buy_value = 1_400_000000;
    let id = fx.create(params).await;

    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.status, StrategyStatus::Active);
    assert_eq!(s.invest_price, 1500 * USD);
    assert_eq!(fx.ledger.balance_of(USDC, fx.owner), before - 3_000 * ONE_USDC);
    assert_eq!(fx.ledger.balance_of(USDC, fx.engine.account()), 3_000 * ONE_USDC);
    assert_eq!(fx.ledger.balance_of(WETH, fx.engine.account()), 2 * ONE_WETH);
}

#[tokio::test]
async fn create_rejects_invalid_bundles_without_escrow() {
    let fx = Fixture::new();
    let before = fx.ledger.balance_of(USDC, fx.owner);

    let mut params = buy_params(1_000 * ONE_USDC, 1_500_000000);
    params.btd = true;
    params.btd_type = MoveType::Percent;
    params.btd_value = 500;
    params.buy_twap = true;
    params.buy_twap_time = 1;
    params.buy_twap_unit = TimeUnit::Hours;
    params.buy_dca_unit = DcaUnit::Fixed;
    params.buy_dca_value = 100 * ONE_USDC;

    fx.fund_and_approve(fx.owner, &params);
    let err = fx
        .engine
        .create_strategy(fx.owner, WETH.into(), USDC.into(), params)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameters(_)));
    assert_eq!(fx.ledger.balance_of(USDC, fx.owner), before);
    assert_eq!(fx.engine.strategy_count(), 0);
}

#[tokio::test]
async fn update_sets_values_and_revalidates() {
    let fx = Fixture::new();
    let mut params = buy_params(1_000 * ONE_USDC, 1_500_000000);
    params.floor = true;
    params.floor_type = FloorType::FixedPrice;
    params.floor_value = 1_200_000000;
    let id = fx.create(params).await;

    fx.engine
        .update_strategy(
            fx.owner,
            id,
            StrategyUpdate {
                buy_value: Some(1_450_000000),
                cancel_on_floor: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.parameters.buy_value, 1_450_000000);
    assert!(s.parameters.cancel_on_floor);

    // Zeroing the floor value while the floor is enabled breaks the bundle.
    let err = fx
        .engine
        .update_strategy(
            fx.owner,
            id,
            StrategyUpdate { floor_value: Some(0), ..Default::default() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameters(_)));

    let stranger = Pubkey::new_unique();
    let err = fx
        .engine
        .update_strategy(stranger, id, StrategyUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn cancel_refunds_and_blocks_everything_after() {
    let fx = Fixture::new();
    let params = sell_params(3 * ONE_WETH, 1_600_000000);
    let id = fx.create(params).await;
    let weth_before = fx.ledger.balance_of(WETH, fx.owner);

    fx.engine.cancel_strategy(fx.owner, id).await.unwrap();
    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.status, StrategyStatus::Cancelled);
    assert_eq!(fx.ledger.balance_of(WETH, fx.owner), weth_before + 3 * ONE_WETH);

    let err = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let err = fx
        .engine
        .update_strategy(fx.owner, id, StrategyUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

// ── buy side ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn buy_scenario_slippage_leg_fails_then_recovers() {
    let fx = Fixture::new();
    let id = fx.create(buy_params(3_000 * ONE_USDC, 1_500_000000)).await;
    let escrow_before = fx.ledger.balance_of(USDC, fx.engine.account());

    // Venue quotes 1200 throughout; only the oracle moves.
    fx.dex.set_rate(WETH, 1200 * USD);

    // At an oracle price of 900 the 1200 fill sits far outside the band,
    // even though the 1500 buy target itself is met.
    fx.weth_feed.set_price(900 * USD, 2);
    let err = fx
        .engine
        .execute_buy(id, fx.call(USDC, WETH, 3_000 * ONE_USDC))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlippageExceeded { .. }));
    // Rejected call leaves no trace on the ledger or the record.
    assert_eq!(fx.ledger.balance_of(USDC, fx.engine.account()), escrow_before);
    assert_eq!(fx.ledger.balance_of(WETH, fx.engine.account()), 0);
    assert_eq!(fx.engine.get_strategy(id).unwrap().budget, 0);

    // Oracle back at the venue rate: the same call clears.
    fx.weth_feed.set_price(1200 * USD, 3);
    let report = fx
        .engine
        .execute_buy(id, fx.call(USDC, WETH, 3_000 * ONE_USDC))
        .await
        .unwrap();
    assert_eq!(report.spent, 3_000 * ONE_USDC);
    assert_eq!(report.received, 2_500_000_000_000_000_000);

    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.parameters.stable_amount, 0);
    assert_eq!(s.parameters.invest_amount, 2_500_000_000_000_000_000);
    assert_eq!(s.budget, 3_000 * ONE_USDC);
    assert_eq!(s.invest_price, 1200 * USD);
}

#[tokio::test]
async fn buy_above_target_is_rejected() {
    let fx = Fixture::new();
    let id = fx.create(buy_params(1_000 * ONE_USDC, 1_400_000000)).await;
    // Live 1500 > target 1400.
    let err = fx
        .engine
        .execute_buy(id, fx.call(USDC, WETH, 1_000 * ONE_USDC))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PriceConditionNotMet(_)));
}

#[tokio::test]
async fn buy_dca_cap_limits_one_call() {
    let fx = Fixture::new();
    let mut params = buy_params(3_000 * ONE_USDC, 1_500_000000);
    params.buy_dca_unit = DcaUnit::Fixed;
    params.buy_dca_value = 900 * ONE_USDC;
    let id = fx.create(params).await;

    let report = fx
        .engine
        .execute_buy(id, fx.call(USDC, WETH, 900 * ONE_USDC))
        .await
        .unwrap();
    assert_eq!(report.spent, 900 * ONE_USDC);
    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.parameters.stable_amount, 2_100 * ONE_USDC);
}

#[tokio::test]
async fn relative_triggers_track_the_creation_baseline() {
    let fx = Fixture::new();
    let params = StrategyParameters {
        stable_amount: 1_300 * ONE_USDC,
        invest_amount: ONE_WETH,
        slippage_bps: 1_000,
        buy: true,
        buy_type: TriggerType::CurrentPricePercent,
        buy_value: 1_000,
        sell: true,
        sell_type: TriggerType::CurrentPricePercent,
        sell_value: 1_000,
        ..Default::default()
    };
    let id = fx.create(params).await;
    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.buy_baseline, 1500 * USD);
    assert_eq!(s.sell_baseline, 1500 * USD);

    // 1400 is not yet 10% below the 1500 baseline.
    fx.reprice_weth(1400 * USD, 2);
    let err = fx
        .engine
        .execute_buy(id, fx.call(USDC, WETH, 1_300 * ONE_USDC))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PriceConditionNotMet(_)));

    fx.reprice_weth(1300 * USD, 3);
    let report = fx
        .engine
        .execute_buy(id, fx.call(USDC, WETH, 1_300 * ONE_USDC))
        .await
        .unwrap();
    assert_eq!(report.received, ONE_WETH);

    // The sell side gates on 10% above the same baseline.
    let err = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, 2 * ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PriceConditionNotMet(_)));

    fx.reprice_weth(1650 * USD, 4);
    let report = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, 2 * ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.received, 3_300 * ONE_USDC);
    let s = fx.engine.get_strategy(id).unwrap();
    // Entries at 1500 and 1300 blend to 1400 across the two units.
    assert_eq!(s.profit, 500 * ONE_USDC as i128);
}

#[tokio::test]
async fn stale_feed_blocks_execution() {
    let fx = Fixture::new();
    let id = fx.create(buy_params(1_000 * ONE_USDC, 1_500_000000)).await;
    fx.weth_feed.age_latest(now_secs() - 7_200);
    let err = fx
        .engine
        .execute_buy(id, fx.call(USDC, WETH, 1_000 * ONE_USDC))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StalePrice(_)));
}

// ── sell side ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sell_books_profit_against_entry_and_completes() {
    let fx = Fixture::new();
    let mut params = sell_params(ONE_WETH, 1_800_000000);
    params.complete_on_sell = true;
    let id = fx.create(params).await;
    let usdc_before = fx.ledger.balance_of(USDC, fx.owner);

    fx.reprice_weth(2000 * USD, 2);
    let report = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.received, 2_000 * ONE_USDC);
    assert_eq!(report.status, StrategyStatus::Completed);

    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.budget, 2_000 * ONE_USDC);
    // Entry was 1500: one unit sold at 2000 realizes 500 in stable terms.
    assert_eq!(s.profit, 500 * ONE_USDC as i128);
    // Completion returns the proceeds to the owner.
    assert_eq!(fx.ledger.balance_of(USDC, fx.owner), usdc_before + 2_000 * ONE_USDC);
    assert_eq!(fx.ledger.balance_of(WETH, fx.engine.account()), 0);
}

#[tokio::test]
async fn sell_below_target_is_rejected() {
    let fx = Fixture::new();
    let id = fx.create(sell_params(ONE_WETH, 1_800_000000)).await;
    let err = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PriceConditionNotMet(_)));
}

#[tokio::test]
async fn high_sell_ceiling_overrides_twap_and_completes() {
    let fx = Fixture::new();
    let mut params = sell_params(2 * ONE_WETH, 1_800_000000);
    params.sell_twap = true;
    params.sell_twap_time = 1;
    params.sell_twap_unit = TimeUnit::Hours;
    params.sell_dca_unit = DcaUnit::Percent;
    params.sell_dca_value = 5_000;
    params.high_sell_value = 2_500_000000;
    let id = fx.create(params).await;

    // Below the ceiling the plain sell operation is off-limits.
    fx.reprice_weth(2000 * USD, 2);
    let err = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, 2 * ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    // At the ceiling the whole position goes in one call.
    fx.reprice_weth(2600 * USD, 3);
    let report = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, 2 * ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.spent, 2 * ONE_WETH);
    assert_eq!(report.status, StrategyStatus::Completed);
    assert_eq!(fx.engine.get_strategy(id).unwrap().parameters.invest_amount, 0);
}

#[tokio::test]
async fn ceiling_sell_rejects_partial_fills() {
    let fx = Fixture::new();
    let mut params = sell_params(2 * ONE_WETH, 1_800_000000);
    params.sell_twap = true;
    params.sell_twap_time = 1;
    params.sell_twap_unit = TimeUnit::Hours;
    params.sell_dca_unit = DcaUnit::Percent;
    params.sell_dca_value = 5_000;
    params.high_sell_value = 2_500_000000;
    let id = fx.create(params).await;

    // Calldata selling half the position cannot satisfy the ceiling sale.
    fx.reprice_weth(2600 * USD, 2);
    let err = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExecutorMismatch(_)));
    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.status, StrategyStatus::Active);
    assert_eq!(s.parameters.invest_amount, 2 * ONE_WETH);
    assert_eq!(fx.ledger.balance_of(WETH, fx.engine.account()), 2 * ONE_WETH);

    let report = fx
        .engine
        .execute_sell(id, fx.call(WETH, USDC, 2 * ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.spent, 2 * ONE_WETH);
    assert_eq!(report.status, StrategyStatus::Completed);
}

#[tokio::test]
async fn sell_twap_throttles_between_tranches() {
    let fx = Fixture::new();
    let mut params = sell_params(2 * ONE_WETH, 1_400_000000);
    params.sell_twap = true;
    params.sell_twap_time = 1;
    params.sell_twap_unit = TimeUnit::Hours;
    params.sell_dca_unit = DcaUnit::Percent;
    params.sell_dca_value = 5_000;
    let id = fx.create(params).await;

    // Live 1500 is above the 1400 target, so the first tranche trades.
    let report = fx
        .engine
        .execute_sell_twap(id, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.spent, ONE_WETH);

    let err = fx
        .engine
        .execute_sell_twap(id, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ThrottleNotElapsed(_)));
}

// ── dip / rally windows ──────────────────────────────────────────────────────

fn seed_window(fx: &Fixture, lo_price: u128, hi_price: u128) -> RoundWindow {
    let now = now_secs();
    fx.usdc_feed.set_round(10, USD, now - 300);
    fx.usdc_feed.set_round(11, USD, now - 100);
    fx.weth_feed.set_round(10, lo_price, now - 300);
    fx.weth_feed.set_round(11, hi_price, now - 100);
    RoundWindow { stable_lo: 10, invest_lo: 10, stable_hi: 11, invest_hi: 11 }
}

#[tokio::test]
async fn btd_buys_on_attested_drop_and_consumes_rounds() {
    let fx = Fixture::new();
    let mut params = buy_params(3_000 * ONE_USDC, 1_500_000000);
    params.btd = true;
    params.btd_type = MoveType::Percent;
    params.btd_value = 500;
    params.buy_dca_unit = DcaUnit::Fixed;
    params.buy_dca_value = 1_000 * ONE_USDC;
    let id = fx.create(params).await;

    // 1500 → 1400 is a 6.7% drop, above the 5% threshold.
    let window = seed_window(&fx, 1500 * USD, 1400 * USD);
    fx.reprice_weth(1400 * USD, 12);

    let report = fx
        .engine
        .execute_btd(id, window, fx.call(USDC, WETH, 1_000 * ONE_USDC))
        .await
        .unwrap();
    assert_eq!(report.spent, 1_000 * ONE_USDC);

    // The same attestation cannot be spent twice.
    let err = fx
        .engine
        .execute_btd(id, window, fx.call(USDC, WETH, 1_000 * ONE_USDC))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoundInconsistent(_)));
}

#[tokio::test]
async fn btd_rejects_backward_window_and_weak_drop() {
    let fx = Fixture::new();
    let mut params = buy_params(3_000 * ONE_USDC, 1_500_000000);
    params.btd = true;
    params.btd_type = MoveType::Percent;
    params.btd_value = 500;
    params.buy_dca_unit = DcaUnit::Fixed;
    params.buy_dca_value = 1_000 * ONE_USDC;
    let id = fx.create(params).await;
    fx.reprice_weth(1400 * USD, 12);

    // High rounds predating the low rounds.
    let backward = {
        let w = seed_window(&fx, 1500 * USD, 1400 * USD);
        RoundWindow { stable_lo: w.stable_hi, invest_lo: w.invest_hi, stable_hi: w.stable_lo, invest_hi: w.invest_lo }
    };
    let err = fx
        .engine
        .execute_btd(id, backward, fx.call(USDC, WETH, 1_000 * ONE_USDC))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoundInconsistent(_)));

    // A 1% drift does not clear a 5% threshold.
    let weak = seed_window(&fx, 1500 * USD, 1485 * USD);
    let err = fx
        .engine
        .execute_btd(id, weak, fx.call(USDC, WETH, 1_000 * ONE_USDC))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoundInconsistent(_)));
}

#[tokio::test]
async fn str_sells_on_attested_rise() {
    let fx = Fixture::new();
    let mut params = sell_params(2 * ONE_WETH, 1_400_000000);
    params.str_ = true;
    params.str_type = MoveType::Percent;
    params.str_value = 500;
    params.sell_dca_unit = DcaUnit::Percent;
    params.sell_dca_value = 5_000;
    let id = fx.create(params).await;

    // A drop is the wrong direction for a rally.
    let falling = seed_window(&fx, 1500 * USD, 1400 * USD);
    fx.reprice_weth(1600 * USD, 12);
    let err = fx
        .engine
        .execute_str(id, falling, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoundInconsistent(_)));

    let rising = seed_window(&fx, 1500 * USD, 1600 * USD);
    let report = fx
        .engine
        .execute_str(id, rising, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.spent, ONE_WETH);
    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.str_rounds.invest, 11);
}

#[tokio::test]
async fn rally_fixed_thresholds_gate_the_window() {
    let fx = Fixture::new();
    let window = seed_window(&fx, 1500 * USD, 1600 * USD);
    fx.reprice_weth(1600 * USD, 12);

    // Absolute movement: the rise between the rounds must reach the value.
    let mut params = sell_params(2 * ONE_WETH, 1_400_000000);
    params.str_ = true;
    params.str_type = MoveType::FixedAmount;
    params.str_value = 150 * USD;
    params.sell_dca_unit = DcaUnit::Percent;
    params.sell_dca_value = 5_000;
    let id = fx.create(params).await;

    let err = fx
        .engine
        .execute_str(id, window, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoundInconsistent(_)));

    fx.engine
        .update_strategy(
            fx.owner,
            id,
            StrategyUpdate { str_value: Some(80 * USD), ..Default::default() },
        )
        .await
        .unwrap();
    let report = fx
        .engine
        .execute_str(id, window, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.spent, ONE_WETH);

    // Absolute level: the high round itself must clear the mark.
    let mut params = sell_params(2 * ONE_WETH, 1_400_000000);
    params.str_ = true;
    params.str_type = MoveType::FixedPrice;
    params.str_value = 1_650_000000;
    params.sell_dca_unit = DcaUnit::Percent;
    params.sell_dca_value = 5_000;
    let id2 = fx.create(params).await;

    let err = fx
        .engine
        .execute_str(id2, window, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoundInconsistent(_)));

    fx.engine
        .update_strategy(
            fx.owner,
            id2,
            StrategyUpdate { str_value: Some(1_550_000000), ..Default::default() },
        )
        .await
        .unwrap();
    let report = fx
        .engine
        .execute_str(id2, window, fx.call(WETH, USDC, ONE_WETH))
        .await
        .unwrap();
    assert_eq!(report.spent, ONE_WETH);
}

// ── floor ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn floor_cancel_refunds_and_fires_once() {
    let fx = Fixture::new();
    let mut params = sell_params(2 * ONE_WETH, 1_800_000000);
    params.floor = true;
    params.floor_type = FloorType::FixedPrice;
    params.floor_value = 1_200_000000;
    params.cancel_on_floor = true;
    let id = fx.create(params).await;
    let weth_before = fx.ledger.balance_of(WETH, fx.owner);

    // Above the floor nothing fires.
    let err = fx.engine.execute_floor(id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::PriceConditionNotMet(_)));

    fx.reprice_weth(1100 * USD, 2);
    let report = fx.engine.execute_floor(id, None).await.unwrap();
    assert_eq!(report.status, StrategyStatus::Cancelled);
    assert_eq!(fx.ledger.balance_of(WETH, fx.owner), weth_before + 2 * ONE_WETH);

    let err = fx.engine.execute_floor(id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn floor_liquidation_sells_position_and_returns_proceeds() {
    let fx = Fixture::new();
    let mut params = sell_params(ONE_WETH, 1_800_000000);
    params.floor = true;
    params.floor_type = FloorType::PercentDrop;
    params.floor_value = 2_000; // 20% below the 1500 entry
    params.liquidate_on_floor = true;
    let id = fx.create(params).await;
    let usdc_before = fx.ledger.balance_of(USDC, fx.owner);

    fx.reprice_weth(1100 * USD, 2);
    let report = fx
        .engine
        .execute_floor(id, Some(fx.call(WETH, USDC, ONE_WETH)))
        .await
        .unwrap();
    assert_eq!(report.spent, ONE_WETH);
    assert_eq!(report.status, StrategyStatus::Completed);

    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.profit, -(400 * ONE_USDC as i128));
    assert_eq!(fx.ledger.balance_of(USDC, fx.owner), usdc_before + 1_100 * ONE_USDC);
}

#[tokio::test]
async fn floor_liquidation_rejects_partial_fills() {
    let fx = Fixture::new();
    let mut params = sell_params(ONE_WETH, 1_800_000000);
    params.floor = true;
    params.floor_type = FloorType::PercentDrop;
    params.floor_value = 2_000;
    params.liquidate_on_floor = true;
    let id = fx.create(params).await;

    // Calldata selling a sliver must not close out the stop.
    fx.reprice_weth(1100 * USD, 2);
    let err = fx
        .engine
        .execute_floor(id, Some(fx.call(WETH, USDC, 1_000_000_000_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExecutorMismatch(_)));
    let s = fx.engine.get_strategy(id).unwrap();
    assert_eq!(s.status, StrategyStatus::Active);
    assert_eq!(s.parameters.invest_amount, ONE_WETH);
    assert_eq!(fx.ledger.balance_of(WETH, fx.engine.account()), ONE_WETH);

    let report = fx
        .engine
        .execute_floor(id, Some(fx.call(WETH, USDC, ONE_WETH)))
        .await
        .unwrap();
    assert_eq!(report.spent, ONE_WETH);
    assert_eq!(report.status, StrategyStatus::Completed);
}

#[tokio::test]
async fn fixed_loss_floor_fires_on_drawdown() {
    let fx = Fixture::new();
    let params = StrategyParameters {
        invest_amount: ONE_WETH,
        slippage_bps: 1_000,
        floor: true,
        floor_type: FloorType::FixedLoss,
        floor_value: 150 * ONE_USDC,
        ..Default::default()
    };
    let id = fx.create(params).await;
    let weth_before = fx.ledger.balance_of(WETH, fx.owner);

    // A 100-stable drawdown on the 1500 entry stays under the threshold.
    fx.reprice_weth(1400 * USD, 2);
    let err = fx.engine.execute_floor(id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::PriceConditionNotMet(_)));

    // At 1300 the unrealized loss is 200 stable and the floor fires.
    fx.reprice_weth(1300 * USD, 3);
    let report = fx.engine.execute_floor(id, None).await.unwrap();
    assert_eq!(report.status, StrategyStatus::Completed);
    assert_eq!(fx.ledger.balance_of(WETH, fx.owner), weth_before + ONE_WETH);
}

// ── gasless layer ────────────────────────────────────────────────────────────

#[tokio::test]
async fn relayed_create_consumes_nonce_and_rejects_replay() {
    let fx = Fixture::new();
    let keypair = Keypair::new();
    let owner = keypair.pubkey();
    fx.ledger.mint(USDC, owner, 10_000 * ONE_USDC);

    let params = buy_params(1_000 * ONE_USDC, 1_500_000000);
    fx.fund_and_approve(owner, &params);

    let nonce = fx.engine.nonce_of(&owner);
    assert_eq!(nonce, 0);
    let digest =
        auth::message_hash(op::CREATE, &(WETH, USDC, &params), nonce, &owner).unwrap();
    let signature = keypair.sign_message(digest.as_ref());

    let id = fx
        .engine
        .create_strategy_on_behalf(owner, nonce, signature, WETH.into(), USDC.into(), params.clone())
        .await
        .unwrap();
    assert_eq!(fx.engine.get_strategy(id).unwrap().owner, owner);
    assert_eq!(fx.engine.nonce_of(&owner), 1);

    fx.fund_and_approve(owner, &params);
    let err = fx
        .engine
        .create_strategy_on_behalf(owner, nonce, signature, WETH.into(), USDC.into(), params)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn relayed_cancel_requires_the_owners_key() {
    let fx = Fixture::new();
    let keypair = Keypair::new();
    let owner = keypair.pubkey();
    fx.ledger.mint(USDC, owner, 10_000 * ONE_USDC);

    let params = buy_params(1_000 * ONE_USDC, 1_500_000000);
    fx.fund_and_approve(owner, &params);
    let id = fx
        .engine
        .create_strategy(owner, WETH.into(), USDC.into(), params)
        .await
        .unwrap();

    let nonce = fx.engine.nonce_of(&owner);
    let digest = auth::message_hash(op::CANCEL, &id, nonce, &owner).unwrap();

    let intruder = Keypair::new();
    let forged = intruder.sign_message(digest.as_ref());
    let err = fx
        .engine
        .cancel_strategy_on_behalf(owner, nonce, forged, id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
    assert_eq!(fx.engine.get_strategy(id).unwrap().status, StrategyStatus::Active);

    let genuine = keypair.sign_message(digest.as_ref());
    fx.engine
        .cancel_strategy_on_behalf(owner, nonce, genuine, id)
        .await
        .unwrap();
    assert_eq!(
        fx.engine.get_strategy(id).unwrap().status,
        StrategyStatus::Cancelled
    );
}

#[tokio::test]
async fn relayed_update_signature_covers_the_payload() {
    let fx = Fixture::new();
    let keypair = Keypair::new();
    let owner = keypair.pubkey();
    fx.ledger.mint(USDC, owner, 10_000 * ONE_USDC);

    let params = buy_params(1_000 * ONE_USDC, 1_500_000000);
    fx.fund_and_approve(owner, &params);
    let id = fx
        .engine
        .create_strategy(owner, WETH.into(), USDC.into(), params)
        .await
        .unwrap();

    let update = StrategyUpdate { buy_value: Some(1_450_000000), ..Default::default() };
    let nonce = fx.engine.nonce_of(&owner);
    let digest = auth::message_hash(op::UPDATE, &(id, &update), nonce, &owner).unwrap();
    let signature = keypair.sign_message(digest.as_ref());

    // The signed values cannot be swapped out in flight.
    let tampered = StrategyUpdate { buy_value: Some(100), ..Default::default() };
    let err = fx
        .engine
        .update_strategy_on_behalf(owner, nonce, signature, id, tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    fx.engine
        .update_strategy_on_behalf(owner, nonce, signature, id, update)
        .await
        .unwrap();
    assert_eq!(
        fx.engine.get_strategy(id).unwrap().parameters.buy_value,
        1_450_000000
    );
}
