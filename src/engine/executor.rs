//! The seven execution operations.
//!
//! Every operation follows the same shape: load the Active record, check the
//! trigger it serves, pull a fresh price pair, authorize the swap adapter
//! for an exact input amount, measure what actually moved on the ledger, and
//! only then mutate the record. Any failure after the adapter ran restores
//! the touched ledger cells, so a rejected call is indistinguishable from one
//! that never happened.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::pricing;
use crate::engine::Engine;
use crate::engine::types::{
    BPS_DENOMINATOR, ConsumedRounds, FloorType, MoveType, PRICE_SCALE, Strategy, StrategyStatus,
    TriggerType,
};
use crate::error::{EngineError, Result};
use crate::oracle::{PricePoint, now_secs};
use crate::swap::{ExecutorCall, LedgerCheckpoint};

/// Oracle round pair attesting a dip or rally: low (earlier) and high
/// (later) round ids for both feeds of the pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoundWindow {
    pub stable_lo: u64,
    pub invest_lo: u64,
    pub stable_hi: u64,
    pub invest_hi: u64,
}

/// What a successful execution did, echoed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub id: u64,
    pub spent: u128,
    pub received: u128,
    pub status: StrategyStatus,
}

/// Fresh price pair plus the decimals needed for unit conversions.
struct Quote {
    stable: PricePoint,
    invest: PricePoint,
    stable_decimals: u8,
    invest_decimals: u8,
}

struct SwapOutcome {
    spent: u128,
    received: u128,
    checkpoint: LedgerCheckpoint,
}

fn not_active(id: u64) -> EngineError {
    EngineError::InvalidState(format!("strategy {id} is not active"))
}

fn trigger_off(what: &str) -> EngineError {
    EngineError::InvalidState(format!("{what} is not enabled"))
}

fn as_bps(value: u128, ctx: &'static str) -> Result<u64> {
    u64::try_from(value).map_err(|_| EngineError::Arithmetic(ctx))
}

fn as_i128(value: u128, ctx: &'static str) -> Result<i128> {
    i128::try_from(value).map_err(|_| EngineError::Arithmetic(ctx))
}

impl Engine {
    fn load_active(&self, id: u64) -> Result<Strategy> {
        let strategy = self.store.get(id)?;
        if !strategy.is_active() {
            return Err(not_active(id));
        }
        Ok(strategy)
    }

    async fn quote(&self, strategy: &Strategy) -> Result<Quote> {
        Ok(Quote {
            stable: self.feeds.fresh_price(&strategy.stable_token).await?,
            invest: self.feeds.fresh_price(&strategy.invest_token).await?,
            stable_decimals: self.ledger.decimals(&strategy.stable_token)?,
            invest_decimals: self.ledger.decimals(&strategy.invest_token)?,
        })
    }

    /// Target price (8-dec USD) the invest asset must be at or below.
    fn buy_target(&self, strategy: &Strategy, quote: &Quote) -> Result<u128> {
        let p = &strategy.parameters;
        match p.buy_type {
            TriggerType::FixedPrice => {
                pricing::stable_units_to_usd(p.buy_value, quote.stable.price, quote.stable_decimals)
            }
            TriggerType::CurrentPricePercent => pricing::bps_below(
                strategy.buy_baseline,
                as_bps(p.buy_value, "buy_target")?,
                "buy_target",
            ),
            TriggerType::Unset => Err(trigger_off("buy trigger")),
        }
    }

    /// Target price (8-dec USD) the invest asset must be at or above.
    fn sell_target(&self, strategy: &Strategy, quote: &Quote) -> Result<u128> {
        let p = &strategy.parameters;
        match p.sell_type {
            TriggerType::FixedPrice => pricing::stable_units_to_usd(
                p.sell_value,
                quote.stable.price,
                quote.stable_decimals,
            ),
            TriggerType::CurrentPricePercent => pricing::bps_above(
                strategy.sell_baseline,
                as_bps(p.sell_value, "sell_target")?,
                "sell_target",
            ),
            TriggerType::Unset => Err(trigger_off("sell trigger")),
        }
    }

    fn check_buy_price(&self, strategy: &Strategy, quote: &Quote) -> Result<()> {
        let target = self.buy_target(strategy, quote)?;
        if quote.invest.price > target {
            return Err(EngineError::PriceConditionNotMet(format!(
                "invest price {} above buy target {target}",
                quote.invest.price
            )));
        }
        Ok(())
    }

    fn check_sell_price(&self, strategy: &Strategy, quote: &Quote) -> Result<()> {
        let target = self.sell_target(strategy, quote)?;
        if quote.invest.price < target {
            return Err(EngineError::PriceConditionNotMet(format!(
                "invest price {} below sell target {target}",
                quote.invest.price
            )));
        }
        Ok(())
    }

    /// Authorize, run, and audit one swap through the resolved adapter.
    /// Returns the measured input/output amounts plus the checkpoint the
    /// caller restores if a later step fails.
    async fn run_swap(
        &self,
        from: &str,
        to: &str,
        amount_in: u128,
        from_price: u128,
        to_price: u128,
        max_bps: u64,
        call: &ExecutorCall,
    ) -> Result<SwapOutcome> {
        if amount_in == 0 {
            return Err(EngineError::InvalidState("nothing left to trade".into()));
        }
        let adapter = self.dexes.resolve(&call.dex)?;
        let spender = adapter.account();
        let from_decimals = self.ledger.decimals(from)?;
        let to_decimals = self.ledger.decimals(to)?;

        let checkpoint = self.ledger.checkpoint(&[
            (from, self.account),
            (to, self.account),
            (from, spender),
            (to, spender),
        ]);
        let before_from = self.ledger.balance_of(from, self.account);
        let before_to = self.ledger.balance_of(to, self.account);
        self.ledger.approve(from, self.account, spender, amount_in);

        let audited: Result<(u128, u128)> = async {
            let declared = adapter.swap(&call.call_data).await?;
            let after_from = self.ledger.balance_of(from, self.account);
            let after_to = self.ledger.balance_of(to, self.account);
            if after_from > before_from {
                return Err(EngineError::ExecutorMismatch("input balance grew".into()));
            }
            let spent = before_from - after_from;
            // Exact fill required: the engine sized this tranche, calldata
            // cannot shrink it.
            if spent != amount_in {
                return Err(EngineError::ExecutorMismatch(format!(
                    "adapter consumed {spent}, authorized {amount_in}"
                )));
            }
            let received = after_to.checked_sub(before_to).ok_or_else(|| {
                EngineError::ExecutorMismatch("output balance shrank".into())
            })?;
            if received == 0 || received != declared {
                return Err(EngineError::ExecutorMismatch(format!(
                    "adapter declared {declared}, ledger shows {received}"
                )));
            }
            let implied = pricing::implied_amount_out(
                spent,
                from_price,
                to_price,
                from_decimals,
                to_decimals,
            )?;
            pricing::check_slippage(implied, received, max_bps)?;
            Ok((spent, received))
        }
        .await;

        self.ledger.approve(from, self.account, spender, 0);
        match audited {
            Ok((spent, received)) => Ok(SwapOutcome { spent, received, checkpoint }),
            Err(e) => {
                self.ledger.restore(&checkpoint);
                Err(e)
            }
        }
    }

    fn commit_or_restore(
        &self,
        strategy: Strategy,
        outcome: &SwapOutcome,
        applied: Result<()>,
    ) -> Result<ExecutionReport> {
        match applied {
            Ok(()) => {
                let report = ExecutionReport {
                    id: strategy.id,
                    spent: outcome.spent,
                    received: outcome.received,
                    status: strategy.status,
                };
                self.store.save(strategy);
                Ok(report)
            }
            Err(e) => {
                self.ledger.restore(&outcome.checkpoint);
                Err(e)
            }
        }
    }

    // ── buy side ─────────────────────────────────────────────────────────

    pub async fn execute_buy(&self, id: u64, call: ExecutorCall) -> Result<ExecutionReport> {
        let _tx = self.tx_guard.lock().await;
        let mut strategy = self.load_active(id)?;
        let p = &strategy.parameters;
        if !p.buy {
            return Err(trigger_off("buy trigger"));
        }
        if p.buy_twap || p.btd {
            return Err(EngineError::InvalidState(
                "buy side runs through its TWAP or dip operation".into(),
            ));
        }
        let quote = self.quote(&strategy).await?;
        self.check_buy_price(&strategy, &quote)?;
        let spend = pricing::dca_slice(p.stable_amount, p.buy_dca_unit, p.buy_dca_value)?;
        let outcome = self.swap_buy(&strategy, &quote, spend, &call).await?;

        let applied = apply_buy(&mut strategy, &outcome, quote.invest.price)
            .map(|_| strategy.updated_at = now_secs());
        let report = self.commit_or_restore(strategy, &outcome, applied)?;
        info!(id, spent = report.spent, received = report.received, "buy executed");
        Ok(report)
    }

    pub async fn execute_buy_twap(&self, id: u64, call: ExecutorCall) -> Result<ExecutionReport> {
        let _tx = self.tx_guard.lock().await;
        let mut strategy = self.load_active(id)?;
        let p = &strategy.parameters;
        if !p.buy || !p.buy_twap {
            return Err(trigger_off("buy TWAP"));
        }
        let now = now_secs();
        let interval = p.buy_twap_interval_secs();
        let elapsed = now.saturating_sub(strategy.buy_twap_executed_at);
        if strategy.buy_twap_executed_at != 0 && elapsed < interval {
            return Err(EngineError::ThrottleNotElapsed(format!(
                "{elapsed}s since last tranche, interval is {interval}s"
            )));
        }
        let quote = self.quote(&strategy).await?;
        self.check_buy_price(&strategy, &quote)?;
        let spend = pricing::dca_slice(p.stable_amount, p.buy_dca_unit, p.buy_dca_value)?;
        let outcome = self.swap_buy(&strategy, &quote, spend, &call).await?;

        let applied = apply_buy(&mut strategy, &outcome, quote.invest.price).map(|_| {
            strategy.buy_twap_executed_at = now;
            strategy.updated_at = now;
        });
        let report = self.commit_or_restore(strategy, &outcome, applied)?;
        info!(id, spent = report.spent, "buy TWAP tranche executed");
        Ok(report)
    }

    pub async fn execute_btd(
        &self,
        id: u64,
        window: RoundWindow,
        call: ExecutorCall,
    ) -> Result<ExecutionReport> {
        let _tx = self.tx_guard.lock().await;
        let mut strategy = self.load_active(id)?;
        let p = &strategy.parameters;
        if !p.buy || !p.btd {
            return Err(trigger_off("buy-the-dip"));
        }
        let quote = self.quote(&strategy).await?;

        let (lo, hi) = self.window_prices(&strategy, &window).await?;
        if window.stable_hi <= strategy.btd_rounds.stable
            || window.invest_hi <= strategy.btd_rounds.invest
        {
            return Err(EngineError::RoundInconsistent(
                "rounds at or below the last consumed pair".into(),
            ));
        }
        check_movement(lo, hi, p.btd_type, p.btd_value, quote.stable_decimals, false)?;
        self.check_buy_price(&strategy, &quote)?;

        let spend = pricing::dca_slice(p.stable_amount, p.buy_dca_unit, p.buy_dca_value)?;
        let outcome = self.swap_buy(&strategy, &quote, spend, &call).await?;

        let applied = apply_buy(&mut strategy, &outcome, quote.invest.price).map(|_| {
            strategy.btd_rounds = ConsumedRounds {
                stable: window.stable_hi,
                invest: window.invest_hi,
            };
            strategy.updated_at = now_secs();
        });
        let report = self.commit_or_restore(strategy, &outcome, applied)?;
        info!(id, spent = report.spent, "dip buy executed");
        Ok(report)
    }

    // ── sell side ────────────────────────────────────────────────────────

    pub async fn execute_sell(&self, id: u64, call: ExecutorCall) -> Result<ExecutionReport> {
        let _tx = self.tx_guard.lock().await;
        let mut strategy = self.load_active(id)?;
        let p = &strategy.parameters;
        if !p.sell {
            return Err(trigger_off("sell trigger"));
        }
        let quote = self.quote(&strategy).await?;

        // Ceiling check first: reaching it overrides TWAP/rally throttling
        // and liquidates the whole position.
        let ceiling_hit = if p.high_sell_value > 0 {
            let ceiling = pricing::stable_units_to_usd(
                p.high_sell_value,
                quote.stable.price,
                quote.stable_decimals,
            )?;
            quote.invest.price >= ceiling
        } else {
            false
        };
        if (p.sell_twap || p.str_) && !ceiling_hit {
            return Err(EngineError::InvalidState(
                "sell side runs through its TWAP or rally operation".into(),
            ));
        }
        if !ceiling_hit {
            self.check_sell_price(&strategy, &quote)?;
        }

        let amount = if ceiling_hit {
            p.invest_amount
        } else {
            pricing::dca_slice(p.invest_amount, p.sell_dca_unit, p.sell_dca_value)?
        };
        let outcome = self.swap_sell(&strategy, &quote, amount, &call).await?;

        let applied = apply_sell(&mut strategy, &outcome, &quote).and_then(|_| {
            strategy.updated_at = now_secs();
            if ceiling_hit {
                self.finish(&mut strategy, StrategyStatus::Completed)?;
            } else if strategy.parameters.invest_amount == 0
                && strategy.parameters.complete_on_sell
            {
                self.finish(&mut strategy, StrategyStatus::Completed)?;
            }
            Ok(())
        });
        let report = self.commit_or_restore(strategy, &outcome, applied)?;
        info!(id, sold = report.spent, received = report.received, "sell executed");
        Ok(report)
    }

    pub async fn execute_sell_twap(&self, id: u64, call: ExecutorCall) -> Result<ExecutionReport> {
        let _tx = self.tx_guard.lock().await;
        let mut strategy = self.load_active(id)?;
        let p = &strategy.parameters;
        if !p.sell || !p.sell_twap {
            return Err(trigger_off("sell TWAP"));
        }
        let now = now_secs();
        let interval = p.sell_twap_interval_secs();
        let elapsed = now.saturating_sub(strategy.sell_twap_executed_at);
        if strategy.sell_twap_executed_at != 0 && elapsed < interval {
            return Err(EngineError::ThrottleNotElapsed(format!(
                "{elapsed}s since last tranche, interval is {interval}s"
            )));
        }
        let quote = self.quote(&strategy).await?;
        self.check_sell_price(&strategy, &quote)?;
        let amount = pricing::dca_slice(p.invest_amount, p.sell_dca_unit, p.sell_dca_value)?;
        let outcome = self.swap_sell(&strategy, &quote, amount, &call).await?;

        let applied = apply_sell(&mut strategy, &outcome, &quote).and_then(|_| {
            strategy.sell_twap_executed_at = now;
            strategy.updated_at = now;
            if strategy.parameters.invest_amount == 0 && strategy.parameters.complete_on_sell {
                self.finish(&mut strategy, StrategyStatus::Completed)?;
            }
            Ok(())
        });
        let report = self.commit_or_restore(strategy, &outcome, applied)?;
        info!(id, sold = report.spent, "sell TWAP tranche executed");
        Ok(report)
    }

    pub async fn execute_str(
        &self,
        id: u64,
        window: RoundWindow,
        call: ExecutorCall,
    ) -> Result<ExecutionReport> {
        let _tx = self.tx_guard.lock().await;
        let mut strategy = self.load_active(id)?;
        let p = &strategy.parameters;
        if !p.sell || !p.str_ {
            return Err(trigger_off("sell-the-rally"));
        }
        let quote = self.quote(&strategy).await?;

        let (lo, hi) = self.window_prices(&strategy, &window).await?;
        if window.stable_hi <= strategy.str_rounds.stable
            || window.invest_hi <= strategy.str_rounds.invest
        {
            return Err(EngineError::RoundInconsistent(
                "rounds at or below the last consumed pair".into(),
            ));
        }
        check_movement(lo, hi, p.str_type, p.str_value, quote.stable_decimals, true)?;
        self.check_sell_price(&strategy, &quote)?;

        let amount = pricing::dca_slice(p.invest_amount, p.sell_dca_unit, p.sell_dca_value)?;
        let outcome = self.swap_sell(&strategy, &quote, amount, &call).await?;

        let applied = apply_sell(&mut strategy, &outcome, &quote).and_then(|_| {
            strategy.str_rounds = ConsumedRounds {
                stable: window.stable_hi,
                invest: window.invest_hi,
            };
            strategy.updated_at = now_secs();
            if strategy.parameters.invest_amount == 0 && strategy.parameters.complete_on_sell {
                self.finish(&mut strategy, StrategyStatus::Completed)?;
            }
            Ok(())
        });
        let report = self.commit_or_restore(strategy, &outcome, applied)?;
        info!(id, sold = report.spent, "rally sell executed");
        Ok(report)
    }

    // ── floor ────────────────────────────────────────────────────────────

    pub async fn execute_floor(
        &self,
        id: u64,
        call: Option<ExecutorCall>,
    ) -> Result<ExecutionReport> {
        let _tx = self.tx_guard.lock().await;
        let mut strategy = self.load_active(id)?;
        let p = &strategy.parameters;
        if !p.floor {
            return Err(trigger_off("floor trigger"));
        }
        if p.invest_amount == 0 {
            return Err(EngineError::InvalidState("no position to protect".into()));
        }
        let quote = self.quote(&strategy).await?;
        self.check_floor_condition(&strategy, &quote)?;

        let terminal = if strategy.parameters.cancel_on_floor {
            StrategyStatus::Cancelled
        } else {
            StrategyStatus::Completed
        };

        if strategy.parameters.liquidate_on_floor {
            let call = call.ok_or_else(|| {
                EngineError::InvalidParameters("liquidation requires swap call data".into())
            })?;
            let amount = strategy.parameters.invest_amount;
            let outcome = self.swap_sell(&strategy, &quote, amount, &call).await?;
            let applied = apply_sell(&mut strategy, &outcome, &quote).and_then(|_| {
                strategy.updated_at = now_secs();
                self.finish(&mut strategy, terminal)
            });
            let report = self.commit_or_restore(strategy, &outcome, applied)?;
            info!(id, liquidated = report.spent, "floor executed");
            return Ok(report);
        }

        strategy.updated_at = now_secs();
        self.finish(&mut strategy, terminal)?;
        let report = ExecutionReport {
            id,
            spent: 0,
            received: 0,
            status: strategy.status,
        };
        info!(id, status = ?strategy.status, "floor executed without liquidation");
        self.store.save(strategy);
        Ok(report)
    }

    fn check_floor_condition(&self, strategy: &Strategy, quote: &Quote) -> Result<()> {
        let p = &strategy.parameters;
        let live = quote.invest.price;
        let fired = match p.floor_type {
            FloorType::FixedPrice => {
                let threshold = pricing::stable_units_to_usd(
                    p.floor_value,
                    quote.stable.price,
                    quote.stable_decimals,
                )?;
                live <= threshold
            }
            FloorType::PercentDrop => {
                if strategy.invest_price == 0 {
                    return Err(EngineError::InvalidState(
                        "percent floor has no entry price".into(),
                    ));
                }
                let threshold = pricing::bps_below(
                    strategy.invest_price,
                    as_bps(p.floor_value, "floor_threshold")?,
                    "floor_threshold",
                )?;
                live <= threshold
            }
            FloorType::FixedLoss => {
                let entry_value = pricing::invest_value_in_stable(
                    p.invest_amount,
                    strategy.invest_price,
                    quote.stable.price,
                    quote.invest_decimals,
                    quote.stable_decimals,
                )?;
                let current_value = pricing::invest_value_in_stable(
                    p.invest_amount,
                    live,
                    quote.stable.price,
                    quote.invest_decimals,
                    quote.stable_decimals,
                )?;
                entry_value.saturating_sub(current_value) >= p.floor_value
            }
            FloorType::Unset => return Err(trigger_off("floor trigger")),
        };
        if fired {
            Ok(())
        } else {
            Err(EngineError::PriceConditionNotMet(format!(
                "invest price {live} has not reached the floor"
            )))
        }
    }

    // ── shared plumbing ──────────────────────────────────────────────────

    async fn swap_buy(
        &self,
        strategy: &Strategy,
        quote: &Quote,
        amount: u128,
        call: &ExecutorCall,
    ) -> Result<SwapOutcome> {
        self.run_swap(
            &strategy.stable_token,
            &strategy.invest_token,
            amount,
            quote.stable.price,
            quote.invest.price,
            strategy.parameters.slippage_bps,
            call,
        )
        .await
    }

    async fn swap_sell(
        &self,
        strategy: &Strategy,
        quote: &Quote,
        amount: u128,
        call: &ExecutorCall,
    ) -> Result<SwapOutcome> {
        self.run_swap(
            &strategy.invest_token,
            &strategy.stable_token,
            amount,
            quote.invest.price,
            quote.stable.price,
            strategy.parameters.slippage_bps,
            call,
        )
        .await
    }

    /// Fetch both round pairs and return the stable-denominated invest price
    /// at the low and high rounds, enforcing forward time order per feed.
    async fn window_prices(
        &self,
        strategy: &Strategy,
        window: &RoundWindow,
    ) -> Result<(u128, u128)> {
        let stable_lo = self
            .feeds
            .round_price(&strategy.stable_token, window.stable_lo)
            .await?;
        let stable_hi = self
            .feeds
            .round_price(&strategy.stable_token, window.stable_hi)
            .await?;
        let invest_lo = self
            .feeds
            .round_price(&strategy.invest_token, window.invest_lo)
            .await?;
        let invest_hi = self
            .feeds
            .round_price(&strategy.invest_token, window.invest_hi)
            .await?;

        if stable_hi.updated_at <= stable_lo.updated_at
            || invest_hi.updated_at <= invest_lo.updated_at
        {
            return Err(EngineError::RoundInconsistent(
                "high round does not postdate low round".into(),
            ));
        }

        let lo = pricing::mul_div(invest_lo.price, PRICE_SCALE, stable_lo.price, "window_prices")?;
        let hi = pricing::mul_div(invest_hi.price, PRICE_SCALE, stable_hi.price, "window_prices")?;
        Ok((lo, hi))
    }

    /// Terminal transition: refund both escrow remainders and set the status.
    fn finish(&self, strategy: &mut Strategy, status: StrategyStatus) -> Result<()> {
        self.refund_escrow(strategy)?;
        strategy.status = status;
        Ok(())
    }
}

/// Dip/rally movement check over stable-denominated 8-dec prices. `rise`
/// selects the direction; `value` is interpreted per `kind`.
fn check_movement(
    lo: u128,
    hi: u128,
    kind: MoveType,
    value: u128,
    stable_decimals: u8,
    rise: bool,
) -> Result<()> {
    let (from, to) = if rise { (lo, hi) } else { (hi, lo) };
    // For a dip `hi` must sit below `lo`; for a rally above.
    let moved = to.checked_sub(from).ok_or_else(|| {
        EngineError::RoundInconsistent("price moved against the required direction".into())
    })?;
    let satisfied = match kind {
        MoveType::Percent => {
            let lhs = moved
                .checked_mul(BPS_DENOMINATOR)
                .ok_or(EngineError::Arithmetic("check_movement"))?;
            let rhs = lo
                .checked_mul(value)
                .ok_or(EngineError::Arithmetic("check_movement"))?;
            lhs >= rhs
        }
        MoveType::FixedAmount => moved >= value,
        MoveType::FixedPrice => {
            let threshold =
                pricing::mul_div(value, PRICE_SCALE, pricing::pow10(stable_decimals), "check_movement")?;
            if rise { hi >= threshold } else { hi <= threshold }
        }
        MoveType::Unset => false,
    };
    if satisfied {
        Ok(())
    } else {
        Err(EngineError::RoundInconsistent(
            "price movement below the configured threshold".into(),
        ))
    }
}

fn apply_buy(strategy: &mut Strategy, outcome: &SwapOutcome, live_invest: u128) -> Result<()> {
    let old_position = strategy.parameters.invest_amount;
    let p = &mut strategy.parameters;
    p.stable_amount = p
        .stable_amount
        .checked_sub(outcome.spent)
        .ok_or(EngineError::Arithmetic("apply_buy"))?;
    p.invest_amount = p
        .invest_amount
        .checked_add(outcome.received)
        .ok_or(EngineError::Arithmetic("apply_buy"))?;
    strategy.budget = strategy
        .budget
        .checked_add(outcome.spent)
        .ok_or(EngineError::Arithmetic("apply_buy"))?;
    strategy.invest_price = pricing::weighted_entry(
        old_position,
        strategy.invest_price,
        outcome.received,
        live_invest,
    )?;
    Ok(())
}

fn apply_sell(strategy: &mut Strategy, outcome: &SwapOutcome, quote: &Quote) -> Result<()> {
    // Cost basis of the sold tranche at the recorded entry price, in stable
    // units; profit is receipts minus that basis.
    let cost = pricing::invest_value_in_stable(
        outcome.spent,
        strategy.invest_price,
        quote.stable.price,
        quote.invest_decimals,
        quote.stable_decimals,
    )?;
    let p = &mut strategy.parameters;
    p.invest_amount = p
        .invest_amount
        .checked_sub(outcome.spent)
        .ok_or(EngineError::Arithmetic("apply_sell"))?;
    p.stable_amount = p
        .stable_amount
        .checked_add(outcome.received)
        .ok_or(EngineError::Arithmetic("apply_sell"))?;
    strategy.budget = strategy
        .budget
        .checked_add(outcome.received)
        .ok_or(EngineError::Arithmetic("apply_sell"))?;
    let delta = as_i128(outcome.received, "apply_sell")? - as_i128(cost, "apply_sell")?;
    strategy.profit = strategy
        .profit
        .checked_add(delta)
        .ok_or(EngineError::Arithmetic("apply_sell"))?;
    Ok(())
}
