//! Strategy lifecycle: creation, update, cancel, and their relayed
//! (signature-authorized) variants.
//!
//! Creation validates the parameter bundle, escrows the owner's funds into
//! the engine's custody account, captures the price baselines relative
//! triggers compare against, and only then inserts the record. A failed
//! creation leaves no trace.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::info;

use crate::auth::{self, op};
use crate::engine::Engine;
use crate::engine::types::{
    AssetId, BPS_DENOMINATOR, ConsumedRounds, CurrentPriceSelector, DcaUnit, FloorType, MoveType,
    Strategy, StrategyParameters, StrategyStatus, StrategyUpdate, TimeUnit, TriggerType,
};
use crate::error::{EngineError, Result};
use crate::oracle::now_secs;

fn invalid(msg: &str) -> EngineError {
    EngineError::InvalidParameters(msg.to_string())
}

fn dca_schedule_ok(unit: DcaUnit, value: u128) -> Result<()> {
    match unit {
        DcaUnit::Unset => Err(invalid("trigger requires a DCA schedule")),
        DcaUnit::Percent if value == 0 || value >= BPS_DENOMINATOR => {
            Err(invalid("percent DCA value must be within (0, 10000) bps"))
        }
        DcaUnit::Fixed if value == 0 => Err(invalid("fixed DCA value must be nonzero")),
        _ => Ok(()),
    }
}

/// Structural invariants of a parameter bundle. Runs at creation and again
/// after every update, so an update can never push the bundle outside the
/// shape a creation would accept.
pub fn validate_parameters(p: &StrategyParameters) -> Result<()> {
    if !p.floor && !p.buy && !p.sell {
        return Err(invalid("at least one of floor, buy, sell must be enabled"));
    }
    if p.slippage_bps as u128 > BPS_DENOMINATOR {
        return Err(invalid("slippage above 10000 bps"));
    }

    if p.floor {
        if p.floor_type == FloorType::Unset || p.floor_value == 0 {
            return Err(invalid("floor requires a type and a nonzero value"));
        }
        if p.floor_type == FloorType::PercentDrop && p.floor_value > BPS_DENOMINATOR {
            return Err(invalid("percent floor value above 10000 bps"));
        }
    }

    if p.buy {
        if p.stable_amount == 0 {
            return Err(invalid("buy requires a stable budget"));
        }
        if p.buy_type == TriggerType::Unset || p.buy_value == 0 {
            return Err(invalid("buy requires a type and a nonzero value"));
        }
        if p.buy_type == TriggerType::CurrentPricePercent && p.buy_value > BPS_DENOMINATOR {
            return Err(invalid("percent buy value above 10000 bps"));
        }
    }
    if p.sell {
        if p.invest_amount == 0 {
            return Err(invalid("sell requires an invest position"));
        }
        if p.sell_type == TriggerType::Unset || p.sell_value == 0 {
            return Err(invalid("sell requires a type and a nonzero value"));
        }
        if p.sell_type == TriggerType::CurrentPricePercent && p.sell_value > BPS_DENOMINATOR {
            return Err(invalid("percent sell value above 10000 bps"));
        }
    }

    if p.btd {
        if !p.buy {
            return Err(invalid("buy-the-dip requires the buy trigger"));
        }
        if p.buy_twap {
            return Err(invalid("buy-the-dip and buy TWAP are mutually exclusive"));
        }
        if p.btd_type == MoveType::Unset || p.btd_value == 0 {
            return Err(invalid("buy-the-dip requires a type and a nonzero value"));
        }
        dca_schedule_ok(p.buy_dca_unit, p.buy_dca_value)?;
    }
    if p.str_ {
        if !p.sell {
            return Err(invalid("sell-the-rally requires the sell trigger"));
        }
        if p.sell_twap {
            return Err(invalid("sell-the-rally and sell TWAP are mutually exclusive"));
        }
        if p.str_type == MoveType::Unset || p.str_value == 0 {
            return Err(invalid("sell-the-rally requires a type and a nonzero value"));
        }
        dca_schedule_ok(p.sell_dca_unit, p.sell_dca_value)?;
    }

    if p.buy_twap {
        if !p.buy {
            return Err(invalid("buy TWAP requires the buy trigger"));
        }
        if p.buy_twap_time == 0 || p.buy_twap_unit == TimeUnit::Unset {
            return Err(invalid("buy TWAP requires a time and a unit"));
        }
        dca_schedule_ok(p.buy_dca_unit, p.buy_dca_value)?;
    }
    if p.sell_twap {
        if !p.sell {
            return Err(invalid("sell TWAP requires the sell trigger"));
        }
        if p.sell_twap_time == 0 || p.sell_twap_unit == TimeUnit::Unset {
            return Err(invalid("sell TWAP requires a time and a unit"));
        }
        dca_schedule_ok(p.sell_dca_unit, p.sell_dca_value)?;
    }

    // DCA schedules are also rejected when configured half-way, even if no
    // trigger currently requires them.
    if p.buy_dca_unit != DcaUnit::Unset {
        dca_schedule_ok(p.buy_dca_unit, p.buy_dca_value)?;
    }
    if p.sell_dca_unit != DcaUnit::Unset {
        dca_schedule_ok(p.sell_dca_unit, p.sell_dca_value)?;
    }

    Ok(())
}

impl Engine {
    pub async fn create_strategy(
        &self,
        owner: Pubkey,
        invest_token: AssetId,
        stable_token: AssetId,
        parameters: StrategyParameters,
    ) -> Result<u64> {
        let _tx = self.tx_guard.lock().await;
        self.create_inner(owner, invest_token, stable_token, parameters).await
    }

    /// Relayed creation. The signature covers the token pair, the full
    /// parameter bundle, the owner's current nonce, and the owner key.
    pub async fn create_strategy_on_behalf(
        &self,
        owner: Pubkey,
        nonce: u64,
        signature: Signature,
        invest_token: AssetId,
        stable_token: AssetId,
        parameters: StrategyParameters,
    ) -> Result<u64> {
        let _tx = self.tx_guard.lock().await;
        auth::verify_signature(
            op::CREATE,
            &(invest_token.as_str(), stable_token.as_str(), &parameters),
            nonce,
            &owner,
            &signature,
        )?;
        self.nonces.check(&owner, nonce)?;
        let id = self.create_inner(owner, invest_token, stable_token, parameters).await?;
        self.nonces.consume(&owner, nonce)?;
        Ok(id)
    }

    async fn create_inner(
        &self,
        owner: Pubkey,
        invest_token: AssetId,
        stable_token: AssetId,
        parameters: StrategyParameters,
    ) -> Result<u64> {
        if invest_token == stable_token {
            return Err(invalid("invest and stable token must differ"));
        }
        self.ledger.decimals(&invest_token)?;
        self.ledger.decimals(&stable_token)?;
        validate_parameters(&parameters)?;

        // Both feeds must exist and be fresh before any funds move.
        let invest_point = self.feeds.fresh_price(&invest_token).await?;
        self.feeds.fresh_price(&stable_token).await?;

        let checkpoint = self.ledger.checkpoint(&[
            (&stable_token, owner),
            (&stable_token, self.account),
            (&invest_token, owner),
            (&invest_token, self.account),
        ]);
        let escrow: Result<()> = (|| {
            if parameters.stable_amount > 0 {
                self.ledger.transfer_from(
                    &stable_token,
                    self.account,
                    owner,
                    self.account,
                    parameters.stable_amount,
                )?;
            }
            if parameters.invest_amount > 0 {
                self.ledger.transfer_from(
                    &invest_token,
                    self.account,
                    owner,
                    self.account,
                    parameters.invest_amount,
                )?;
            }
            Ok(())
        })();
        if let Err(e) = escrow {
            self.ledger.restore(&checkpoint);
            return Err(e);
        }

        let live = invest_point.price;
        let buy_baseline = if parameters.buy_type == TriggerType::CurrentPricePercent
            || parameters.current_price == CurrentPriceSelector::BuySide
        {
            live
        } else {
            0
        };
        let sell_baseline = if parameters.sell_type == TriggerType::CurrentPricePercent
            || parameters.current_price == CurrentPriceSelector::SellSide
        {
            live
        } else {
            0
        };
        let invest_price = if parameters.invest_amount > 0 { live } else { 0 };

        let now = now_secs();
        let id = self.store.allocate_id();
        let strategy = Strategy {
            id,
            owner,
            invest_token,
            stable_token,
            parameters,
            status: StrategyStatus::Active,
            budget: 0,
            profit: 0,
            invest_price,
            buy_baseline,
            sell_baseline,
            btd_rounds: ConsumedRounds::default(),
            str_rounds: ConsumedRounds::default(),
            buy_twap_executed_at: 0,
            sell_twap_executed_at: 0,
            created_at: now,
            updated_at: now,
        };
        info!(id, owner = %owner, "strategy created");
        self.store.save(strategy);
        Ok(id)
    }

    pub async fn update_strategy(
        &self,
        owner: Pubkey,
        id: u64,
        update: StrategyUpdate,
    ) -> Result<()> {
        let _tx = self.tx_guard.lock().await;
        self.update_inner(owner, id, update)
    }

    pub async fn update_strategy_on_behalf(
        &self,
        owner: Pubkey,
        nonce: u64,
        signature: Signature,
        id: u64,
        update: StrategyUpdate,
    ) -> Result<()> {
        let _tx = self.tx_guard.lock().await;
        auth::verify_signature(op::UPDATE, &(id, &update), nonce, &owner, &signature)?;
        self.nonces.check(&owner, nonce)?;
        self.update_inner(owner, id, update)?;
        self.nonces.consume(&owner, nonce)
    }

    fn update_inner(&self, owner: Pubkey, id: u64, update: StrategyUpdate) -> Result<()> {
        let mut strategy = self.store.get(id)?;
        if !strategy.is_active() {
            return Err(EngineError::InvalidState(format!(
                "strategy {id} is not active"
            )));
        }
        if strategy.owner != owner {
            return Err(EngineError::Unauthorized(format!(
                "{owner} does not own strategy {id}"
            )));
        }

        let p = &mut strategy.parameters;
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = update.$field {
                    p.$field = v;
                }
            };
        }
        set!(buy_value);
        set!(sell_value);
        set!(floor_value);
        set!(high_sell_value);
        set!(btd_value);
        set!(str_value);
        set!(buy_twap_time);
        set!(sell_twap_time);
        set!(buy_dca_value);
        set!(sell_dca_value);
        set!(slippage_bps);
        set!(liquidate_on_floor);
        set!(cancel_on_floor);
        set!(complete_on_sell);

        validate_parameters(&strategy.parameters)?;
        strategy.updated_at = now_secs();
        info!(id, "strategy updated");
        self.store.save(strategy);
        Ok(())
    }

    pub async fn cancel_strategy(&self, owner: Pubkey, id: u64) -> Result<()> {
        let _tx = self.tx_guard.lock().await;
        self.cancel_inner(owner, id)
    }

    pub async fn cancel_strategy_on_behalf(
        &self,
        owner: Pubkey,
        nonce: u64,
        signature: Signature,
        id: u64,
    ) -> Result<()> {
        let _tx = self.tx_guard.lock().await;
        auth::verify_signature(op::CANCEL, &id, nonce, &owner, &signature)?;
        self.nonces.check(&owner, nonce)?;
        self.cancel_inner(owner, id)?;
        self.nonces.consume(&owner, nonce)
    }

    fn cancel_inner(&self, owner: Pubkey, id: u64) -> Result<()> {
        let mut strategy = self.store.get(id)?;
        if !strategy.is_active() {
            return Err(EngineError::InvalidState(format!(
                "strategy {id} is not active"
            )));
        }
        if strategy.owner != owner {
            return Err(EngineError::Unauthorized(format!(
                "{owner} does not own strategy {id}"
            )));
        }

        self.refund_escrow(&mut strategy)?;
        strategy.status = StrategyStatus::Cancelled;
        strategy.updated_at = now_secs();
        info!(id, "strategy cancelled");
        self.store.save(strategy);
        Ok(())
    }

    /// Return both escrow remainders to the owner and zero them on the
    /// record. Used by cancel and by terminal transitions in the executor.
    pub(super) fn refund_escrow(&self, strategy: &mut Strategy) -> Result<()> {
        if strategy.parameters.stable_amount > 0 {
            self.ledger.transfer(
                &strategy.stable_token,
                self.account,
                strategy.owner,
                strategy.parameters.stable_amount,
            )?;
            strategy.parameters.stable_amount = 0;
        }
        if strategy.parameters.invest_amount > 0 {
            self.ledger.transfer(
                &strategy.invest_token,
                self.account,
                strategy.owner,
                strategy.parameters.invest_amount,
            )?;
            strategy.parameters.invest_amount = 0;
        }
        Ok(())
    }
}
