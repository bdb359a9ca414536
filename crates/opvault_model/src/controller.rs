//! Controller: applies action batches atomically
//!
//! A batch runs against a working copy of the [`Ledger`]. Every action is
//! parsed, authorised and applied in order; afterwards each vault touched by
//! the batch must pass the final state check. The caller gets the new ledger
//! back only if everything succeeded, otherwise the copy is dropped and the
//! failing stage is reported.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{Action, ActionArgs, ActionType};
use crate::address::Address;
use crate::assets::{AssetBook, TokenBalances};
use crate::calculator::{MarginCalculator, MarginConfig};
use crate::error::{ErrorKind, ProtocolError, Result};
use crate::events::ControllerEvent;
use crate::oracle::Oracle;
use crate::otoken::{OptionTerms, OtokenBook};
use crate::vault::{AssetKind, MintBurn, VaultStore, VaultType};
use crate::whitelist::Whitelist;

/// Mutable protocol state a batch may change
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub vaults: VaultStore,
    pub otokens: OtokenBook,
    pub balances: TokenBalances,
}

/// Read-only state a batch consults
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub whitelist: &'a Whitelist,
    pub oracle: &'a Oracle,
    pub assets: &'a AssetBook,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    ApplyingBatch,
    Reverted,
    Committed,
}

/// Where a batch failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStage {
    PauseCheck,
    Action(usize),
    FinalState { owner: Address, vault_id: u64 },
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStage::PauseCheck => write!(f, "pause check"),
            BatchStage::Action(index) => write!(f, "action {}", index),
            BatchStage::FinalState { owner, vault_id } => write!(f, "final state of vault {} of {}", vault_id, owner),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{stage}: {error}")]
pub struct BatchError {
    pub stage: BatchStage,
    #[source]
    pub error: ProtocolError,
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Index of the failing action, if an action failed
    pub fn index(&self) -> Option<usize> {
        match self.stage {
            BatchStage::Action(index) => Some(index),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    pub ledger: Ledger,
    pub events: Vec<ControllerEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    pub address: Address,
    /// Holds deposited collateral and long otokens
    pub pool: Address,
    owner: Address,
    partial_pauser: Address,
    full_pauser: Address,
    system_partially_paused: bool,
    system_fully_paused: bool,
    call_restricted: bool,
    operators: BTreeMap<Address, BTreeSet<Address>>,
    config: MarginConfig,
}

impl Controller {
    pub fn new(address: Address, pool: Address, owner: Address, config: MarginConfig) -> Self {
        Self {
            address,
            pool,
            owner,
            partial_pauser: owner,
            full_pauser: owner,
            system_partially_paused: false,
            system_fully_paused: false,
            call_restricted: true,
            operators: BTreeMap::new(),
            config,
        }
    }

    fn only_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            return Err(ProtocolError::NotOwner);
        }
        Ok(())
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn config(&self) -> &MarginConfig {
        &self.config
    }

    pub fn set_margin_config(&mut self, caller: Address, config: MarginConfig) -> Result<()> {
        self.only_owner(caller)?;
        self.config = config;
        Ok(())
    }

    pub fn set_partial_pauser(&mut self, caller: Address, pauser: Address) -> Result<()> {
        self.only_owner(caller)?;
        self.partial_pauser = pauser;
        Ok(())
    }

    pub fn set_full_pauser(&mut self, caller: Address, pauser: Address) -> Result<()> {
        self.only_owner(caller)?;
        self.full_pauser = pauser;
        Ok(())
    }

    pub fn set_system_partially_paused(&mut self, caller: Address, paused: bool) -> Result<ControllerEvent> {
        if caller != self.partial_pauser {
            return Err(ProtocolError::NotPauser);
        }
        self.system_partially_paused = paused;
        log::info!("system partially paused: {}", paused);
        Ok(ControllerEvent::SystemPartiallyPaused { paused })
    }

    pub fn set_system_fully_paused(&mut self, caller: Address, paused: bool) -> Result<ControllerEvent> {
        if caller != self.full_pauser {
            return Err(ProtocolError::NotPauser);
        }
        self.system_fully_paused = paused;
        log::info!("system fully paused: {}", paused);
        Ok(ControllerEvent::SystemFullyPaused { paused })
    }

    pub fn system_partially_paused(&self) -> bool {
        self.system_partially_paused
    }

    pub fn system_fully_paused(&self) -> bool {
        self.system_fully_paused
    }

    pub fn set_call_restriction(&mut self, caller: Address, is_restricted: bool) -> Result<ControllerEvent> {
        self.only_owner(caller)?;
        self.call_restricted = is_restricted;
        Ok(ControllerEvent::CallRestricted { is_restricted })
    }

    pub fn call_restricted(&self) -> bool {
        self.call_restricted
    }

    /// Let `operator` act on every vault of `caller`
    pub fn set_operator(&mut self, caller: Address, operator: Address, is_operator: bool) -> ControllerEvent {
        let set = self.operators.entry(caller).or_default();
        if is_operator {
            set.insert(operator);
        } else {
            set.remove(&operator);
        }
        ControllerEvent::AccountOperatorUpdated { account_owner: caller, operator, is_set: is_operator }
    }

    pub fn is_operator(&self, owner: &Address, operator: &Address) -> bool {
        self.operators.get(owner).is_some_and(|set| set.contains(operator))
    }

    fn check_pause(&self, args: &[ActionArgs]) -> Result<()> {
        if self.system_fully_paused {
            return Err(ProtocolError::SystemFullyPaused);
        }
        if self.system_partially_paused
            && args
                .iter()
                .any(|a| !matches!(a.action_type, ActionType::Redeem | ActionType::SettleVault))
        {
            return Err(ProtocolError::SystemPartiallyPaused);
        }
        Ok(())
    }

    /// Run `args` against a copy of `ledger`; return the resulting ledger on success
    pub fn operate(
        &self,
        ctx: Context<'_>,
        ledger: &Ledger,
        caller: Address,
        args: &[ActionArgs],
        now: u64,
    ) -> core::result::Result<BatchOutcome, BatchError> {
        let batch = Batch {
            controller: self,
            ctx,
            caller,
            now,
            ledger: ledger.clone(),
            touched: BTreeSet::new(),
            events: Vec::new(),
            state: BatchState::Idle,
        };
        batch.run(args)
    }
}

struct Batch<'a> {
    controller: &'a Controller,
    ctx: Context<'a>,
    caller: Address,
    now: u64,
    ledger: Ledger,
    touched: BTreeSet<(Address, u64)>,
    events: Vec<ControllerEvent>,
    state: BatchState,
}

impl<'a> Batch<'a> {
    fn run(mut self, args: &[ActionArgs]) -> core::result::Result<BatchOutcome, BatchError> {
        if let Err(error) = self.controller.check_pause(args) {
            return Err(self.revert(BatchStage::PauseCheck, error));
        }

        self.transition(BatchState::ApplyingBatch);
        for (index, arg) in args.iter().enumerate() {
            let result = Action::try_from(arg).and_then(|action| {
                log::debug!("action {}: {:?}", index, action.action_type());
                self.apply(action)
            });
            if let Err(error) = result {
                return Err(self.revert(BatchStage::Action(index), error));
            }
        }

        let touched = std::mem::take(&mut self.touched);
        for (owner, vault_id) in touched {
            if let Err(error) = self.verify_vault(&owner, vault_id) {
                return Err(self.revert(BatchStage::FinalState { owner, vault_id }, error));
            }
        }

        self.transition(BatchState::Committed);
        log::info!("batch of {} actions committed by {}", args.len(), self.caller);
        Ok(BatchOutcome { ledger: self.ledger, events: self.events })
    }

    fn transition(&mut self, next: BatchState) {
        log::trace!("batch {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn revert(&mut self, stage: BatchStage, error: ProtocolError) -> BatchError {
        self.transition(BatchState::Reverted);
        log::warn!("batch reverted at {}: {}", stage, error);
        BatchError { stage, error }
    }

    fn calc(&self) -> MarginCalculator<'_> {
        MarginCalculator::new(&self.controller.config, self.ctx.oracle, self.ctx.assets, &self.ledger.otokens)
    }

    fn verify_vault(&self, owner: &Address, vault_id: u64) -> Result<()> {
        let record = self.ledger.vaults.get_vault(owner, vault_id)?;
        self.calc().verify_final_state(record, self.ctx.whitelist, self.now)
    }

    fn authorize(&self, owner: &Address) -> Result<()> {
        if self.caller == *owner || self.controller.is_operator(owner, &self.caller) {
            Ok(())
        } else {
            Err(ProtocolError::Unauthorized)
        }
    }

    fn terms(&self, otoken: &Address) -> Result<OptionTerms> {
        self.ledger.otokens.terms(otoken)
    }

    /// Record an owner-side adjustment of a naked margin vault
    fn touch_adjusted(&mut self, owner: &Address, vault_id: u64) -> Result<()> {
        if self.ledger.vaults.get_vault(owner, vault_id)?.vault_type == VaultType::NakedMargin {
            self.ledger.vaults.touch(owner, vault_id, self.now)?;
        }
        Ok(())
    }

    fn pay_from_pool(&mut self, asset: Address, to: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let pool = self.controller.pool;
        self.ledger
            .balances
            .transfer(asset, pool, to, amount)
            .map_err(|_| ProtocolError::PoolInsufficient(asset))
    }

    fn apply(&mut self, action: Action) -> Result<()> {
        if let Some((owner, _)) = action.vault() {
            self.authorize(&owner)?;
        }
        let controller = self.controller.address;
        let pool = self.controller.pool;

        match action {
            Action::OpenVault { owner, vault_id, vault_type } => {
                self.ledger.vaults.open_vault(owner, vault_id, vault_type, self.now)?;
                self.touched.insert((owner, vault_id));
                self.events.push(ControllerEvent::VaultOpened { owner, vault_id, vault_type: vault_type as u64 });
            }

            Action::DepositCollateral { owner, vault_id, from, asset, index, amount } => {
                if from != self.caller {
                    return Err(ProtocolError::DepositorMismatch);
                }
                if !self.ctx.whitelist.is_whitelisted_collateral(&asset) {
                    return Err(ProtocolError::CollateralNotWhitelisted);
                }
                self.ledger.vaults.apply_deposit(&owner, vault_id, AssetKind::Collateral, asset, amount, index)?;
                self.ledger.balances.transfer(asset, from, pool, amount)?;
                self.touch_adjusted(&owner, vault_id)?;
                self.touched.insert((owner, vault_id));
                self.events.push(ControllerEvent::CollateralDeposited { asset, owner, from, vault_id, amount });
            }

            Action::WithdrawCollateral { owner, vault_id, to, asset, index, amount } => {
                self.ledger.vaults.apply_withdraw(&owner, vault_id, AssetKind::Collateral, asset, amount, index)?;
                self.pay_from_pool(asset, to, amount)?;
                self.touch_adjusted(&owner, vault_id)?;
                self.touched.insert((owner, vault_id));
                self.events.push(ControllerEvent::CollateralWithdrawn { asset, owner, to, vault_id, amount });
            }

            Action::DepositLong { owner, vault_id, from, otoken, index, amount } => {
                if from != self.caller {
                    return Err(ProtocolError::DepositorMismatch);
                }
                if !self.ctx.whitelist.is_whitelisted_otoken(&otoken) {
                    return Err(ProtocolError::LongNotWhitelisted);
                }
                if self.terms(&otoken)?.is_expired(self.now) {
                    return Err(ProtocolError::DepositExpiredLong);
                }
                self.ledger.vaults.apply_deposit(&owner, vault_id, AssetKind::Long, otoken, amount, index)?;
                self.ledger.otokens.get_mut(&otoken)?.transfer(from, pool, amount)?;
                self.touched.insert((owner, vault_id));
                self.events.push(ControllerEvent::LongOtokenDeposited { otoken, owner, from, vault_id, amount });
            }

            Action::WithdrawLong { owner, vault_id, to, otoken, index, amount } => {
                if self.terms(&otoken)?.is_expired(self.now) {
                    return Err(ProtocolError::WithdrawExpiredLong);
                }
                self.ledger.vaults.apply_withdraw(&owner, vault_id, AssetKind::Long, otoken, amount, index)?;
                self.ledger.otokens.get_mut(&otoken)?.transfer(pool, to, amount)?;
                self.touched.insert((owner, vault_id));
                self.events.push(ControllerEvent::LongOtokenWithdrawn { otoken, owner, to, vault_id, amount });
            }

            Action::MintShort { owner, vault_id, to, otoken, index, amount } => {
                if !self.ctx.whitelist.is_whitelisted_otoken(&otoken) {
                    return Err(ProtocolError::ShortNotWhitelisted);
                }
                if self.terms(&otoken)?.is_expired(self.now) {
                    return Err(ProtocolError::MintExpired);
                }
                self.ledger.vaults.apply_mint_burn(&owner, vault_id, otoken, MintBurn::Mint(amount), index)?;
                self.ledger.otokens.get_mut(&otoken)?.mint(controller, to, amount)?;
                self.touch_adjusted(&owner, vault_id)?;
                self.touched.insert((owner, vault_id));
                self.events.push(ControllerEvent::ShortOtokenMinted { otoken, owner, to, vault_id, amount });
            }

            Action::BurnShort { owner, vault_id, from, otoken, index, amount } => {
                if from != self.caller && !self.controller.is_operator(&from, &self.caller) {
                    return Err(ProtocolError::BurnerNotAuthorized);
                }
                if self.terms(&otoken)?.is_expired(self.now) {
                    return Err(ProtocolError::BurnExpired);
                }
                self.ledger.vaults.apply_mint_burn(&owner, vault_id, otoken, MintBurn::Burn(amount), index)?;
                self.ledger.otokens.get_mut(&otoken)?.burn(controller, from, amount)?;
                self.touch_adjusted(&owner, vault_id)?;
                self.touched.insert((owner, vault_id));
                self.events.push(ControllerEvent::ShortOtokenBurned { otoken, owner, from, vault_id, amount });
            }

            Action::SettleVault { owner, vault_id, to } => self.settle_vault(owner, vault_id, to)?,

            Action::Redeem { receiver, otoken, amount } => {
                let terms = self.terms(&otoken)?;
                if !terms.is_expired(self.now) {
                    return Err(ProtocolError::NotExpired);
                }
                if !self.calc().is_settlement_allowed(&terms) {
                    return Err(ProtocolError::PriceNotFinalized);
                }
                let payout = self.calc().payout(&otoken, amount)?;
                self.ledger.otokens.get_mut(&otoken)?.burn(controller, self.caller, amount)?;
                self.pay_from_pool(terms.collateral_asset, receiver, payout)?;
                self.events.push(ControllerEvent::Redeem {
                    otoken,
                    redeemer: self.caller,
                    receiver,
                    collateral: terms.collateral_asset,
                    otoken_burned: amount,
                    payout,
                });
            }

            Action::Call { callee, data } => {
                if self.controller.call_restricted && !self.ctx.whitelist.is_whitelisted_callee(&callee) {
                    return Err(ProtocolError::CalleeNotWhitelisted);
                }
                self.events.push(ControllerEvent::CallExecuted { from: self.caller, to: callee, data });
            }

            Action::Liquidate { owner, vault_id, receiver, amount, round_id } => {
                self.liquidate(owner, vault_id, receiver, amount, round_id)?
            }
        }
        Ok(())
    }

    fn settle_vault(&mut self, owner: Address, vault_id: u64, to: Address) -> Result<()> {
        let record = self.ledger.vaults.get_vault(&owner, vault_id)?;
        let Some((otoken, _)) = record.vault.short().or(record.vault.long()) else {
            return Err(ProtocolError::NothingToSettle);
        };
        let terms = self.terms(&otoken)?;
        if !terms.is_expired(self.now) {
            return Err(ProtocolError::NotExpired);
        }
        if !self.calc().is_settlement_allowed(&terms) {
            return Err(ProtocolError::PriceNotFinalized);
        }
        let payout = self.calc().proceeds(record, self.now)?;
        let payout_asset = record.vault.collateral().map_or(terms.collateral_asset, |(asset, _)| asset);

        let previous = self.ledger.vaults.clear(&owner, vault_id)?;
        if let Some((long, amount)) = previous.long() {
            let (controller, pool) = (self.controller.address, self.controller.pool);
            self.ledger.otokens.get_mut(&long)?.burn(controller, pool, amount)?;
        }
        self.pay_from_pool(payout_asset, to, payout)?;
        self.touched.insert((owner, vault_id));
        log::debug!("vault {} of {} settled for {}", vault_id, owner, payout);
        self.events.push(ControllerEvent::VaultSettled { owner, to, vault_id, payout });
        Ok(())
    }

    fn liquidate(&mut self, owner: Address, vault_id: u64, receiver: Address, amount: u128, round_id: u64) -> Result<()> {
        let record = self.ledger.vaults.get_vault(&owner, vault_id)?;
        let quote = self.calc().liquidation_quote(record, round_id, self.now)?;
        if amount > quote.short_amount {
            return Err(ProtocolError::RepayExceedsShort);
        }
        // Zero repays nothing but still proves the vault is liquidatable
        if amount == 0 {
            log::debug!("vault {} of {} liquidatable at round {}, nothing repaid", vault_id, owner, round_id);
            self.events.push(ControllerEvent::VaultLiquidated {
                liquidator: self.caller,
                receiver,
                owner,
                vault_id,
                round_id,
                debt_amount: 0,
                collateral_payout: 0,
            });
            return Ok(());
        }
        let payout = quote.payout(amount)?;
        let (short, _) = record.vault.short().ok_or(ProtocolError::LiquidationNoShort)?;
        let collateral_asset = record.vault.collateral().map(|(asset, _)| asset);

        if amount < quote.short_amount {
            let dust = collateral_asset.map_or(0, |asset| self.ctx.oracle.get_dust_limit(&asset));
            if quote.collateral - payout < dust {
                return Err(ProtocolError::LiquidationLeavesDust);
            }
        }

        let controller = self.controller.address;
        self.ledger.otokens.get_mut(&short)?.burn(controller, self.caller, amount)?;
        self.ledger.vaults.apply_mint_burn(&owner, vault_id, short, MintBurn::Burn(amount), 0)?;
        if let (Some(asset), true) = (collateral_asset, payout > 0) {
            self.ledger.vaults.apply_withdraw(&owner, vault_id, AssetKind::Collateral, asset, payout, 0)?;
            let to = if receiver.is_zero() { self.caller } else { receiver };
            self.pay_from_pool(asset, to, payout)?;
        }

        log::info!(
            "vault {} of {} liquidated: {} repaid at round {} for {} collateral",
            vault_id,
            owner,
            amount,
            round_id,
            payout
        );
        self.events.push(ControllerEvent::VaultLiquidated {
            liquidator: self.caller,
            receiver,
            owner,
            vault_id,
            round_id,
            debt_amount: amount,
            collateral_payout: payout,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{LiquidationParams, UpperBound};

    fn config() -> MarginConfig {
        MarginConfig {
            spot_shock_bps: 2_500,
            upper_bounds: vec![UpperBound { max_time_to_expiry: 86_400 * 30, value_bps: 1_000 }],
            liquidation: LiquidationParams { threshold_bps: 10_000, cooldown_secs: 600, auction_time_secs: 3_600 },
        }
    }

    #[test]
    fn pausers_and_owner_gates() {
        let owner = Address::from_low_u64(1);
        let pauser = Address::from_low_u64(2);
        let mut controller = Controller::new(Address::from_low_u64(10), Address::from_low_u64(11), owner, config());

        assert_eq!(controller.set_partial_pauser(pauser, pauser), Err(ProtocolError::NotOwner));
        controller.set_partial_pauser(owner, pauser).unwrap();
        assert_eq!(controller.set_system_partially_paused(owner, true), Err(ProtocolError::NotPauser));
        controller.set_system_partially_paused(pauser, true).unwrap();
        assert!(controller.system_partially_paused());

        let redeem = ActionArgs::redeem(owner, Address::from_low_u64(99), 1);
        assert_eq!(controller.check_pause(std::slice::from_ref(&redeem)), Ok(()));
        let open = ActionArgs::open_vault(owner, 1, VaultType::NakedMargin);
        assert_eq!(controller.check_pause(&[redeem, open]), Err(ProtocolError::SystemPartiallyPaused));

        controller.set_system_fully_paused(owner, true).unwrap();
        assert_eq!(controller.check_pause(&[]), Err(ProtocolError::SystemFullyPaused));
    }

    #[test]
    fn operators_toggle() {
        let owner = Address::from_low_u64(1);
        let operator = Address::from_low_u64(2);
        let mut controller = Controller::new(Address::from_low_u64(10), Address::from_low_u64(11), owner, config());
        assert!(!controller.is_operator(&owner, &operator));
        controller.set_operator(owner, operator, true);
        assert!(controller.is_operator(&owner, &operator));
        assert!(!controller.is_operator(&operator, &owner));
        controller.set_operator(owner, operator, false);
        assert!(!controller.is_operator(&owner, &operator));
    }

    #[test]
    fn failing_action_reports_index_and_leaves_ledger() {
        let owner = Address::from_low_u64(1);
        let controller = Controller::new(Address::from_low_u64(10), Address::from_low_u64(11), owner, config());
        let whitelist = Whitelist::new(owner);
        let oracle = Oracle::new(owner);
        let assets = AssetBook::new();
        let ctx = Context { whitelist: &whitelist, oracle: &oracle, assets: &assets };
        let ledger = Ledger::default();

        let args = [
            ActionArgs::open_vault(owner, 1, VaultType::NakedMargin),
            ActionArgs::open_vault(owner, 1, VaultType::NakedMargin),
        ];
        let err = controller.operate(ctx, &ledger, owner, &args, 0).unwrap_err();
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.error, ProtocolError::VaultAlreadyExists { owner, vault_id: 1 });
        assert_eq!(ledger, Ledger::default());

        let outcome = controller.operate(ctx, &ledger, owner, &args[..1], 0).unwrap();
        assert_eq!(outcome.ledger.vaults.vault_count(&owner), 1);
        assert_eq!(outcome.events.len(), 1);
    }

    #[test]
    fn others_cannot_touch_a_vault() {
        let owner = Address::from_low_u64(1);
        let stranger = Address::from_low_u64(3);
        let controller = Controller::new(Address::from_low_u64(10), Address::from_low_u64(11), owner, config());
        let whitelist = Whitelist::new(owner);
        let oracle = Oracle::new(owner);
        let assets = AssetBook::new();
        let ctx = Context { whitelist: &whitelist, oracle: &oracle, assets: &assets };

        let err = controller
            .operate(ctx, &Ledger::default(), stranger, &[ActionArgs::open_vault(owner, 1, VaultType::NakedMargin)], 0)
            .unwrap_err();
        assert_eq!(err.error, ProtocolError::Unauthorized);
        assert_eq!(err.kind(), ErrorKind::PreconditionFailure);
    }
}
