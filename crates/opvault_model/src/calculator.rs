//! Margin calculator
//!
//! Pure functions over a vault snapshot, the option terms it references and
//! oracle prices:
//! - collateral requirement (naked margin and fully collateralized spreads)
//! - final state validation
//! - excess collateral / settlement proceeds
//! - liquidation eligibility and the auction debt price
//!
//! All math runs on an 8-decimal base and is converted into the collateral
//! asset's decimals at the end. Requirements round up, payouts round down.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::assets::AssetBook;
use crate::error::{ProtocolError, Result};
use crate::math::{
    apply_bps, base_div, base_mul, mul_div, mul_div_floor, pow10, rescale, Rounding, BASE, BASE_DECIMALS, BPS,
    OTOKEN_DECIMALS, STRIKE_DECIMALS,
};
use crate::oracle::Oracle;
use crate::otoken::{OptionTerms, OtokenBook};
use crate::vault::{VaultRecord, VaultType};
use crate::whitelist::Whitelist;

/// Upper-bound value applied to options with at most `max_time_to_expiry` seconds left
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpperBound {
    pub max_time_to_expiry: u64,
    pub value_bps: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationParams {
    /// Vault is liquidatable when collateral < required * threshold / 10_000
    pub threshold_bps: u64,
    /// Minimum seconds between the latest adjustment and a liquidation
    pub cooldown_secs: u64,
    /// Seconds for the debt price to move from intrinsic value to collateral / short
    pub auction_time_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginConfig {
    pub spot_shock_bps: u64,
    pub upper_bounds: Vec<UpperBound>,
    pub liquidation: LiquidationParams,
}

impl MarginConfig {
    /// Value of the tightest bucket covering `time_to_expiry`
    pub fn upper_bound_value(&self, time_to_expiry: u64) -> Result<u64> {
        self.upper_bounds
            .iter()
            .filter(|bound| time_to_expiry <= bound.max_time_to_expiry)
            .min_by_key(|bound| bound.max_time_to_expiry)
            .map(|bound| bound.value_bps)
            .ok_or(ProtocolError::UpperBoundNotFound(time_to_expiry))
    }
}

/// Snapshot of a vault that is eligible for liquidation at a price round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiquidationQuote {
    pub round_price: u128,
    pub round_timestamp: u64,
    pub short_amount: u128,
    pub collateral: u128,
    /// Collateral requirement at the round price
    pub required: u128,
    /// Collateral paid per whole otoken repaid
    pub debt_price: u128,
}

impl LiquidationQuote {
    /// Collateral released for repaying `amount` otokens
    pub fn payout(&self, amount: u128) -> Result<u128> {
        let payout = checked(mul_div_floor(amount, self.debt_price, one_otoken()?))?;
        Ok(payout.min(self.collateral))
    }
}

#[derive(Clone, Copy)]
enum PriceSource {
    Live,
    Expiry(u64),
}

pub struct MarginCalculator<'a> {
    pub config: &'a MarginConfig,
    pub oracle: &'a Oracle,
    pub assets: &'a AssetBook,
    pub otokens: &'a OtokenBook,
}

fn checked(value: Option<u128>) -> Result<u128> {
    value.ok_or(ProtocolError::Overflow)
}

fn one_otoken() -> Result<u128> {
    checked(pow10(OTOKEN_DECIMALS))
}

/// Long can offset the short only if both are the same option series up to strike
pub fn is_marginable(short: &OptionTerms, long: &OptionTerms) -> bool {
    short.underlying == long.underlying
        && short.strike_asset == long.strike_asset
        && short.collateral_asset == long.collateral_asset
        && short.expiry == long.expiry
        && short.is_put == long.is_put
}

impl<'a> MarginCalculator<'a> {
    pub fn new(config: &'a MarginConfig, oracle: &'a Oracle, assets: &'a AssetBook, otokens: &'a OtokenBook) -> Self {
        Self { config, oracle, assets, otokens }
    }

    fn price(&self, asset: &Address, source: PriceSource) -> Result<u128> {
        match source {
            PriceSource::Live => self.oracle.get_price(asset),
            PriceSource::Expiry(expiry) => self.oracle.get_expiry_price(asset, expiry),
        }
    }

    /// Base-scaled amount of `from` expressed in `to`
    fn convert(&self, amount: u128, from: &Address, to: &Address, source: PriceSource, rounding: Rounding) -> Result<u128> {
        if from == to || amount == 0 {
            return Ok(amount);
        }
        let from_price = self.price(from, source)?;
        let to_price = self.price(to, source)?;
        checked(mul_div(amount, from_price, to_price, rounding))
    }

    /// Base-scaled amount to raw units of `asset`
    fn to_asset_units(&self, amount: u128, asset: &Address, rounding: Rounding) -> Result<u128> {
        let decimals = self.assets.decimals(asset)?;
        checked(rescale(amount, BASE_DECIMALS, decimals, rounding))
    }

    /// Requirement for a naked short of `short_amount` when the underlying trades at `spot`
    pub fn naked_margin_required(&self, terms: &OptionTerms, short_amount: u128, spot: u128, now: u64) -> Result<u128> {
        let time_to_expiry = terms.expiry.saturating_sub(now);
        let upper_bound = self.config.upper_bound_value(time_to_expiry)?;
        let amount = checked(rescale(short_amount, OTOKEN_DECIMALS, BASE_DECIMALS, Rounding::Up))?;
        let strike = checked(rescale(terms.strike_price, STRIKE_DECIMALS, BASE_DECIMALS, Rounding::Up))?;
        let shock = self.config.spot_shock_bps;

        let (per_option, denomination) = if terms.is_put {
            // amount * (min(K, S_down) * ubv + max(K - S_down, 0))
            let shocked = checked(apply_bps(spot, (BPS as u64).saturating_sub(shock), Rounding::Down))?;
            let time_value = checked(apply_bps(strike.min(shocked), upper_bound, Rounding::Up))?;
            (time_value + strike.saturating_sub(shocked), terms.strike_asset)
        } else {
            // amount * (min(1, K / S_up) * ubv + max(1 - K / S_up, 0)), in underlying
            let shocked = checked(apply_bps(spot, BPS as u64 + shock, Rounding::Up))?;
            let (ratio_up, ratio_down) = if shocked == 0 {
                (BASE, BASE)
            } else {
                (
                    checked(base_div(strike, shocked, Rounding::Up))?.min(BASE),
                    checked(base_div(strike, shocked, Rounding::Down))?.min(BASE),
                )
            };
            let time_value = checked(apply_bps(ratio_up, upper_bound, Rounding::Up))?;
            (time_value + (BASE - ratio_down), terms.underlying)
        };

        let required = checked(base_mul(amount, per_option, Rounding::Up))?;
        let required = self.convert(required, &denomination, &terms.collateral_asset, PriceSource::Live, Rounding::Up)?;
        self.to_asset_units(required, &terms.collateral_asset, Rounding::Up)
    }

    /// Requirement for a short optionally offset by a marginable long
    pub fn spread_required(
        &self,
        short: &OptionTerms,
        short_amount: u128,
        long: Option<(&OptionTerms, u128)>,
    ) -> Result<u128> {
        let short_amount = checked(rescale(short_amount, OTOKEN_DECIMALS, BASE_DECIMALS, Rounding::Up))?;
        let short_strike = checked(rescale(short.strike_price, STRIKE_DECIMALS, BASE_DECIMALS, Rounding::Up))?;
        let (long_amount, long_strike) = match long {
            Some((terms, amount)) => (
                checked(rescale(amount, OTOKEN_DECIMALS, BASE_DECIMALS, Rounding::Down))?,
                checked(rescale(terms.strike_price, STRIKE_DECIMALS, BASE_DECIMALS, Rounding::Down))?,
            ),
            None => (0, 0),
        };

        let (required, denomination) = if short.is_put {
            let net = checked(base_mul(short_amount, short_strike, Rounding::Up))?
                .saturating_sub(checked(base_mul(long_amount, long_strike, Rounding::Down))?);
            let spread = checked(base_mul(
                short_amount.min(long_amount),
                short_strike.saturating_sub(long_strike),
                Rounding::Up,
            ))?;
            (net.max(spread), short.strike_asset)
        } else if long_amount == 0 || long_strike == 0 {
            (short_amount, short.underlying)
        } else {
            let spread = checked(mul_div(
                long_strike.saturating_sub(short_strike),
                short_amount,
                long_strike,
                Rounding::Up,
            ))?;
            (short_amount.saturating_sub(long_amount).max(spread), short.underlying)
        };

        let required = self.convert(required, &denomination, &short.collateral_asset, PriceSource::Live, Rounding::Up)?;
        self.to_asset_units(required, &short.collateral_asset, Rounding::Up)
    }

    /// Collateral the vault must hold, in raw units of the short's collateral asset
    pub fn required_collateral(&self, record: &VaultRecord, now: u64) -> Result<u128> {
        let Some((short, short_amount)) = record.vault.short() else {
            return Ok(0);
        };
        let terms = self.otokens.terms(&short)?;
        match record.vault_type {
            VaultType::NakedMargin => {
                let spot = self.oracle.get_price(&terms.underlying)?;
                self.naked_margin_required(&terms, short_amount, spot, now)
            }
            VaultType::FullyCollateralized => {
                let long = match record.vault.long() {
                    Some((long, amount)) => {
                        let long_terms = self.otokens.terms(&long)?;
                        if !is_marginable(&terms, &long_terms) {
                            return Err(ProtocolError::LongNotMarginable);
                        }
                        Some((long_terms, amount))
                    }
                    None => None,
                };
                self.spread_required(&terms, short_amount, long.as_ref().map(|(t, a)| (t, *a)))
            }
        }
    }

    /// Check applied to every vault a batch touched
    pub fn verify_final_state(&self, record: &VaultRecord, whitelist: &Whitelist, now: u64) -> Result<()> {
        let vault = &record.vault;
        if let Some(asset) = vault.collateral_assets.iter().find(|a| !whitelist.is_whitelisted_collateral(a)) {
            log::debug!("collateral {} not whitelisted", asset);
            return Err(ProtocolError::CollateralNotWhitelisted);
        }

        let naked = record.vault_type == VaultType::NakedMargin;
        if naked && vault.long().is_some() {
            return Err(ProtocolError::LongNotAllowed);
        }
        if let Some((asset, amount)) = vault.collateral() {
            if naked && amount < self.oracle.get_dust_limit(&asset) {
                return Err(ProtocolError::BelowDustLimit);
            }
        }

        let Some((short, _)) = vault.short() else {
            return Ok(());
        };
        let terms = self.otokens.terms(&short)?;
        if let Some((asset, _)) = vault.collateral() {
            if asset != terms.collateral_asset {
                return Err(ProtocolError::InvalidFinalState);
            }
        }
        // Expired shorts can only be settled
        if terms.is_expired(now) {
            return Ok(());
        }
        let required = self.required_collateral(record, now)?;
        if vault.collateral_amount() < required {
            log::debug!("collateral {} below requirement {}", vault.collateral_amount(), required);
            return Err(ProtocolError::InvalidFinalState);
        }
        Ok(())
    }

    pub fn is_valid_final_state(&self, record: &VaultRecord, whitelist: &Whitelist, now: u64) -> bool {
        self.verify_final_state(record, whitelist, now).is_ok()
    }

    /// Value of one whole otoken at `spot`, in raw collateral units
    fn intrinsic_value(&self, terms: &OptionTerms, spot: u128, source: PriceSource) -> Result<u128> {
        let strike = checked(rescale(terms.strike_price, STRIKE_DECIMALS, BASE_DECIMALS, Rounding::Down))?;
        let (value, denomination) = if terms.is_put {
            (strike.saturating_sub(spot), terms.strike_asset)
        } else if spot > strike {
            (checked(base_div(spot - strike, spot, Rounding::Down))?, terms.underlying)
        } else {
            (0, terms.underlying)
        };
        if value == 0 {
            return Ok(0);
        }
        let value = self.convert(value, &denomination, &terms.collateral_asset, source, Rounding::Down)?;
        self.to_asset_units(value, &terms.collateral_asset, Rounding::Down)
    }

    /// Assets whose expiry price settlement of `terms` reads
    pub fn settlement_assets(terms: &OptionTerms) -> Vec<Address> {
        let denomination = if terms.is_put { terms.strike_asset } else { terms.underlying };
        let mut assets = vec![terms.underlying];
        if denomination != terms.collateral_asset {
            for asset in [denomination, terms.collateral_asset] {
                if !assets.contains(&asset) {
                    assets.push(asset);
                }
            }
        }
        assets
    }

    pub fn is_settlement_allowed(&self, terms: &OptionTerms) -> bool {
        Self::settlement_assets(terms)
            .iter()
            .all(|asset| self.oracle.is_expiry_price_set(asset, terms.expiry))
    }

    /// Collateral owed to holders of `amount` expired otokens
    pub fn payout(&self, otoken: &Address, amount: u128) -> Result<u128> {
        let terms = self.otokens.terms(otoken)?;
        let spot = self.oracle.get_expiry_price(&terms.underlying, terms.expiry)?;
        let cash_value = self.intrinsic_value(&terms, spot, PriceSource::Expiry(terms.expiry))?;
        checked(mul_div_floor(amount, cash_value, one_otoken()?))
    }

    /// What the owner may take out of the vault: excess collateral while the
    /// short is live, settlement value once it expired.
    pub fn proceeds(&self, record: &VaultRecord, now: u64) -> Result<u128> {
        let vault = &record.vault;
        let collateral = vault.collateral_amount();

        if let Some((short, _)) = vault.short() {
            if !self.otokens.terms(&short)?.is_expired(now) {
                let required = self.required_collateral(record, now)?;
                return Ok(collateral.saturating_sub(required));
            }
        }

        let mut value = collateral;
        if let Some((long, amount)) = vault.long() {
            if self.otokens.terms(&long)?.is_expired(now) {
                value = value.checked_add(self.payout(&long, amount)?).ok_or(ProtocolError::Overflow)?;
            }
        }
        if let Some((short, amount)) = vault.short() {
            value = value.saturating_sub(self.payout(&short, amount)?);
        }
        Ok(value)
    }

    /// Eligibility checks in order; the error names the first one failing
    pub fn liquidation_quote(&self, record: &VaultRecord, round_id: u64, now: u64) -> Result<LiquidationQuote> {
        let params = &self.config.liquidation;
        if record.vault_type != VaultType::NakedMargin {
            return Err(ProtocolError::LiquidationNotNakedMargin);
        }
        let Some((short, short_amount)) = record.vault.short() else {
            return Err(ProtocolError::LiquidationNoShort);
        };
        let terms = self.otokens.terms(&short)?;
        if terms.is_expired(now) {
            return Err(ProtocolError::LiquidationExpired);
        }
        if now < record.latest_update.saturating_add(params.cooldown_secs) {
            return Err(ProtocolError::AdjustedRecently);
        }

        let round = self.oracle.get_historical_price(&terms.underlying, round_id)?;
        if round.timestamp <= record.latest_update {
            return Err(ProtocolError::RoundBeforeAdjustment);
        }
        if round.timestamp > now {
            return Err(ProtocolError::RoundInFuture);
        }

        let collateral = record.vault.collateral_amount();
        let required = self.naked_margin_required(&terms, short_amount, round.price, now)?;
        let lhs = checked(collateral.checked_mul(BPS))?;
        let rhs = checked(required.checked_mul(params.threshold_bps as u128))?;
        if lhs >= rhs {
            return Err(ProtocolError::NotUndercollateralized);
        }

        let ending = checked(mul_div_floor(collateral, one_otoken()?, short_amount))?;
        let starting = self
            .intrinsic_value(&terms, round.price, PriceSource::Live)?
            .min(ending);
        let debt_price = if params.auction_time_secs == 0 {
            ending
        } else {
            let elapsed = now.saturating_sub(round.timestamp).min(params.auction_time_secs);
            starting + checked(mul_div_floor(ending - starting, elapsed as u128, params.auction_time_secs as u128))?
        };

        Ok(LiquidationQuote {
            round_price: round.price,
            round_timestamp: round.timestamp,
            short_amount,
            collateral,
            required,
            debt_price,
        })
    }

    /// `Ok(false)` when an eligibility rule refuses; missing records still error
    pub fn is_liquidatable(&self, record: &VaultRecord, round_id: u64, now: u64) -> Result<bool> {
        match self.liquidation_quote(record, round_id, now) {
            Ok(_) => Ok(true),
            Err(
                ProtocolError::LiquidationNotNakedMargin
                | ProtocolError::LiquidationNoShort
                | ProtocolError::LiquidationExpired
                | ProtocolError::AdjustedRecently
                | ProtocolError::RoundBeforeAdjustment
                | ProtocolError::RoundInFuture
                | ProtocolError::NotUndercollateralized,
            ) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
