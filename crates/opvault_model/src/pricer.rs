//! Pair pricer
//!
//! Derives an asset price from the reserves of a constant-product trading
//! pair and lets an operator (bot) publish it to the oracle as an expiry
//! price.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::assets::AssetBook;
use crate::error::{ProtocolError, Result};
use crate::math::{mul_div_floor, pow10, PRICE_DECIMALS};
use crate::oracle::Oracle;

/// Reserves of a two-asset pair, in raw token units
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReserves {
    pub asset: u128,
    pub denomination: u128,
}

/// Constructor arguments of a pair pricer deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricerParams {
    pub bot: Address,
    pub asset: Address,
    pub price_emitter: Address,
    pub pair: Address,
    pub denomination_token: Address,
    pub oracle: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairPricer {
    pub address: Address,
    pub params: PricerParams,
}

impl PairPricer {
    pub fn new(address: Address, params: PricerParams) -> Result<Self> {
        let required = [
            ("bot", params.bot),
            ("asset", params.asset),
            ("price emitter", params.price_emitter),
            ("pair", params.pair),
            ("denomination token", params.denomination_token),
            ("oracle", params.oracle),
        ];
        if let Some((name, _)) = required.iter().find(|(_, address)| address.is_zero()) {
            return Err(ProtocolError::PricerZeroAddress(*name));
        }
        Ok(Self { address, params })
    }

    /// Asset price in the denomination token, with 8 decimals
    pub fn price(&self, reserves: &PairReserves, assets: &AssetBook) -> Result<u128> {
        if reserves.asset == 0 || reserves.denomination == 0 {
            return Err(ProtocolError::EmptyReserves);
        }
        let asset_decimals = assets.decimals(&self.params.asset)?;
        let denomination_decimals = assets.decimals(&self.params.denomination_token)?;

        // (denomination / 10^dd) / (asset / 10^da) * 10^8
        let numerator = reserves
            .denomination
            .checked_mul(pow10(asset_decimals).ok_or(ProtocolError::Overflow)?)
            .ok_or(ProtocolError::Overflow)?;
        let denominator = reserves
            .asset
            .checked_mul(pow10(denomination_decimals).ok_or(ProtocolError::Overflow)?)
            .ok_or(ProtocolError::Overflow)?;
        let scale = pow10(PRICE_DECIMALS).ok_or(ProtocolError::Overflow)?;
        mul_div_floor(numerator, scale, denominator).ok_or(ProtocolError::Overflow)
    }

    /// Publish the current pair price as the expiry price of the asset.
    /// Only the configured bot may call this.
    pub fn set_expiry_price_in_oracle(
        &self,
        caller: Address,
        oracle: &mut Oracle,
        reserves: &PairReserves,
        assets: &AssetBook,
        expiry: u64,
    ) -> Result<u128> {
        if caller != self.params.bot {
            return Err(ProtocolError::PricerUnauthorized);
        }
        let price = self.price(reserves, assets)?;
        oracle.set_expiry_price_from_pricer(self.address, self.params.asset, expiry, price)?;
        log::info!("pricer {} set expiry price {} for {} at {}", self.address, price, self.params.asset, expiry);
        Ok(price)
    }
}
