//! Price oracle
//!
//! Holds the latest real-time price per asset, a history of prices keyed by
//! round id, expiry prices used for settlement and per-asset dust limits.
//! Prices carry 8 decimals. No staleness policy lives here; callers decide
//! which record is acceptable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{ProtocolError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalPrice {
    pub price: u128,
    /// Unix timestamp the price was observed at
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    owner: Address,
    real_time: BTreeMap<Address, u128>,
    historical: BTreeMap<Address, BTreeMap<u64, HistoricalPrice>>,
    expiry: BTreeMap<Address, BTreeMap<u64, u128>>,
    dust_limits: BTreeMap<Address, u128>,
    pricers: BTreeMap<Address, Address>,
}

impl Oracle {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            real_time: BTreeMap::new(),
            historical: BTreeMap::new(),
            expiry: BTreeMap::new(),
            dust_limits: BTreeMap::new(),
            pricers: BTreeMap::new(),
        }
    }

    pub fn set_real_time_price(&mut self, asset: Address, price: u128) {
        self.real_time.insert(asset, price);
    }

    pub fn set_historical_price(&mut self, asset: Address, round_id: u64, price: u128, timestamp: u64) {
        self.historical
            .entry(asset)
            .or_default()
            .insert(round_id, HistoricalPrice { price, timestamp });
    }

    pub fn set_dust_limit(&mut self, asset: Address, amount: u128) {
        self.dust_limits.insert(asset, amount);
    }

    /// Record the settlement price of `asset` for options expiring at `expiry`
    pub fn set_expiry_price(&mut self, asset: Address, expiry: u64, price: u128) {
        self.expiry.entry(asset).or_default().insert(expiry, price);
    }

    /// Authorise `pricer` to publish expiry prices for `asset`
    pub fn set_asset_pricer(&mut self, caller: Address, asset: Address, pricer: Address) -> Result<()> {
        if caller != self.owner {
            return Err(ProtocolError::NotOwner);
        }
        self.pricers.insert(asset, pricer);
        Ok(())
    }

    pub fn asset_pricer(&self, asset: &Address) -> Option<Address> {
        self.pricers.get(asset).copied()
    }

    /// Expiry price published by the asset's registered pricer
    pub fn set_expiry_price_from_pricer(
        &mut self,
        caller: Address,
        asset: Address,
        expiry: u64,
        price: u128,
    ) -> Result<()> {
        if self.asset_pricer(&asset) != Some(caller) {
            return Err(ProtocolError::NotAssetPricer);
        }
        self.set_expiry_price(asset, expiry, price);
        Ok(())
    }

    pub fn get_price(&self, asset: &Address) -> Result<u128> {
        self.real_time.get(asset).copied().ok_or(ProtocolError::PriceNotFound(*asset))
    }

    pub fn get_historical_price(&self, asset: &Address, round_id: u64) -> Result<HistoricalPrice> {
        self.historical
            .get(asset)
            .and_then(|rounds| rounds.get(&round_id))
            .copied()
            .ok_or(ProtocolError::HistoricalPriceNotFound { asset: *asset, round_id })
    }

    pub fn get_expiry_price(&self, asset: &Address, expiry: u64) -> Result<u128> {
        self.expiry
            .get(asset)
            .and_then(|prices| prices.get(&expiry))
            .copied()
            .ok_or(ProtocolError::ExpiryPriceNotFound { asset: *asset, expiry })
    }

    pub fn is_expiry_price_set(&self, asset: &Address, expiry: u64) -> bool {
        self.get_expiry_price(asset, expiry).is_ok()
    }

    /// Dust limit for `asset`; zero when none was configured
    pub fn get_dust_limit(&self, asset: &Address) -> u128 {
        self.dust_limits.get(asset).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> Address {
        Address::from_low_u64(18)
    }

    #[test]
    fn real_time_price_overwrites() {
        let mut oracle = Oracle::new(Address::ZERO);
        assert_eq!(oracle.get_price(&weth()), Err(ProtocolError::PriceNotFound(weth())));
        oracle.set_real_time_price(weth(), 1_000 * 100_000_000);
        oracle.set_real_time_price(weth(), 900 * 100_000_000);
        assert_eq!(oracle.get_price(&weth()).unwrap(), 900 * 100_000_000);
    }

    #[test]
    fn missing_round_is_not_found() {
        let mut oracle = Oracle::new(Address::ZERO);
        oracle.set_historical_price(weth(), 15, 100_000_000, 1_700_000_060);

        let record = oracle.get_historical_price(&weth(), 15).unwrap();
        assert_eq!(record, HistoricalPrice { price: 100_000_000, timestamp: 1_700_000_060 });

        let err = oracle.get_historical_price(&weth(), 16).unwrap_err();
        assert_eq!(err, ProtocolError::HistoricalPriceNotFound { asset: weth(), round_id: 16 });
    }

    #[test]
    fn dust_limit_defaults_to_zero() {
        let mut oracle = Oracle::new(Address::ZERO);
        assert_eq!(oracle.get_dust_limit(&weth()), 0);
        oracle.set_dust_limit(weth(), 100);
        assert_eq!(oracle.get_dust_limit(&weth()), 100);
    }

    #[test]
    fn only_registered_pricer_publishes_expiry_prices() {
        let owner = Address::from_low_u64(1);
        let pricer = Address::from_low_u64(2);
        let mut oracle = Oracle::new(owner);

        assert_eq!(
            oracle.set_expiry_price_from_pricer(pricer, weth(), 1_753_776_000, 1),
            Err(ProtocolError::NotAssetPricer)
        );
        assert_eq!(oracle.set_asset_pricer(pricer, weth(), pricer), Err(ProtocolError::NotOwner));

        oracle.set_asset_pricer(owner, weth(), pricer).unwrap();
        oracle.set_expiry_price_from_pricer(pricer, weth(), 1_753_776_000, 42).unwrap();
        assert_eq!(oracle.get_expiry_price(&weth(), 1_753_776_000).unwrap(), 42);
        assert!(!oracle.is_expiry_price_set(&weth(), 1_753_862_400));
    }
}
