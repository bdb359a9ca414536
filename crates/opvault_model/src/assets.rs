//! Asset metadata and fungible token balances

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{ProtocolError, Result};

/// Symbol used for the zero address (native currency)
pub const NATIVE_SYMBOL: &str = "ETH";
pub const NATIVE_DECIMALS: u32 = 18;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub symbol: String,
    pub decimals: u32,
}

/// Registry of token metadata (symbol, decimals)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBook {
    assets: BTreeMap<Address, AssetInfo>,
}

impl AssetBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token. Metadata is immutable once registered.
    pub fn register(&mut self, asset: Address, symbol: &str, decimals: u32) -> Result<()> {
        if asset.is_zero() || self.assets.contains_key(&asset) {
            return Err(ProtocolError::AssetAlreadyRegistered(asset));
        }
        self.assets.insert(asset, AssetInfo { symbol: symbol.to_string(), decimals });
        Ok(())
    }

    pub fn info(&self, asset: &Address) -> Result<AssetInfo> {
        if asset.is_zero() {
            return Ok(AssetInfo { symbol: NATIVE_SYMBOL.to_string(), decimals: NATIVE_DECIMALS });
        }
        self.assets.get(asset).cloned().ok_or(ProtocolError::UnknownAsset(*asset))
    }

    pub fn decimals(&self, asset: &Address) -> Result<u32> {
        self.info(asset).map(|i| i.decimals)
    }

    pub fn symbol(&self, asset: &Address) -> Result<String> {
        self.info(asset).map(|i| i.symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &AssetInfo)> {
        self.assets.iter()
    }
}

/// Balances of plain (non-option) tokens, keyed token -> holder
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalances {
    balances: BTreeMap<Address, BTreeMap<Address, u128>>,
}

impl TokenBalances {
    pub fn balance_of(&self, token: &Address, holder: &Address) -> u128 {
        self.balances
            .get(token)
            .and_then(|h| h.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// Credit `amount` out of thin air (test faucet / bridge-in)
    pub fn mint(&mut self, token: Address, holder: Address, amount: u128) -> Result<()> {
        let entry = self.balances.entry(token).or_default().entry(holder).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(ProtocolError::Overflow)?;
        Ok(())
    }

    pub fn transfer(&mut self, token: Address, from: Address, to: Address, amount: u128) -> Result<()> {
        let from_balance = self.balance_of(&token, &from);
        if from_balance < amount {
            return Err(ProtocolError::InsufficientBalance { token, holder: from });
        }
        let holders = self.balances.entry(token).or_default();
        holders.insert(from, from_balance - amount);
        let to_balance = holders.entry(to).or_insert(0);
        *to_balance = to_balance.checked_add(amount).ok_or(ProtocolError::Overflow)?;
        holders.retain(|_, b| *b > 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_address_is_native() {
        let book = AssetBook::new();
        let info = book.info(&Address::ZERO).unwrap();
        assert_eq!(info.symbol, "ETH");
        assert_eq!(info.decimals, 18);
    }

    #[test]
    fn register_once() {
        let mut book = AssetBook::new();
        let usdc = Address::from_low_u64(1);
        book.register(usdc, "USDC", 6).unwrap();
        assert_eq!(book.decimals(&usdc).unwrap(), 6);
        assert_eq!(book.register(usdc, "USDC", 6), Err(ProtocolError::AssetAlreadyRegistered(usdc)));
        assert_eq!(
            book.info(&Address::from_low_u64(2)),
            Err(ProtocolError::UnknownAsset(Address::from_low_u64(2)))
        );
    }

    #[test]
    fn transfer_moves_exact_amount() {
        let token = Address::from_low_u64(1);
        let alice = Address::from_low_u64(10);
        let bob = Address::from_low_u64(11);
        let mut balances = TokenBalances::default();
        balances.mint(token, alice, 100).unwrap();

        balances.transfer(token, alice, bob, 40).unwrap();
        assert_eq!(balances.balance_of(&token, &alice), 60);
        assert_eq!(balances.balance_of(&token, &bob), 40);

        let err = balances.transfer(token, bob, alice, 41).unwrap_err();
        assert_eq!(err, ProtocolError::InsufficientBalance { token, holder: bob });
        assert_eq!(balances.balance_of(&token, &bob), 40);
    }
}
