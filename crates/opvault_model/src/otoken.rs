//! Option tokens (otokens): terms, logic templates, instances and naming
//!
//! Instances are clones of a registered logic template. A clone is bound to
//! the template it was created from for its whole life, and is initialised
//! exactly once with immutable terms.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::address_book::{AddressBook, Role};
use crate::assets::AssetBook;
use crate::error::{ProtocolError, Result};
use crate::math::{pow10, STRIKE_DECIMALS};
use crate::whitelist::Product;

/// Immutable terms of an option
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionTerms {
    pub underlying: Address,
    pub strike_asset: Address,
    pub collateral_asset: Address,
    /// Strike price with 18 decimals
    pub strike_price: u128,
    /// Unix timestamp
    pub expiry: u64,
    pub is_put: bool,
}

impl OptionTerms {
    pub fn product(&self) -> Product {
        Product {
            underlying: self.underlying,
            strike_asset: self.strike_asset,
            collateral_asset: self.collateral_asset,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiry
    }
}

/// Behaviour bound to a logic template
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtokenLogic {
    /// Mint and burn restricted to the controller captured at initialisation
    Standard,
    /// Test double: anyone may mint and burn
    Permissionless,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otoken {
    pub address: Address,
    /// Template this instance was cloned from (itself for a template)
    pub implementation: Address,
    pub logic: OtokenLogic,
    terms: Option<OptionTerms>,
    controller: Address,
    name: String,
    symbol: String,
    balances: BTreeMap<Address, u128>,
    total_supply: u128,
}

impl Otoken {
    fn blank(address: Address, implementation: Address, logic: OtokenLogic) -> Self {
        Self {
            address,
            implementation,
            logic,
            terms: None,
            controller: Address::ZERO,
            name: String::new(),
            symbol: String::new(),
            balances: BTreeMap::new(),
            total_supply: 0,
        }
    }

    /// One-time initialisation; snapshots the controller from the address book
    pub fn init(&mut self, address_book: &AddressBook, assets: &AssetBook, terms: OptionTerms) -> Result<()> {
        if self.terms.is_some() {
            return Err(ProtocolError::AlreadyInitialized);
        }
        let (name, symbol) = name_and_symbol(assets, &terms)?;
        self.controller = address_book.get_or_zero(Role::Controller);
        self.name = name;
        self.symbol = symbol;
        self.terms = Some(terms);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.terms.is_some()
    }

    pub fn terms(&self) -> Result<&OptionTerms> {
        self.terms.as_ref().ok_or(ProtocolError::NotInitialized(self.address))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn mint(&mut self, caller: Address, to: Address, amount: u128) -> Result<()> {
        self.terms()?;
        if self.logic == OtokenLogic::Standard && caller != self.controller {
            return Err(ProtocolError::OnlyControllerMint);
        }
        let supply = self.total_supply.checked_add(amount).ok_or(ProtocolError::Overflow)?;
        let balance = self.balance_of(&to).checked_add(amount).ok_or(ProtocolError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(to, balance);
        Ok(())
    }

    pub fn burn(&mut self, caller: Address, from: Address, amount: u128) -> Result<()> {
        self.terms()?;
        if self.logic == OtokenLogic::Standard && caller != self.controller {
            return Err(ProtocolError::OnlyControllerBurn);
        }
        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(ProtocolError::InsufficientBalance { token: self.address, holder: from });
        }
        self.set_balance(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()> {
        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(ProtocolError::InsufficientBalance { token: self.address, holder: from });
        }
        self.set_balance(from, from_balance - amount);
        let to_balance = self.balance_of(&to).checked_add(amount).ok_or(ProtocolError::Overflow)?;
        self.set_balance(to, to_balance);
        Ok(())
    }

    fn set_balance(&mut self, holder: Address, amount: u128) {
        if amount == 0 {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, amount);
        }
    }
}

/// Logic templates and the instances cloned from them
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtokenBook {
    templates: BTreeMap<Address, Otoken>,
    instances: BTreeMap<Address, Otoken>,
}

impl OtokenBook {
    pub fn register_template(&mut self, address: Address, logic: OtokenLogic) -> Result<()> {
        if self.templates.contains_key(&address) || self.instances.contains_key(&address) {
            return Err(ProtocolError::ImplementationExists(address));
        }
        self.templates.insert(address, Otoken::blank(address, address, logic));
        Ok(())
    }

    pub fn template(&self, address: &Address) -> Result<&Otoken> {
        self.templates.get(address).ok_or(ProtocolError::UnknownImplementation(*address))
    }

    pub fn template_mut(&mut self, address: &Address) -> Result<&mut Otoken> {
        self.templates.get_mut(address).ok_or(ProtocolError::UnknownImplementation(*address))
    }

    /// Create an uninitialised clone of `template` at `address`
    pub fn clone_template(&mut self, template: Address, address: Address) -> Result<&mut Otoken> {
        let logic = self.template(&template)?.logic;
        if self.instances.contains_key(&address) {
            return Err(ProtocolError::OptionAlreadyCreated);
        }
        Ok(self
            .instances
            .entry(address)
            .or_insert_with(|| Otoken::blank(address, template, logic)))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.instances.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Result<&Otoken> {
        self.instances.get(address).ok_or(ProtocolError::UnknownOtoken(*address))
    }

    pub fn get_mut(&mut self, address: &Address) -> Result<&mut Otoken> {
        self.instances.get_mut(address).ok_or(ProtocolError::UnknownOtoken(*address))
    }

    /// Terms of an initialised instance
    pub fn terms(&self, address: &Address) -> Result<OptionTerms> {
        self.get(address)?.terms().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Otoken)> {
        self.instances.iter()
    }
}

/// Full name and ticker symbol for an option, e.g.
/// `ETHUSDC 29-July-2025 200Put USDC Collateral` / `oETHUSDC-29JUL25-200P`.
pub fn name_and_symbol(assets: &AssetBook, terms: &OptionTerms) -> Result<(String, String)> {
    let underlying = assets.symbol(&terms.underlying)?;
    let strike = assets.symbol(&terms.strike_asset)?;
    let collateral = assets.symbol(&terms.collateral_asset)?;
    let strike_display = displayed_strike_price(terms.strike_price);
    let (type_symbol, type_full) = if terms.is_put { ("P", "Put") } else { ("C", "Call") };

    let expiry = DateTime::<Utc>::from_timestamp(terms.expiry as i64, 0).unwrap_or_default();
    let day = expiry.format("%d");
    let month_full = expiry.format("%B");
    let month_symbol = expiry.format("%b").to_string().to_uppercase();

    let name = format!(
        "{underlying}{strike} {day}-{month_full}-{year} {strike_display}{type_full} {collateral} Collateral",
        year = expiry.format("%Y"),
    );
    let symbol = format!(
        "o{underlying}{strike}-{day}{month_symbol}{yy}-{strike_display}{type_symbol}",
        yy = expiry.format("%y"),
    );
    Ok((name, symbol))
}

/// Strike price as shown in names: integer part, plus trimmed fraction if any
pub fn displayed_strike_price(strike_price: u128) -> String {
    // 10^18 always fits in u128
    let scale = pow10(STRIKE_DECIMALS).unwrap_or(1);
    let whole = strike_price / scale;
    let fraction = strike_price % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = STRIKE_DECIMALS as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
