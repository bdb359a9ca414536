//! Token registry: whitelisted collateral, option instruments, products and callees
//!
//! Whitelisting is append-only.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::address_book::{AddressBook, Role};
use crate::error::{ProtocolError, Result};

/// (underlying, strike asset, collateral asset) triple an option may be created for
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Product {
    pub underlying: Address,
    pub strike_asset: Address,
    pub collateral_asset: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    owner: Address,
    collateral: BTreeSet<Address>,
    otokens: BTreeSet<Address>,
    products: BTreeSet<Product>,
    callees: BTreeSet<Address>,
}

impl Whitelist {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            collateral: BTreeSet::new(),
            otokens: BTreeSet::new(),
            products: BTreeSet::new(),
            callees: BTreeSet::new(),
        }
    }

    fn only_owner(&self, caller: Address) -> Result<()> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(ProtocolError::NotOwner)
        }
    }

    pub fn whitelist_collateral(&mut self, caller: Address, asset: Address) -> Result<()> {
        self.only_owner(caller)?;
        self.collateral.insert(asset);
        Ok(())
    }

    pub fn whitelist_otoken(&mut self, caller: Address, otoken: Address) -> Result<()> {
        self.only_owner(caller)?;
        self.otokens.insert(otoken);
        Ok(())
    }

    /// Whitelisting performed by the owner or by the registered otoken factory
    pub fn whitelist_created_otoken(&mut self, caller: Address, address_book: &AddressBook, otoken: Address) -> Result<()> {
        if address_book.get(Role::OtokenFactory) != Some(caller) {
            self.only_owner(caller)?;
        }
        self.otokens.insert(otoken);
        Ok(())
    }

    pub fn whitelist_product(&mut self, caller: Address, product: Product) -> Result<()> {
        self.only_owner(caller)?;
        self.products.insert(product);
        Ok(())
    }

    pub fn whitelist_callee(&mut self, caller: Address, callee: Address) -> Result<()> {
        self.only_owner(caller)?;
        self.callees.insert(callee);
        Ok(())
    }

    pub fn is_whitelisted_collateral(&self, asset: &Address) -> bool {
        self.collateral.contains(asset)
    }

    pub fn is_whitelisted_otoken(&self, otoken: &Address) -> bool {
        self.otokens.contains(otoken)
    }

    pub fn is_whitelisted_product(&self, product: &Product) -> bool {
        self.products.contains(product)
    }

    pub fn is_whitelisted_callee(&self, callee: &Address) -> bool {
        self.callees.contains(callee)
    }
}
