//! Clone factory for otokens
//!
//! Instance addresses are a pure function of (factory, logic template,
//! terms), so a caller can predict where an option will live before it is
//! created. Each set of terms can be created at most once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::address_book::AddressBook;
use crate::assets::AssetBook;
use crate::error::{ProtocolError, Result};
use crate::otoken::{OptionTerms, OtokenBook};
use crate::whitelist::Whitelist;

const CLONE_DOMAIN: &str = "opvault.otoken.clone";
const TERMS_DOMAIN: &str = "opvault.otoken.terms";

/// Seconds past midnight UTC every expiry must fall on
pub const EXPIRY_SECONDS_OF_DAY: u64 = 8 * 60 * 60;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtokenFactory {
    pub address: Address,
    /// Created instances in creation order
    otokens: Vec<Address>,
    /// Terms id -> instance
    by_terms: BTreeMap<Address, Address>,
}

impl OtokenFactory {
    pub fn new(address: Address) -> Self {
        Self { address, otokens: Vec::new(), by_terms: BTreeMap::new() }
    }

    /// Address `create_otoken` would produce for `terms` under `template`
    pub fn target_address(&self, template: Address, terms: &OptionTerms) -> Address {
        Address::derive(CLONE_DOMAIN, &(self.address, template, terms))
    }

    /// Predicted address under the template currently registered in the address book
    pub fn target_otoken_address(&self, address_book: &AddressBook, terms: &OptionTerms) -> Result<Address> {
        Ok(self.target_address(address_book.otoken_impl()?, terms))
    }

    pub fn get_otoken(&self, terms: &OptionTerms) -> Option<Address> {
        self.by_terms.get(&terms_id(terms)).copied()
    }

    pub fn otokens(&self) -> &[Address] {
        &self.otokens
    }

    pub fn otokens_length(&self) -> usize {
        self.otokens.len()
    }

    /// Clone the registered template and initialise the instance with `terms`
    pub fn create_otoken(
        &mut self,
        address_book: &AddressBook,
        whitelist: &Whitelist,
        assets: &AssetBook,
        book: &mut OtokenBook,
        terms: OptionTerms,
        now: u64,
    ) -> Result<Address> {
        if terms.expiry <= now {
            return Err(ProtocolError::ExpiredOption);
        }
        if terms.expiry % SECONDS_PER_DAY != EXPIRY_SECONDS_OF_DAY {
            return Err(ProtocolError::ExpiryNotAtEightUtc);
        }
        if !whitelist.is_whitelisted_product(&terms.product()) {
            return Err(ProtocolError::UnsupportedProduct);
        }
        let id = terms_id(&terms);
        if self.by_terms.contains_key(&id) {
            return Err(ProtocolError::OptionAlreadyCreated);
        }

        let template = address_book.otoken_impl()?;
        let target = self.target_address(template, &terms);
        let otoken = book.clone_template(template, target)?;
        otoken.init(address_book, assets, terms)?;
        log::info!("otoken created: {} {} at {}", otoken.symbol(), otoken.name(), target);

        self.otokens.push(target);
        self.by_terms.insert(id, target);
        Ok(target)
    }
}

fn terms_id(terms: &OptionTerms) -> Address {
    Address::derive(TERMS_DOMAIN, terms)
}
