//! A deployed protocol instance
//!
//! Owns every component and wires them together the way a deployment would:
//! the address book names each component, the factory clones the registered
//! template, and the controller applies batches to the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::actions::ActionArgs;
use crate::address::Address;
use crate::address_book::{AddressBook, Role};
use crate::assets::AssetBook;
use crate::calculator::{LiquidationQuote, MarginCalculator, MarginConfig};
use crate::controller::{BatchError, Context, Controller, Ledger};
use crate::error::{ProtocolError, Result};
use crate::events::ControllerEvent;
use crate::factory::OtokenFactory;
use crate::oracle::Oracle;
use crate::otoken::{OptionTerms, Otoken, OtokenLogic};
use crate::pricer::{PairPricer, PairReserves, PricerParams};
use crate::vault::VaultRecord;
use crate::whitelist::Whitelist;

const DEPLOY_DOMAIN: &str = "opvault.deploy";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub address_book: AddressBook,
    pub whitelist: Whitelist,
    pub oracle: Oracle,
    pub assets: AssetBook,
    pub factory: OtokenFactory,
    pub controller: Controller,
    pub ledger: Ledger,
    #[serde(default)]
    pub pricers: BTreeMap<Address, PairPricer>,
    #[serde(default)]
    pub pairs: BTreeMap<Address, PairReserves>,
    #[serde(default)]
    pub events: Vec<ControllerEvent>,
}

/// Deterministic address of a component deployed by `owner`
pub fn component_address(owner: Address, component: &str) -> Address {
    Address::derive(DEPLOY_DOMAIN, &(owner, component))
}

impl Protocol {
    /// Deploy every component owned by `owner` and register a standard otoken template
    pub fn deploy(owner: Address, config: MarginConfig) -> Result<Self> {
        let controller = component_address(owner, "controller");
        let pool = component_address(owner, "margin_pool");
        let oracle = component_address(owner, "oracle");
        let whitelist = component_address(owner, "whitelist");
        let factory = component_address(owner, "otoken_factory");
        let template = component_address(owner, "otoken_impl");

        let mut address_book = AddressBook::new(owner);
        for (role, address) in [
            (Role::Controller, controller),
            (Role::MarginPool, pool),
            (Role::Oracle, oracle),
            (Role::Whitelist, whitelist),
            (Role::OtokenFactory, factory),
            (Role::OtokenImpl, template),
        ] {
            address_book.set(owner, role, address)?;
        }

        let mut ledger = Ledger::default();
        ledger.otokens.register_template(template, OtokenLogic::Standard)?;

        log::info!("protocol deployed by {}: controller {} pool {}", owner, controller, pool);
        Ok(Self {
            address_book,
            whitelist: Whitelist::new(owner),
            oracle: Oracle::new(owner),
            assets: AssetBook::new(),
            factory: OtokenFactory::new(factory),
            controller: Controller::new(controller, pool, owner, config),
            ledger,
            pricers: BTreeMap::new(),
            pairs: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    pub fn owner(&self) -> Address {
        self.address_book.owner()
    }

    fn context(&self) -> Context<'_> {
        Context { whitelist: &self.whitelist, oracle: &self.oracle, assets: &self.assets }
    }

    fn calculator(&self) -> MarginCalculator<'_> {
        MarginCalculator::new(self.controller.config(), &self.oracle, &self.assets, &self.ledger.otokens)
    }

    // ---- tokens ----

    pub fn register_asset(&mut self, asset: Address, symbol: &str, decimals: u32) -> Result<()> {
        self.assets.register(asset, symbol, decimals)
    }

    /// Credit plain tokens to `holder` (test faucet)
    pub fn faucet(&mut self, asset: Address, holder: Address, amount: u128) -> Result<()> {
        self.assets.info(&asset)?;
        self.ledger.balances.mint(asset, holder, amount)
    }

    /// Balance of a plain token or an otoken
    pub fn balance_of(&self, token: &Address, holder: &Address) -> u128 {
        match self.ledger.otokens.get(token) {
            Ok(otoken) => otoken.balance_of(holder),
            Err(_) => self.ledger.balances.balance_of(token, holder),
        }
    }

    pub fn otoken(&self, address: &Address) -> Result<&Otoken> {
        self.ledger.otokens.get(address)
    }

    /// Direct mint on an otoken; only permissionless logic or the controller passes
    pub fn mint_otoken(&mut self, caller: Address, otoken: Address, to: Address, amount: u128) -> Result<()> {
        self.ledger.otokens.get_mut(&otoken)?.mint(caller, to, amount)
    }

    pub fn burn_otoken(&mut self, caller: Address, otoken: Address, from: Address, amount: u128) -> Result<()> {
        self.ledger.otokens.get_mut(&otoken)?.burn(caller, from, amount)
    }

    // ---- templates and factory ----

    pub fn register_template(&mut self, caller: Address, template: Address, logic: OtokenLogic) -> Result<()> {
        if caller != self.owner() {
            return Err(ProtocolError::NotOwner);
        }
        self.ledger.otokens.register_template(template, logic)
    }

    /// Point future clones at `template`; existing instances keep theirs
    pub fn set_otoken_impl(&mut self, caller: Address, template: Address) -> Result<()> {
        self.ledger.otokens.template(&template)?;
        self.address_book.set(caller, Role::OtokenImpl, template)
    }

    /// Initialise a template itself. Allowed once, like any instance.
    pub fn init_template(&mut self, template: Address, terms: OptionTerms) -> Result<()> {
        let otoken = self.ledger.otokens.template_mut(&template)?;
        otoken.init(&self.address_book, &self.assets, terms)
    }

    pub fn target_otoken_address(&self, terms: &OptionTerms) -> Result<Address> {
        self.factory.target_otoken_address(&self.address_book, terms)
    }

    pub fn create_otoken(&mut self, terms: OptionTerms, now: u64) -> Result<Address> {
        let address = self.factory.create_otoken(
            &self.address_book,
            &self.whitelist,
            &self.assets,
            &mut self.ledger.otokens,
            terms,
            now,
        )?;
        self.whitelist
            .whitelist_created_otoken(self.factory.address, &self.address_book, address)?;
        Ok(address)
    }

    // ---- controller ----

    /// Apply a batch atomically; on failure nothing changes
    pub fn operate(
        &mut self,
        caller: Address,
        args: &[ActionArgs],
        now: u64,
    ) -> core::result::Result<Vec<ControllerEvent>, BatchError> {
        let outcome = self.controller.operate(self.context(), &self.ledger, caller, args, now)?;
        self.ledger = outcome.ledger;
        self.events.extend(outcome.events.iter().cloned());
        Ok(outcome.events)
    }

    pub fn set_operator(&mut self, caller: Address, operator: Address, is_operator: bool) {
        let event = self.controller.set_operator(caller, operator, is_operator);
        self.events.push(event);
    }

    pub fn set_system_partially_paused(&mut self, caller: Address, paused: bool) -> Result<()> {
        let event = self.controller.set_system_partially_paused(caller, paused)?;
        self.events.push(event);
        Ok(())
    }

    pub fn set_system_fully_paused(&mut self, caller: Address, paused: bool) -> Result<()> {
        let event = self.controller.set_system_fully_paused(caller, paused)?;
        self.events.push(event);
        Ok(())
    }

    pub fn set_call_restriction(&mut self, caller: Address, is_restricted: bool) -> Result<()> {
        let event = self.controller.set_call_restriction(caller, is_restricted)?;
        self.events.push(event);
        Ok(())
    }

    pub fn get_vault(&self, owner: &Address, vault_id: u64) -> Result<&VaultRecord> {
        self.ledger.vaults.get_vault(owner, vault_id)
    }

    pub fn vault_count(&self, owner: &Address) -> u64 {
        self.ledger.vaults.vault_count(owner)
    }

    pub fn required_collateral(&self, owner: &Address, vault_id: u64, now: u64) -> Result<u128> {
        self.calculator().required_collateral(self.get_vault(owner, vault_id)?, now)
    }

    /// Excess collateral, or settlement value once the short expired
    pub fn proceeds(&self, owner: &Address, vault_id: u64, now: u64) -> Result<u128> {
        self.calculator().proceeds(self.get_vault(owner, vault_id)?, now)
    }

    pub fn is_liquidatable(&self, owner: &Address, vault_id: u64, round_id: u64, now: u64) -> Result<bool> {
        self.calculator().is_liquidatable(self.get_vault(owner, vault_id)?, round_id, now)
    }

    pub fn liquidation_quote(&self, owner: &Address, vault_id: u64, round_id: u64, now: u64) -> Result<LiquidationQuote> {
        self.calculator().liquidation_quote(self.get_vault(owner, vault_id)?, round_id, now)
    }

    pub fn is_valid_final_state(&self, owner: &Address, vault_id: u64, now: u64) -> Result<bool> {
        let record = self.get_vault(owner, vault_id)?;
        Ok(self.calculator().is_valid_final_state(record, &self.whitelist, now))
    }

    // ---- pricers ----

    pub fn deploy_pricer(&mut self, address: Address, params: PricerParams) -> Result<&PairPricer> {
        let pricer = PairPricer::new(address, params)?;
        Ok(self.pricers.entry(address).or_insert(pricer))
    }

    pub fn set_pair_reserves(&mut self, pair: Address, reserves: PairReserves) {
        self.pairs.insert(pair, reserves);
    }

    /// Have `pricer` publish the expiry price of its asset from its pair's reserves
    pub fn publish_expiry_price(&mut self, caller: Address, pricer: &Address, expiry: u64) -> Result<u128> {
        let pricer = self.pricers.get(pricer).ok_or(ProtocolError::NotAssetPricer)?;
        let reserves = self.pairs.get(&pricer.params.pair).copied().unwrap_or_default();
        pricer.set_expiry_price_in_oracle(caller, &mut self.oracle, &reserves, &self.assets, expiry)
    }
}
