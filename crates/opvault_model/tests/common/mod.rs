//! Shared fixture: a deployed protocol with USDC and WETH registered and funded accounts

#![allow(dead_code)]

use opvault_model::*;

pub const E18: u128 = 1_000_000_000_000_000_000;
pub const USDC: u128 = 1_000_000;
pub const USD: u128 = 100_000_000;
pub const DAY: u64 = 86_400;
pub const HOUR: u64 = 3_600;

/// 2025-07-29 08:00 UTC
pub const EXPIRY: u64 = 1_753_776_000;
pub const NOW: u64 = EXPIRY - 10 * DAY;

pub fn margin_config() -> MarginConfig {
    MarginConfig {
        spot_shock_bps: 2_500,
        upper_bounds: vec![
            UpperBound { max_time_to_expiry: 7 * DAY, value_bps: 800 },
            UpperBound { max_time_to_expiry: 30 * DAY, value_bps: 1_000 },
        ],
        liquidation: LiquidationParams { threshold_bps: 10_000, cooldown_secs: HOUR, auction_time_secs: HOUR },
    }
}

pub struct World {
    pub protocol: Protocol,
    pub owner: Address,
    pub alice: Address,
    pub operator: Address,
    pub liquidator: Address,
    pub random: Address,
    pub usdc: Address,
    pub weth: Address,
}

pub fn world() -> World {
    let owner = Address::from_low_u64(1);
    let usdc = Address::from_low_u64(0x05dc);
    let weth = Address::from_low_u64(0x0e7f);
    let mut protocol = Protocol::deploy(owner, margin_config()).unwrap();
    protocol.register_asset(usdc, "USDC", 6).unwrap();
    protocol.register_asset(weth, "WETH", 18).unwrap();
    protocol.oracle.set_real_time_price(weth, 1_000 * USD);
    protocol.oracle.set_real_time_price(usdc, USD);

    let mut world = World {
        protocol,
        owner,
        alice: Address::from_low_u64(10),
        operator: Address::from_low_u64(11),
        liquidator: Address::from_low_u64(12),
        random: Address::from_low_u64(13),
        usdc,
        weth,
    };
    for account in [world.alice, world.operator, world.random] {
        world.protocol.faucet(usdc, account, 10_000 * USDC).unwrap();
    }
    world
}

impl World {
    pub fn put_terms(&self, strike: u128) -> OptionTerms {
        OptionTerms {
            underlying: self.weth,
            strike_asset: self.usdc,
            collateral_asset: self.usdc,
            strike_price: strike * E18,
            expiry: EXPIRY,
            is_put: true,
        }
    }

    /// Whitelist the WETH/USDC/USDC product and create a put through the factory
    pub fn create_put(&mut self, strike: u128) -> Address {
        let product = Product { underlying: self.weth, strike_asset: self.usdc, collateral_asset: self.usdc };
        self.protocol.whitelist.whitelist_product(self.owner, product).unwrap();
        let terms = self.put_terms(strike);
        self.protocol.create_otoken(terms, NOW).unwrap()
    }

    pub fn whitelist_usdc(&mut self) {
        self.protocol.whitelist.whitelist_collateral(self.owner, self.usdc).unwrap();
    }

    pub fn usdc_balance(&self, holder: &Address) -> u128 {
        self.protocol.balance_of(&self.usdc, holder)
    }

    pub fn pool(&self) -> Address {
        self.protocol.controller.pool
    }
}
