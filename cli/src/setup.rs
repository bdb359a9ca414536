//! Protocol initialization, assets, whitelist, oracle and admin commands

use anyhow::{Context, Result};
use colored::Colorize;
use opvault_model::{Address, PairReserves, Product, Protocol, Role};

use crate::client::{self, ChainState};
use crate::config::{NetworkConfig, ProtocolConfig};

/// Config used when `init` runs without `--config`
const DEFAULT_CONFIG: &str = r#"
[margin]
spot_shock_bps = 2500

[[margin.upper_bounds]]
max_time_to_expiry = 2592000
value_bps = 1000

[margin.liquidation]
threshold_bps = 10000
cooldown_secs = 600
auction_time_secs = 3600

[[assets]]
symbol = "USDC"
decimals = 6
collateral = true
price = 100000000

[[assets]]
symbol = "WETH"
decimals = 18
price = 100000000000

[[products]]
underlying = "WETH"
strike = "USDC"
collateral = "USDC"
"#;

pub fn default_protocol_config() -> Result<ProtocolConfig> {
    ProtocolConfig::parse(DEFAULT_CONFIG)
}

pub async fn initialize_protocol(config: &NetworkConfig) -> Result<()> {
    println!("{}", "=== Initialize Protocol ===".bright_green().bold());
    println!("{} {}", "Network:".bright_cyan(), config.network);
    println!("{} {}", "Owner:".bright_cyan(), config.sender);

    let protocol_config = match &config.config_path {
        Some(path) => {
            println!("{} {}", "Config:".bright_cyan(), path.display());
            ProtocolConfig::load(path)?
        }
        None => {
            println!("{}", "Using built-in default config".dimmed());
            default_protocol_config()?
        }
    };

    let mut state = client::load_state(config).await?;
    let hash = init_with(config, &mut state, &protocol_config).await?;

    let protocol = state.protocol()?;
    println!("\n{}", "Components:".bright_yellow());
    for role in [Role::Controller, Role::MarginPool, Role::Oracle, Role::Whitelist, Role::OtokenFactory, Role::OtokenImpl] {
        println!("  {} {}", format!("{:?}:", role).bright_cyan(), protocol.address_book.get_or_zero(role));
    }
    println!("\n{}", "Assets:".bright_yellow());
    for (address, info) in protocol.assets.iter() {
        println!("  {} {} ({} decimals)", info.symbol.bright_cyan(), address, info.decimals);
    }
    client::print_tx(&hash);
    println!("\n{}", "Protocol initialized!".bright_green().bold());
    Ok(())
}

/// Deploy the protocol, register assets and whitelist collateral and products
pub async fn init_with(config: &NetworkConfig, state: &mut ChainState, protocol_config: &ProtocolConfig) -> Result<String> {
    if state.protocol.is_some() {
        anyhow::bail!("Protocol already initialized on {}", config.network);
    }
    let (hash, ()) = client::send_and_confirm(config, state, "init", None, |state, tx| {
        let owner = tx.sender;
        let mut protocol = Protocol::deploy(owner, protocol_config.margin.clone())?;

        for asset in &protocol_config.assets {
            let address = asset.resolved_address();
            protocol
                .register_asset(address, &asset.symbol, asset.decimals)
                .with_context(|| format!("Failed to register {}", asset.symbol))?;
            if asset.collateral {
                protocol.whitelist.whitelist_collateral(owner, address)?;
            }
            if let Some(price) = asset.price {
                protocol.oracle.set_real_time_price(address, u128::from(price));
            }
            if let Some(dust) = asset.dust_limit {
                protocol.oracle.set_dust_limit(address, u128::from(dust));
            }
        }

        for product in &protocol_config.products {
            let product = Product {
                underlying: client::resolve_asset(&protocol.assets, &product.underlying)?,
                strike_asset: client::resolve_asset(&protocol.assets, &product.strike)?,
                collateral_asset: client::resolve_asset(&protocol.assets, &product.collateral)?,
            };
            protocol.whitelist.whitelist_product(owner, product)?;
        }

        state.protocol = Some(protocol);
        Ok(())
    })
    .await?;
    Ok(hash)
}

// ============================================================================
// Assets
// ============================================================================

pub async fn register_asset(config: &NetworkConfig, address: Option<String>, symbol: String, decimals: u32) -> Result<()> {
    println!("{}", "=== Register Asset ===".bright_green().bold());
    let address = match address {
        Some(text) => client::parse_address(&text)?,
        None => Address::derive("opvault.cli.asset", symbol.as_str()),
    };
    let mut state = client::load_state(config).await?;
    let (hash, ()) = client::send_and_confirm(config, &mut state, "register_asset", None, |state, _| {
        state.protocol_mut()?.register_asset(address, &symbol, decimals)?;
        Ok(())
    })
    .await?;
    println!("{} {} ({} decimals)", "Asset:".bright_cyan(), symbol, decimals);
    println!("{} {}", "Address:".bright_cyan(), address);
    client::print_tx(&hash);
    Ok(())
}

pub async fn faucet(config: &NetworkConfig, asset: String, to: Option<String>, amount: String) -> Result<()> {
    let mut state = client::load_state(config).await?;
    let to = to.map(|t| client::parse_address(&t)).transpose()?.unwrap_or(config.sender);
    let (asset, raw) = {
        let assets = &state.protocol()?.assets;
        let asset = client::resolve_asset(assets, &asset)?;
        (asset, client::parse_asset_amount(assets, &asset, &amount)?)
    };
    let (hash, ()) = client::send_and_confirm(config, &mut state, "faucet", None, |state, _| {
        state.protocol_mut()?.faucet(asset, to, raw)?;
        Ok(())
    })
    .await?;
    let protocol = state.protocol()?;
    println!(
        "{} {} to {}",
        "✓ Minted".bright_green(),
        client::format_asset_amount(&protocol.assets, &asset, raw),
        client::format_address(&to)
    );
    client::print_tx(&hash);
    Ok(())
}

pub async fn show_balance(config: &NetworkConfig, token: String, holder: Option<String>) -> Result<()> {
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let holder = holder.map(|h| client::parse_address(&h)).transpose()?.unwrap_or(config.sender);
    let token = client::resolve_asset(&protocol.assets, &token)?;
    let balance = protocol.balance_of(&token, &holder);
    let shown = match protocol.otoken(&token) {
        Ok(otoken) => format!("{} {}", client::format_units(balance, opvault_model::math::OTOKEN_DECIMALS), otoken.symbol()),
        Err(_) => client::format_asset_amount(&protocol.assets, &token, balance),
    };
    println!("{} {}", "Holder:".bright_cyan(), holder);
    println!("{} {}", "Balance:".bright_cyan(), shown);
    Ok(())
}

// ============================================================================
// Whitelist
// ============================================================================

pub enum WhitelistTarget {
    Collateral(String),
    Product { underlying: String, strike: String, collateral: String },
    Callee(String),
    Otoken(String),
}

pub async fn whitelist(config: &NetworkConfig, target: WhitelistTarget) -> Result<()> {
    let mut state = client::load_state(config).await?;
    let (hash, label) = client::send_and_confirm(config, &mut state, "whitelist", None, |state, tx| {
        let protocol = state.protocol_mut()?;
        let label = match &target {
            WhitelistTarget::Collateral(asset) => {
                let asset = client::resolve_asset(&protocol.assets, asset)?;
                protocol.whitelist.whitelist_collateral(tx.sender, asset)?;
                format!("collateral {}", asset)
            }
            WhitelistTarget::Product { underlying, strike, collateral } => {
                let product = Product {
                    underlying: client::resolve_asset(&protocol.assets, underlying)?,
                    strike_asset: client::resolve_asset(&protocol.assets, strike)?,
                    collateral_asset: client::resolve_asset(&protocol.assets, collateral)?,
                };
                protocol.whitelist.whitelist_product(tx.sender, product)?;
                format!("product {}/{}/{}", underlying, strike, collateral)
            }
            WhitelistTarget::Callee(callee) => {
                let callee = client::parse_address(callee)?;
                protocol.whitelist.whitelist_callee(tx.sender, callee)?;
                format!("callee {}", callee)
            }
            WhitelistTarget::Otoken(otoken) => {
                let otoken = client::parse_address(otoken)?;
                protocol.whitelist.whitelist_otoken(tx.sender, otoken)?;
                format!("otoken {}", otoken)
            }
        };
        Ok(label)
    })
    .await?;
    println!("{} Whitelisted {}", "✓".bright_green(), label);
    client::print_tx(&hash);
    Ok(())
}

// ============================================================================
// Oracle
// ============================================================================

pub enum OracleUpdate {
    Price { asset: String, price: String },
    Round { asset: String, round_id: u64, price: String, timestamp: Option<u64> },
    Expiry { asset: String, expiry: u64, price: String },
    Dust { asset: String, amount: String },
    Pricer { asset: String, pricer: String },
    Reserves { pair: String, asset_reserve: u128, denomination_reserve: u128 },
}

pub async fn update_oracle(config: &NetworkConfig, update: OracleUpdate) -> Result<()> {
    let mut state = client::load_state(config).await?;
    let (hash, label) = client::send_and_confirm(config, &mut state, "oracle", None, |state, tx| {
        apply_oracle_update(state.protocol_mut()?, &update, tx.sender, tx.now)
    })
    .await?;
    println!("{} {}", "✓".bright_green(), label);
    client::print_tx(&hash);
    Ok(())
}

fn apply_oracle_update(protocol: &mut Protocol, update: &OracleUpdate, sender: Address, now: u64) -> Result<String> {
    use opvault_model::math::PRICE_DECIMALS;

    Ok(match update {
        OracleUpdate::Price { asset, price } => {
            let asset = client::resolve_asset(&protocol.assets, asset)?;
            protocol.oracle.set_real_time_price(asset, client::parse_units(price, PRICE_DECIMALS)?);
            format!("Price of {} set to ${}", asset, price)
        }
        OracleUpdate::Round { asset, round_id, price, timestamp } => {
            let asset = client::resolve_asset(&protocol.assets, asset)?;
            let timestamp = timestamp.unwrap_or(now);
            protocol
                .oracle
                .set_historical_price(asset, *round_id, client::parse_units(price, PRICE_DECIMALS)?, timestamp);
            format!("Round {} of {} set to ${} at {}", round_id, asset, price, timestamp)
        }
        OracleUpdate::Expiry { asset, expiry, price } => {
            let asset = client::resolve_asset(&protocol.assets, asset)?;
            protocol.oracle.set_expiry_price(asset, *expiry, client::parse_units(price, PRICE_DECIMALS)?);
            format!("Expiry price of {} at {} set to ${}", asset, expiry, price)
        }
        OracleUpdate::Dust { asset, amount } => {
            let asset = client::resolve_asset(&protocol.assets, asset)?;
            let raw = client::parse_asset_amount(&protocol.assets, &asset, amount)?;
            protocol.oracle.set_dust_limit(asset, raw);
            format!("Dust limit of {} set to {}", asset, client::format_asset_amount(&protocol.assets, &asset, raw))
        }
        OracleUpdate::Pricer { asset, pricer } => {
            let asset = client::resolve_asset(&protocol.assets, asset)?;
            let pricer = client::parse_address(pricer)?;
            protocol.oracle.set_asset_pricer(sender, asset, pricer)?;
            format!("Pricer of {} set to {}", asset, pricer)
        }
        OracleUpdate::Reserves { pair, asset_reserve, denomination_reserve } => {
            let pair = client::parse_address(pair)?;
            let reserves = PairReserves { asset: *asset_reserve, denomination: *denomination_reserve };
            protocol.set_pair_reserves(pair, reserves);
            format!("Reserves of pair {} set to {}/{}", pair, asset_reserve, denomination_reserve)
        }
    })
}

/// Have a deployed pricer push the expiry price of its asset
pub async fn publish_expiry_price(config: &NetworkConfig, pricer: String, expiry: u64) -> Result<()> {
    let pricer = client::parse_address(&pricer)?;
    let mut state = client::load_state(config).await?;
    let (hash, price) = client::send_and_confirm(config, &mut state, "publish_expiry_price", None, |state, tx| {
        Ok(state.protocol_mut()?.publish_expiry_price(tx.sender, &pricer, expiry)?)
    })
    .await?;
    println!(
        "{} Expiry price at {} published: ${}",
        "✓".bright_green(),
        expiry,
        client::format_units(price, opvault_model::math::PRICE_DECIMALS)
    );
    client::print_tx(&hash);
    Ok(())
}

// ============================================================================
// Admin
// ============================================================================

pub enum AdminUpdate {
    PartialPause(bool),
    FullPause(bool),
    CallRestriction(bool),
    Operator { operator: String, is_operator: bool },
}

pub async fn admin(config: &NetworkConfig, update: AdminUpdate) -> Result<()> {
    let mut state = client::load_state(config).await?;
    let (hash, label) = client::send_and_confirm(config, &mut state, "admin", None, |state, tx| {
        let protocol = state.protocol_mut()?;
        Ok(match &update {
            AdminUpdate::PartialPause(paused) => {
                protocol.set_system_partially_paused(tx.sender, *paused)?;
                format!("System partially paused: {}", paused)
            }
            AdminUpdate::FullPause(paused) => {
                protocol.set_system_fully_paused(tx.sender, *paused)?;
                format!("System fully paused: {}", paused)
            }
            AdminUpdate::CallRestriction(restricted) => {
                protocol.set_call_restriction(tx.sender, *restricted)?;
                format!("Call restriction: {}", restricted)
            }
            AdminUpdate::Operator { operator, is_operator } => {
                let operator = client::parse_address(operator)?;
                protocol.set_operator(tx.sender, operator, *is_operator);
                format!("Operator {} for {}: {}", operator, tx.sender, is_operator)
            }
        })
    })
    .await?;
    println!("{} {}", "✓".bright_green(), label);
    client::print_tx(&hash);
    Ok(())
}

// ============================================================================
// Status
// ============================================================================

pub async fn query_status(config: &NetworkConfig, detailed: bool) -> Result<()> {
    println!("{}", "=== Protocol Status ===".bright_green().bold());
    println!("{} {}", "Network:".bright_cyan(), config.network);
    println!("{} {}", "State:".bright_cyan(), config.state_path.display());

    let state = client::load_state(config).await?;
    println!("{} {}", "Transactions:".bright_cyan(), state.nonce);
    let Some(protocol) = &state.protocol else {
        println!("\n{}", "Protocol not initialized".yellow());
        return Ok(());
    };

    println!("{} {}", "Owner:".bright_cyan(), protocol.owner());
    println!("{} {}", "Controller:".bright_cyan(), protocol.controller.address);
    println!("{} {}", "Margin Pool:".bright_cyan(), protocol.controller.pool);
    println!(
        "{} partial={} full={} calls restricted={}",
        "Pause:".bright_cyan(),
        protocol.controller.system_partially_paused(),
        protocol.controller.system_fully_paused(),
        protocol.controller.call_restricted()
    );
    println!("{} {}", "Otokens:".bright_cyan(), protocol.factory.otokens_length());
    println!("{} {}", "Vaults:".bright_cyan(), protocol.ledger.vaults.iter().count());
    println!("{} {}", "Pricers:".bright_cyan(), protocol.pricers.len());

    if detailed {
        println!("\n{}", "Assets:".bright_yellow());
        for (address, info) in protocol.assets.iter() {
            let price = protocol
                .oracle
                .get_price(address)
                .map(|p| format!("${}", client::format_units(p, opvault_model::math::PRICE_DECIMALS)))
                .unwrap_or_else(|_| "no price".dimmed().to_string());
            let collateral = if protocol.whitelist.is_whitelisted_collateral(address) { " [collateral]" } else { "" };
            println!("  {} {} {}{}", info.symbol.bright_cyan(), address, price, collateral);
        }

        println!("\n{}", "Recent Transactions:".bright_yellow());
        for tx in state.transactions.iter().rev().take(10) {
            println!("  #{} {} {}", tx.nonce, tx.kind.bright_cyan(), tx.hash.dimmed());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh(dir: &tempfile::TempDir) -> (NetworkConfig, ChainState) {
        let path = dir.path().join("localnet.json");
        let config = NetworkConfig::new("localnet", Some(path.display().to_string()), None, None, Some(5_000)).unwrap();
        let state = client::load_state(&config).await.unwrap();
        (config, state)
    }

    #[test]
    fn test_default_config_parses() {
        let config = default_protocol_config().unwrap();
        assert_eq!(config.margin.spot_shock_bps, 2_500);
        assert_eq!(config.margin.liquidation.threshold_bps, 10_000);
        let prices: Vec<_> = config.assets.iter().map(|a| (a.symbol.as_str(), a.price)).collect();
        assert_eq!(prices, vec![("USDC", Some(100_000_000)), ("WETH", Some(100_000_000_000))]);
        assert_eq!(config.products.len(), 1);
    }

    #[tokio::test]
    async fn test_init_registers_config() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut state) = fresh(&dir).await;
        init_with(&config, &mut state, &default_protocol_config().unwrap()).await.unwrap();

        let protocol = state.protocol().unwrap();
        assert_eq!(protocol.owner(), config.sender);
        let usdc = client::resolve_asset(&protocol.assets, "USDC").unwrap();
        let weth = client::resolve_asset(&protocol.assets, "weth").unwrap();
        assert!(protocol.whitelist.is_whitelisted_collateral(&usdc));
        assert!(!protocol.whitelist.is_whitelisted_collateral(&weth));
        assert_eq!(protocol.oracle.get_price(&weth).unwrap(), 100_000_000_000);
        let product = Product { underlying: weth, strike_asset: usdc, collateral_asset: usdc };
        assert!(protocol.whitelist.is_whitelisted_product(&product));
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut state) = fresh(&dir).await;
        let protocol_config = default_protocol_config().unwrap();
        init_with(&config, &mut state, &protocol_config).await.unwrap();
        let err = init_with(&config, &mut state, &protocol_config).await.unwrap_err();
        assert!(err.to_string().contains("already initialized"));
        assert_eq!(state.nonce, 1);
    }

    #[tokio::test]
    async fn test_oracle_updates() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut state) = fresh(&dir).await;
        init_with(&config, &mut state, &default_protocol_config().unwrap()).await.unwrap();
        let protocol = state.protocol_mut().unwrap();
        let weth = client::resolve_asset(&protocol.assets, "WETH").unwrap();
        let usdc = client::resolve_asset(&protocol.assets, "USDC").unwrap();

        let round = OracleUpdate::Round { asset: "WETH".into(), round_id: 3, price: "1500.5".into(), timestamp: None };
        apply_oracle_update(protocol, &round, config.sender, 5_000).unwrap();
        let observed = protocol.oracle.get_historical_price(&weth, 3).unwrap();
        assert_eq!(observed.price, 150_050_000_000);
        assert_eq!(observed.timestamp, 5_000);

        let dust = OracleUpdate::Dust { asset: "USDC".into(), amount: "2.5".into() };
        apply_oracle_update(protocol, &dust, config.sender, 5_000).unwrap();
        assert_eq!(protocol.oracle.get_dust_limit(&usdc), 2_500_000);

        let pricer = OracleUpdate::Pricer { asset: "WETH".into(), pricer: Address::from_low_u64(9).to_string() };
        assert!(apply_oracle_update(protocol, &pricer, Address::from_low_u64(1), 5_000).is_err());
        apply_oracle_update(protocol, &pricer, config.sender, 5_000).unwrap();
        assert_eq!(protocol.oracle.asset_pricer(&weth), Some(Address::from_low_u64(9)));
    }
}
