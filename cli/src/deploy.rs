//! Pair pricer deployment

use anyhow::{Context, Result};
use colored::Colorize;
use opvault_model::{Address, PricerParams, Role};

use crate::client::{self, ChainState};
use crate::config::NetworkConfig;

/// Constructor arguments as given on the command line
pub struct PricerArgs {
    pub bot: String,
    pub asset: String,
    pub price_emitter: String,
    pub pair: String,
    pub denomination_token: String,
    pub oracle: String,
    pub gas_price: Option<u128>,
}

/// Address a contract created by `sender` at `nonce` lands at
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    Address::derive("opvault.create", &(sender, nonce))
}

pub async fn deploy_pricer(config: &NetworkConfig, args: PricerArgs) -> Result<Address> {
    println!("{}", format!("Deploying pair pricer contract on {} 🍕", config.network).bright_green().bold());

    let mut state = client::load_state(config).await?;
    let params = resolve_params(&state, &args)?;

    println!("{} {}", "Bot:".bright_cyan(), params.bot);
    println!("{} {}", "Asset:".bright_cyan(), params.asset);
    println!("{} {}", "Price Emitter:".bright_cyan(), params.price_emitter);
    println!("{} {}", "Pair:".bright_cyan(), params.pair);
    println!("{} {}", "Denomination Token:".bright_cyan(), params.denomination_token);
    println!("{} {}", "Oracle:".bright_cyan(), params.oracle);
    if let Some(gas_price) = args.gas_price {
        println!("{} {} wei", "Gas Price:".bright_cyan(), gas_price);
    }

    let (hash, address) = deploy_with(config, &mut state, params, args.gas_price).await?;

    println!("\n{}", "Pair pricer deployed! 🎉".bright_green().bold());
    println!("{} {}", "Transaction hash:".bright_cyan(), hash);
    println!("{} {}", "Deployed contract address:".bright_cyan(), address);
    Ok(address)
}

/// Create the pricer in one create-and-wait transaction
pub async fn deploy_with(
    config: &NetworkConfig,
    state: &mut ChainState,
    params: PricerParams,
    gas_price: Option<u128>,
) -> Result<(String, Address)> {
    client::send_and_confirm(config, state, "deploy_pricer", gas_price, |state, tx| {
        let protocol = state.protocol_mut()?;
        let oracle = protocol.address_book.get(Role::Oracle).context("Oracle not registered")?;
        if params.oracle != oracle {
            anyhow::bail!("Oracle {} is not the deployed oracle {}", params.oracle, oracle);
        }
        protocol.assets.info(&params.asset).context("Pricer asset not registered")?;
        protocol
            .assets
            .info(&params.denomination_token)
            .context("Denomination token not registered")?;

        let address = create_address(&tx.sender, tx.nonce);
        protocol.deploy_pricer(address, params)?;
        Ok(address)
    })
    .await
}

fn resolve_params(state: &ChainState, args: &PricerArgs) -> Result<PricerParams> {
    let assets = &state.protocol()?.assets;
    Ok(PricerParams {
        bot: client::parse_address(&args.bot)?,
        asset: client::resolve_asset(assets, &args.asset)?,
        price_emitter: client::parse_address(&args.price_emitter)?,
        pair: client::parse_address(&args.pair)?,
        denomination_token: client::resolve_asset(assets, &args.denomination_token)?,
        oracle: client::parse_address(&args.oracle)?,
    })
}
