//! Liquidation operations

use anyhow::{Context, Result};
use colored::Colorize;
use opvault_model::math::OTOKEN_DECIMALS;
use opvault_model::{ActionArgs, Address, LiquidationQuote, Protocol};

use crate::client;
use crate::config::NetworkConfig;
use crate::margin;

fn print_quote(protocol: &Protocol, collateral_asset: Option<Address>, quote: &LiquidationQuote) {
    let shown = |raw: u128| match collateral_asset {
        Some(asset) => client::format_asset_amount(&protocol.assets, &asset, raw),
        None => raw.to_string(),
    };
    println!(
        "{} ${} at {}",
        "Round Price:".bright_cyan(),
        client::format_units(quote.round_price, opvault_model::math::PRICE_DECIMALS),
        quote.round_timestamp
    );
    println!("{} {}", "Short:".bright_cyan(), client::format_units(quote.short_amount, OTOKEN_DECIMALS));
    println!("{} {}", "Collateral:".bright_cyan(), shown(quote.collateral));
    println!("{} {}", "Required:".bright_cyan(), shown(quote.required));
    println!("{} {} per otoken", "Debt Price:".bright_cyan(), shown(quote.debt_price));
}

pub async fn quote_liquidation(config: &NetworkConfig, owner: String, vault_id: u64, round_id: u64) -> Result<()> {
    println!("{}", "=== Liquidation Quote ===".bright_green().bold());
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let owner = client::parse_address(&owner)?;
    println!("{} {} #{}", "Vault:".bright_cyan(), owner, vault_id);

    match protocol.liquidation_quote(&owner, vault_id, round_id, config.now) {
        Ok(quote) => {
            let collateral = protocol.get_vault(&owner, vault_id)?.vault.collateral().map(|(asset, _)| asset);
            print_quote(protocol, collateral, &quote);
            println!("\n{} Vault is liquidatable", "✓".bright_green());
        }
        Err(e) => println!("\n{} Not liquidatable: {}", "✗".bright_red(), e),
    }
    Ok(())
}

/// Repay `amount` (default: the whole short) of a vault's debt at `round_id`
pub async fn execute_liquidation(
    config: &NetworkConfig,
    owner: String,
    vault_id: u64,
    round_id: u64,
    amount: Option<String>,
    receiver: Option<String>,
) -> Result<()> {
    println!("{}", "=== Execute Liquidation ===".bright_green().bold());
    let mut state = client::load_state(config).await?;
    let owner = client::parse_address(&owner)?;
    let receiver = receiver.map(|r| client::parse_address(&r)).transpose()?.unwrap_or(config.sender);

    let args = {
        let protocol = state.protocol()?;
        let quote = protocol
            .liquidation_quote(&owner, vault_id, round_id, config.now)
            .with_context(|| format!("Vault {} of {} is not liquidatable at round {}", vault_id, owner, round_id))?;
        let amount = match amount {
            Some(text) => client::parse_units(&text, OTOKEN_DECIMALS)?,
            None => quote.short_amount,
        };
        let collateral = protocol.get_vault(&owner, vault_id)?.vault.collateral().map(|(asset, _)| asset);
        print_quote(protocol, collateral, &quote);
        println!("{} {}", "Repaying:".bright_cyan(), client::format_units(amount, OTOKEN_DECIMALS));
        ActionArgs::liquidate(owner, receiver, vault_id, amount, round_id)
    };

    let (hash, events) = margin::submit_batch(config, &mut state, "liquidate", vec![args]).await?;
    margin::print_events(state.protocol()?, &events);
    client::print_tx(&hash);
    Ok(())
}

/// Naked margin vaults liquidatable at `round_id`, largest shortfall first
pub async fn list_liquidatable(config: &NetworkConfig, round_id: u64) -> Result<()> {
    println!("{}", "=== Liquidatable Vaults ===".bright_green().bold());
    println!("{} {}", "Round:".bright_cyan(), round_id);

    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let scan = opvault_keeper::scan_vaults(protocol, Some(round_id), config.now, 0)?;
    let candidates = opvault_keeper::liquidation_candidates(&scan);

    if candidates.is_empty() {
        println!("\n{}", "No liquidatable vaults found".dimmed());
        return Ok(());
    }
    for health in candidates {
        if let opvault_keeper::HealthStatus::Liquidatable { debt_price } = health.status {
            println!(
                "  {} {} #{} shortfall={} debt price={}",
                "⚠".bright_red(),
                client::format_address(&health.owner),
                health.vault_id,
                health.shortfall(),
                debt_price
            );
        }
    }
    Ok(())
}

/// Past liquidations from the controller's event log
pub async fn show_history(config: &NetworkConfig, limit: usize) -> Result<()> {
    println!("{}", "=== Liquidation History ===".bright_green().bold());
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;

    let liquidations: Vec<_> = protocol
        .events
        .iter()
        .filter(|e| matches!(e, opvault_model::ControllerEvent::VaultLiquidated { .. }))
        .rev()
        .take(limit)
        .cloned()
        .collect();
    if liquidations.is_empty() {
        println!("{}", "No liquidations yet".dimmed());
        return Ok(());
    }
    margin::print_events(protocol, &liquidations);
    Ok(())
}
