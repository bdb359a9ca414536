//! Vault management: actions, batches and margin requirements

use anyhow::{Context, Result};
use colored::Colorize;
use opvault_model::math::OTOKEN_DECIMALS;
use opvault_model::{ActionArgs, Address, ControllerEvent, Protocol, VaultType};
use std::path::PathBuf;

use crate::client::{self, ChainState};
use crate::config::NetworkConfig;

pub enum VaultCommand {
    Open { vault_id: Option<u64>, naked: bool },
    Deposit { vault_id: u64, asset: String, amount: String },
    Withdraw { vault_id: u64, asset: String, amount: String },
    DepositLong { vault_id: u64, otoken: String, amount: String },
    WithdrawLong { vault_id: u64, otoken: String, amount: String },
    Mint { vault_id: u64, otoken: String, amount: String },
    Burn { vault_id: u64, otoken: String, amount: String },
    Settle { vault_id: u64 },
    Redeem { otoken: String, amount: String },
}

/// Translate a command into controller action arguments.
///
/// `owner` is the vault owner (the sender unless acting as an operator);
/// assets move from and to the sender.
pub fn build_action(protocol: &Protocol, owner: Address, sender: Address, command: &VaultCommand) -> Result<(&'static str, ActionArgs)> {
    let otoken_amount = |text: &str| client::parse_units(text, OTOKEN_DECIMALS);
    let otoken = |text: &str| -> Result<Address> {
        let address = client::parse_address(text)?;
        protocol.otoken(&address).with_context(|| format!("Not an otoken: {}", address))?;
        Ok(address)
    };

    Ok(match command {
        VaultCommand::Open { vault_id, naked } => {
            let vault_id = vault_id.unwrap_or_else(|| protocol.vault_count(&owner) + 1);
            let vault_type = if *naked { VaultType::NakedMargin } else { VaultType::FullyCollateralized };
            ("open_vault", ActionArgs::open_vault(owner, vault_id, vault_type))
        }
        VaultCommand::Deposit { vault_id, asset, amount } => {
            let asset = client::resolve_asset(&protocol.assets, asset)?;
            let amount = client::parse_asset_amount(&protocol.assets, &asset, amount)?;
            ("deposit_collateral", ActionArgs::deposit_collateral(owner, sender, asset, *vault_id, amount))
        }
        VaultCommand::Withdraw { vault_id, asset, amount } => {
            let asset = client::resolve_asset(&protocol.assets, asset)?;
            let amount = client::parse_asset_amount(&protocol.assets, &asset, amount)?;
            ("withdraw_collateral", ActionArgs::withdraw_collateral(owner, sender, asset, *vault_id, amount))
        }
        VaultCommand::DepositLong { vault_id, otoken: address, amount } => {
            let args = ActionArgs::deposit_long(owner, sender, otoken(address.as_str())?, *vault_id, otoken_amount(amount.as_str())?);
            ("deposit_long", args)
        }
        VaultCommand::WithdrawLong { vault_id, otoken: address, amount } => {
            let args = ActionArgs::withdraw_long(owner, sender, otoken(address.as_str())?, *vault_id, otoken_amount(amount.as_str())?);
            ("withdraw_long", args)
        }
        VaultCommand::Mint { vault_id, otoken: address, amount } => {
            let args = ActionArgs::mint_short(owner, sender, otoken(address.as_str())?, *vault_id, otoken_amount(amount.as_str())?);
            ("mint_short", args)
        }
        VaultCommand::Burn { vault_id, otoken: address, amount } => {
            let args = ActionArgs::burn_short(owner, sender, otoken(address.as_str())?, *vault_id, otoken_amount(amount.as_str())?);
            ("burn_short", args)
        }
        VaultCommand::Settle { vault_id } => ("settle_vault", ActionArgs::settle_vault(owner, sender, *vault_id)),
        VaultCommand::Redeem { otoken: address, amount } => {
            ("redeem", ActionArgs::redeem(sender, otoken(address.as_str())?, otoken_amount(amount.as_str())?))
        }
    })
}

/// Submit a batch through the controller in one transaction
pub async fn submit_batch(
    config: &NetworkConfig,
    state: &mut ChainState,
    kind: &str,
    args: Vec<ActionArgs>,
) -> Result<(String, Vec<ControllerEvent>)> {
    client::send_and_confirm(config, state, kind, None, |state, tx| {
        let protocol = state.protocol_mut()?;
        match protocol.operate(tx.sender, &args, tx.now) {
            Ok(events) => Ok(events),
            Err(e) => {
                log::warn!("batch of {} actions reverted at {}", args.len(), e.stage);
                Err(anyhow::Error::new(e))
            }
        }
    })
    .await
}

pub async fn run_vault_command(config: &NetworkConfig, owner: Option<String>, command: VaultCommand) -> Result<()> {
    let mut state = client::load_state(config).await?;
    let owner = owner.map(|o| client::parse_address(&o)).transpose()?.unwrap_or(config.sender);
    let (kind, args) = build_action(state.protocol()?, owner, config.sender, &command)?;

    println!("{}", format!("=== {} ===", kind).bright_green().bold());
    let (hash, events) = submit_batch(config, &mut state, kind, vec![args]).await?;
    print_events(state.protocol()?, &events);
    client::print_tx(&hash);
    Ok(())
}

/// Submit a batch read from a JSON file of action arguments
pub async fn operate_file(config: &NetworkConfig, path: PathBuf) -> Result<()> {
    println!("{}", "=== Operate ===".bright_green().bold());
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    let args: Vec<ActionArgs> =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse batch file: {}", path.display()))?;
    println!("{} {}", "Actions:".bright_cyan(), args.len());

    let mut state = client::load_state(config).await?;
    let (hash, events) = submit_batch(config, &mut state, "operate", args).await?;
    print_events(state.protocol()?, &events);
    client::print_tx(&hash);
    Ok(())
}

pub fn print_events(protocol: &Protocol, events: &[ControllerEvent]) {
    let amount = |asset: &Address, raw: u128| client::format_asset_amount(&protocol.assets, asset, raw);
    let options = |raw: u128| client::format_units(raw, OTOKEN_DECIMALS);

    for event in events {
        let line = match event {
            ControllerEvent::VaultOpened { owner, vault_id, vault_type } => {
                format!("Vault {} opened for {} (type {})", vault_id, client::format_address(owner), vault_type)
            }
            ControllerEvent::CollateralDeposited { asset, vault_id, amount: raw, .. } => {
                format!("Deposited {} into vault {}", amount(asset, *raw), vault_id)
            }
            ControllerEvent::CollateralWithdrawn { asset, vault_id, amount: raw, .. } => {
                format!("Withdrew {} from vault {}", amount(asset, *raw), vault_id)
            }
            ControllerEvent::LongOtokenDeposited { otoken, vault_id, amount: raw, .. } => {
                format!("Deposited {} long {} into vault {}", options(*raw), client::format_address(otoken), vault_id)
            }
            ControllerEvent::LongOtokenWithdrawn { otoken, vault_id, amount: raw, .. } => {
                format!("Withdrew {} long {} from vault {}", options(*raw), client::format_address(otoken), vault_id)
            }
            ControllerEvent::ShortOtokenMinted { otoken, vault_id, amount: raw, .. } => {
                format!("Minted {} {} from vault {}", options(*raw), client::format_address(otoken), vault_id)
            }
            ControllerEvent::ShortOtokenBurned { otoken, vault_id, amount: raw, .. } => {
                format!("Burned {} {} in vault {}", options(*raw), client::format_address(otoken), vault_id)
            }
            ControllerEvent::Redeem { otoken, collateral, otoken_burned, payout, .. } => format!(
                "Redeemed {} {} for {}",
                options(*otoken_burned),
                client::format_address(otoken),
                amount(collateral, *payout)
            ),
            ControllerEvent::VaultSettled { vault_id, payout, .. } => {
                format!("Settled vault {}, payout {} (raw collateral units)", vault_id, payout)
            }
            ControllerEvent::VaultLiquidated { vault_id, round_id, debt_amount, collateral_payout, .. } => format!(
                "Liquidated {} from vault {} at round {}, payout {} (raw collateral units)",
                options(*debt_amount),
                vault_id,
                round_id,
                collateral_payout
            ),
            ControllerEvent::CallExecuted { to, data, .. } => {
                format!("Called {} with {} bytes", client::format_address(to), data.len())
            }
            other => format!("{:?}", other),
        };
        println!("  {} {}", "✓".bright_green(), line);
    }
}

pub async fn show_vault(config: &NetworkConfig, owner: Option<String>, vault_id: u64) -> Result<()> {
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let owner = owner.map(|o| client::parse_address(&o)).transpose()?.unwrap_or(config.sender);
    let record = protocol.get_vault(&owner, vault_id)?;

    println!("{}", "=== Vault ===".bright_green().bold());
    println!("{} {}", "Owner:".bright_cyan(), owner);
    println!("{} {}", "Vault ID:".bright_cyan(), vault_id);
    println!("{} {:?}", "Type:".bright_cyan(), record.vault_type);
    println!("{} {}", "Latest Update:".bright_cyan(), record.latest_update);

    let vault = &record.vault;
    match vault.short() {
        Some((otoken, amount)) => println!(
            "{} {} {}",
            "Short:".bright_cyan(),
            client::format_units(amount, OTOKEN_DECIMALS),
            protocol.otoken(&otoken).map(|o| o.symbol().to_string()).unwrap_or_else(|_| otoken.to_string())
        ),
        None => println!("{} {}", "Short:".bright_cyan(), "none".dimmed()),
    }
    match vault.long() {
        Some((otoken, amount)) => println!(
            "{} {} {}",
            "Long:".bright_cyan(),
            client::format_units(amount, OTOKEN_DECIMALS),
            protocol.otoken(&otoken).map(|o| o.symbol().to_string()).unwrap_or_else(|_| otoken.to_string())
        ),
        None => println!("{} {}", "Long:".bright_cyan(), "none".dimmed()),
    }
    match vault.collateral() {
        Some((asset, amount)) => println!(
            "{} {}",
            "Collateral:".bright_cyan(),
            client::format_asset_amount(&protocol.assets, &asset, amount)
        ),
        None => println!("{} {}", "Collateral:".bright_cyan(), "none".dimmed()),
    }
    Ok(())
}

pub async fn list_vaults(config: &NetworkConfig, owner: Option<String>) -> Result<()> {
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let owner = owner.map(|o| client::parse_address(&o)).transpose()?;

    println!("{}", "=== Vaults ===".bright_green().bold());
    let mut count = 0;
    for (vault_owner, vault_id, record) in protocol.ledger.vaults.iter() {
        if owner.is_some_and(|o| o != vault_owner) {
            continue;
        }
        count += 1;
        println!(
            "  {} #{} {:?} short={} collateral={}",
            client::format_address(&vault_owner),
            vault_id,
            record.vault_type,
            client::format_units(record.vault.short_amount(), OTOKEN_DECIMALS),
            record.vault.collateral_amount()
        );
    }
    if count == 0 {
        println!("{}", "No vaults".dimmed());
    }
    Ok(())
}

pub async fn show_margin_requirements(config: &NetworkConfig, owner: Option<String>, vault_id: u64) -> Result<()> {
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let owner = owner.map(|o| client::parse_address(&o)).transpose()?.unwrap_or(config.sender);
    let record = protocol.get_vault(&owner, vault_id)?;

    println!("{}", "=== Margin Requirements ===".bright_green().bold());
    println!("{} {} #{}", "Vault:".bright_cyan(), owner, vault_id);

    let required = protocol.required_collateral(&owner, vault_id, config.now)?;
    let proceeds = protocol.proceeds(&owner, vault_id, config.now)?;
    let valid = protocol.is_valid_final_state(&owner, vault_id, config.now)?;
    let shown = |raw: u128| match record.vault.collateral() {
        Some((asset, _)) => client::format_asset_amount(&protocol.assets, &asset, raw),
        None => raw.to_string(),
    };

    println!("{} {}", "Collateral:".bright_cyan(), shown(record.vault.collateral_amount()));
    println!("{} {}", "Required:".bright_cyan(), shown(required));
    println!("{} {}", "Proceeds:".bright_cyan(), shown(proceeds));
    println!(
        "{} {}",
        "Valid Final State:".bright_cyan(),
        if valid { "✓".bright_green() } else { "✗".bright_red() }
    );
    Ok(())
}
