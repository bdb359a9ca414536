//! Keeper bot operations and monitoring

use anyhow::Result;
use colored::Colorize;
use opvault_keeper::{HealthStatus, VaultHealth};
use opvault_model::ActionArgs;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::client;
use crate::config::NetworkConfig;
use crate::margin;

fn status_label(health: &VaultHealth) -> colored::ColoredString {
    match health.status {
        HealthStatus::Idle => "idle".dimmed(),
        HealthStatus::Healthy => "healthy".bright_green(),
        HealthStatus::PreLiquidation => "pre-liquidation".yellow(),
        HealthStatus::Liquidatable { .. } => "liquidatable".bright_red(),
        HealthStatus::Expired => "expired".blue(),
    }
}

/// One-off health report of every vault
pub async fn scan(config: &NetworkConfig, round_id: Option<u64>, buffer_bps: u64) -> Result<()> {
    println!("{}", "=== Vault Health ===".bright_green().bold());
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let report = opvault_keeper::scan_vaults(protocol, round_id, config.now, buffer_bps)?;

    if report.is_empty() {
        println!("{}", "No vaults".dimmed());
        return Ok(());
    }
    for health in &report {
        println!(
            "  {} #{} {:?} collateral={} required={} health={} {}",
            client::format_address(&health.owner),
            health.vault_id,
            health.vault_type,
            health.collateral,
            health.required,
            health.health(),
            status_label(health)
        );
    }
    let liquidatable = opvault_keeper::liquidation_candidates(&report).len();
    println!("\n{} {}/{}", "Liquidatable:".bright_cyan(), liquidatable, report.len());
    Ok(())
}

pub async fn run_keeper(config: &NetworkConfig, round_id: u64, interval: u64, monitor_only: bool, max_ticks: Option<u64>) -> Result<()> {
    println!("{}", "=== Starting Keeper Bot ===".bright_green().bold());
    println!("{} {}", "Round:".bright_cyan(), round_id);
    println!("{} {}s", "Interval:".bright_cyan(), interval);
    println!("{} {}", "Monitor Only:".bright_cyan(), if monitor_only { "Yes" } else { "No" });

    println!("\n{}", "Keeper is running...".bright_green());
    println!("{}", "(Press Ctrl+C to stop)".dimmed());

    let started = Instant::now();
    let interval_duration = Duration::from_secs(interval);
    let mut ticks = 0u64;

    loop {
        let mut tick_config = config.clone();
        tick_config.now = config.now + started.elapsed().as_secs();
        println!(
            "\n{}",
            format!("[{}] Checking for liquidations...", chrono::Local::now().format("%H:%M:%S")).dimmed()
        );

        if let Err(e) = tick(&tick_config, round_id, monitor_only).await {
            log::warn!("keeper tick failed: {:#}", e);
            println!("  {} {}", "✗".bright_red(), e);
        }

        ticks += 1;
        if max_ticks.is_some_and(|max| ticks >= max) {
            return Ok(());
        }
        sleep(interval_duration).await;
    }
}

/// Scan once and liquidate every candidate the keeper can repay
async fn tick(config: &NetworkConfig, round_id: u64, monitor_only: bool) -> Result<usize> {
    let mut state = client::load_state(config).await?;
    let targets: Vec<(VaultHealth, u128)> = {
        let protocol = state.protocol()?;
        let report = opvault_keeper::scan_vaults(protocol, Some(round_id), config.now, 0)?;
        opvault_keeper::liquidation_candidates(&report)
            .into_iter()
            .filter_map(|health| {
                let short = health.short?;
                Some((health.clone(), protocol.balance_of(&short, &config.sender)))
            })
            .collect()
    };

    if targets.is_empty() {
        println!("  {} No liquidatable vaults found", "✓".green());
        return Ok(0);
    }

    let mut liquidated = 0;
    for (health, balance) in targets {
        println!(
            "  {} vault {} of {} short by {}",
            "⚠".bright_red(),
            health.vault_id,
            client::format_address(&health.owner),
            health.shortfall()
        );
        if monitor_only {
            continue;
        }
        let amount = balance.min(health.short_amount);
        if amount == 0 {
            println!("  {} no otokens held to repay", "ℹ".blue());
            continue;
        }
        let args = ActionArgs::liquidate(health.owner, config.sender, health.vault_id, amount, round_id);
        match margin::submit_batch(config, &mut state, "liquidate", vec![args]).await {
            Ok((hash, events)) => {
                margin::print_events(state.protocol()?, &events);
                client::print_tx(&hash);
                liquidated += 1;
            }
            Err(e) => {
                log::warn!("liquidation of vault {} of {} failed: {:#}", health.vault_id, health.owner, e);
                println!("  {} {}", "✗".bright_red(), e);
            }
        }
    }
    Ok(liquidated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{otokens, setup};
    use opvault_model::VaultType;

    #[tokio::test]
    async fn test_tick_liquidates_undercollateralized_vault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localnet.json");
        let now = 1_753_000_000;
        let mut config = NetworkConfig::new("localnet", Some(path.display().to_string()), None, None, Some(now)).unwrap();
        let mut state = client::load_state(&config).await.unwrap();
        setup::init_with(&config, &mut state, &setup::default_protocol_config().unwrap()).await.unwrap();

        let protocol = state.protocol_mut().unwrap();
        let usdc = client::resolve_asset(&protocol.assets, "USDC").unwrap();
        let weth = client::resolve_asset(&protocol.assets, "WETH").unwrap();
        protocol.faucet(usdc, config.sender, 1_000_000_000).unwrap();
        let args = otokens::TermsArgs {
            underlying: "WETH".into(),
            strike_asset: "USDC".into(),
            collateral: "USDC".into(),
            strike: "200".into(),
            expiry: "2025-07-29".into(),
            call: false,
        };
        let terms = otokens::resolve_terms(&protocol.assets, &args).unwrap();
        let (_, put) = otokens::create_with(&config, &mut state, terms).await.unwrap();

        // Sender's own naked vault: 100 USDC against one put, so it also holds the otoken
        let e18 = 1_000_000_000_000_000_000u128;
        let batch = vec![
            ActionArgs::open_vault(config.sender, 1, VaultType::NakedMargin),
            ActionArgs::deposit_collateral(config.sender, config.sender, usdc, 1, 100_000_000),
            ActionArgs::mint_short(config.sender, config.sender, put, 1, e18),
        ];
        margin::submit_batch(&config, &mut state, "operate", batch).await.unwrap();

        // WETH crashes to $1 one minute later
        state.protocol_mut().unwrap().oracle.set_historical_price(weth, 1, 100_000_000, now + 60);
        client::save_state(&config, &state).await.unwrap();

        config.now = now + 3_600;
        assert_eq!(tick(&config, 1, true).await.unwrap(), 0);
        assert_eq!(tick(&config, 1, false).await.unwrap(), 1);

        let reloaded = client::load_state(&config).await.unwrap();
        let record = reloaded.protocol().unwrap().get_vault(&config.sender, 1).unwrap();
        assert_eq!(record.vault.short_amount(), 0);
    }
}
