//! End-to-end smoke suite against a throwaway simulated chain
//!
//! Walks the whole protocol lifecycle on a fresh state file:
//! - Initialization and option creation
//! - Vault batches (fully collateralized and naked margin)
//! - Atomic revert of invalid batches
//! - Liquidation of an undercollateralized naked vault
//! - Pricer deployment, expiry price publication and settlement

use anyhow::{Context, Result};
use colored::Colorize;
use opvault_model::{ActionArgs, Address, ControllerEvent, PairReserves, PricerParams, Role, VaultType};

use crate::client::{self, ChainState};
use crate::config::NetworkConfig;
use crate::{deploy, margin, otokens, setup};

const E18: u128 = 1_000_000_000_000_000_000;
const USDC: u128 = 1_000_000;
/// 2025-07-29 08:00 UTC
const EXPIRY: u64 = 1_753_776_000;
const START: u64 = EXPIRY - 10 * 86_400;

struct SmokeEnv {
    config: NetworkConfig,
    state: ChainState,
    usdc: Address,
    weth: Address,
    put: Address,
}

impl SmokeEnv {
    async fn new(config: &NetworkConfig) -> Result<Self> {
        let mut config = config.clone();
        let nonce = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        config.state_path = std::env::temp_dir().join(format!("opvault-smoke-{}-{}.json", config.network, nonce));
        config.now = START;
        let state = client::load_state(&config).await?;
        Ok(Self { config, state, usdc: Address::ZERO, weth: Address::ZERO, put: Address::ZERO })
    }

    fn at(&mut self, now: u64) {
        self.config.now = now;
    }

    async fn operate(&mut self, args: Vec<ActionArgs>) -> Result<Vec<ControllerEvent>> {
        let (_, events) = margin::submit_batch(&self.config, &mut self.state, "operate", args).await?;
        Ok(events)
    }
}

impl Drop for SmokeEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.config.state_path);
    }
}

// ============================================================================
// Test Runner
// ============================================================================

pub async fn run_smoke_tests(config: &NetworkConfig) -> Result<()> {
    println!("{}", "=== Running Smoke Tests ===".bright_yellow().bold());
    println!("{}", "Protocol lifecycle on a throwaway chain\n".dimmed());

    let mut env = SmokeEnv::new(config).await?;
    let mut passed = 0;
    let mut failed = 0;

    macro_rules! check {
        ($name:expr, $test:expr) => {
            match $test.await {
                Ok(_) => {
                    println!("{} {}", "✓".bright_green(), $name);
                    passed += 1;
                }
                Err(e) => {
                    println!("{} {}: {:#}", "✗".bright_red(), $name, e);
                    failed += 1;
                }
            }
        };
    }

    check!("Protocol initialization", test_init(&mut env));
    check!("Otoken creation at target address", test_create_otoken(&mut env));
    check!("Fully collateralized vault", test_collateralized_vault(&mut env));
    check!("Invalid batch reverts atomically", test_atomic_revert(&mut env));
    check!("Naked margin liquidation", test_liquidation(&mut env));
    check!("Pricer publishes expiry price", test_pricer(&mut env));
    check!("Settlement and redemption", test_settlement(&mut env));

    print_test_summary("Smoke", passed, failed)
}

// ============================================================================
// Tests
// ============================================================================

async fn test_init(env: &mut SmokeEnv) -> Result<()> {
    setup::init_with(&env.config, &mut env.state, &setup::default_protocol_config()?).await?;
    let protocol = env.state.protocol()?;
    env.usdc = client::resolve_asset(&protocol.assets, "USDC")?;
    env.weth = client::resolve_asset(&protocol.assets, "WETH")?;
    if !protocol.whitelist.is_whitelisted_collateral(&env.usdc) {
        anyhow::bail!("USDC not whitelisted as collateral");
    }
    let (usdc, sender) = (env.usdc, env.config.sender);
    env.state.protocol_mut()?.faucet(usdc, sender, 10_000 * USDC)?;
    Ok(())
}

async fn test_create_otoken(env: &mut SmokeEnv) -> Result<()> {
    let args = otokens::TermsArgs {
        underlying: "WETH".into(),
        strike_asset: "USDC".into(),
        collateral: "USDC".into(),
        strike: "200".into(),
        expiry: EXPIRY.to_string(),
        call: false,
    };
    let terms = otokens::resolve_terms(&env.state.protocol()?.assets, &args)?;
    let target = env.state.protocol()?.target_otoken_address(&terms)?;
    let (_, put) = otokens::create_with(&env.config, &mut env.state, terms).await?;
    if put != target {
        anyhow::bail!("created at {} but target was {}", put, target);
    }
    let symbol = env.state.protocol()?.otoken(&put)?.symbol().to_string();
    if symbol != "oWETHUSDC-29JUL25-200P" {
        anyhow::bail!("unexpected symbol {}", symbol);
    }
    env.put = put;
    Ok(())
}

async fn test_collateralized_vault(env: &mut SmokeEnv) -> Result<()> {
    let (me, usdc, put) = (env.config.sender, env.usdc, env.put);
    let events = env
        .operate(vec![
            ActionArgs::open_vault(me, 1, VaultType::FullyCollateralized),
            ActionArgs::deposit_collateral(me, me, usdc, 1, 400 * USDC),
            ActionArgs::mint_short(me, me, put, 1, 2 * E18),
        ])
        .await?;
    if events.len() != 3 {
        anyhow::bail!("expected 3 events, got {}", events.len());
    }
    let protocol = env.state.protocol()?;
    let proceeds = protocol.proceeds(&me, 1, env.config.now)?;
    if proceeds != 0 {
        anyhow::bail!("fully used vault should have no proceeds, got {}", proceeds);
    }
    Ok(())
}

async fn test_atomic_revert(env: &mut SmokeEnv) -> Result<()> {
    let (me, usdc, put) = (env.config.sender, env.usdc, env.put);
    let nonce = env.state.nonce;
    let result = env
        .operate(vec![
            ActionArgs::open_vault(me, 2, VaultType::FullyCollateralized),
            ActionArgs::deposit_collateral(me, me, usdc, 2, 100 * USDC),
            ActionArgs::mint_short(me, me, put, 2, E18),
        ])
        .await;
    if result.is_ok() {
        anyhow::bail!("undercollateralized batch committed");
    }
    if env.state.nonce != nonce || env.state.protocol()?.vault_count(&me) != 1 {
        anyhow::bail!("reverted batch left state behind");
    }
    Ok(())
}

async fn test_liquidation(env: &mut SmokeEnv) -> Result<()> {
    let (me, usdc, weth, put) = (env.config.sender, env.usdc, env.weth, env.put);
    env.operate(vec![
        ActionArgs::open_vault(me, 2, VaultType::NakedMargin),
        ActionArgs::deposit_collateral(me, me, usdc, 2, 100 * USDC),
        ActionArgs::mint_short(me, me, put, 2, E18),
    ])
    .await?;

    let round_at = START + 60;
    env.state.protocol_mut()?.oracle.set_historical_price(weth, 1, 100_000_000, round_at);
    env.at(START + 3_600);
    let quote = env.state.protocol()?.liquidation_quote(&me, 2, 1, env.config.now)?;
    if quote.debt_price != 100 * USDC {
        anyhow::bail!("unexpected debt price {}", quote.debt_price);
    }
    env.operate(vec![ActionArgs::liquidate(me, me, 2, E18, 1)]).await?;
    let record = env.state.protocol()?.get_vault(&me, 2)?;
    if record.vault.short_amount() != 0 || record.vault.collateral_amount() != 0 {
        anyhow::bail!("vault not fully liquidated");
    }
    Ok(())
}

async fn test_pricer(env: &mut SmokeEnv) -> Result<()> {
    let pair = Address::derive("opvault.smoke", "WETH/USDC");
    let params = PricerParams {
        bot: env.config.sender,
        asset: env.weth,
        price_emitter: env.config.sender,
        pair,
        denomination_token: env.usdc,
        oracle: env.state.protocol()?.address_book.get(Role::Oracle).context("oracle missing")?,
    };
    let (_, pricer) = deploy::deploy_with(&env.config, &mut env.state, params, None).await?;

    let (sender, weth) = (env.config.sender, env.weth);
    let protocol = env.state.protocol_mut()?;
    protocol.oracle.set_asset_pricer(sender, weth, pricer)?;
    protocol.set_pair_reserves(pair, PairReserves { asset: 10 * E18, denomination: 1_500 * USDC });

    env.at(EXPIRY + 60);
    let price = env.state.protocol_mut()?.publish_expiry_price(sender, &pricer, EXPIRY)?;
    if price != 15_000_000_000 {
        anyhow::bail!("expected $150 expiry price, got {}", price);
    }
    Ok(())
}

async fn test_settlement(env: &mut SmokeEnv) -> Result<()> {
    let (me, put) = (env.config.sender, env.put);
    let before = env.state.protocol()?.balance_of(&env.usdc, &me);
    env.operate(vec![ActionArgs::settle_vault(me, me, 1), ActionArgs::redeem(me, put, 2 * E18)])
        .await?;
    let after = env.state.protocol()?.balance_of(&env.usdc, &me);
    // 300 back from the vault, 2 x 50 from redeeming
    if after - before != 400 * USDC {
        anyhow::bail!("expected 400 USDC back, got {}", after - before);
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_test_summary(suite_name: &str, passed: usize, failed: usize) -> Result<()> {
    println!("\n{}", format!("=== {} Results ===", suite_name).bright_cyan());
    println!("{} {} passed", "✓".bright_green(), passed);

    if failed > 0 {
        println!("{} {} failed", "✗".bright_red(), failed);
        anyhow::bail!("{} tests failed", failed);
    }

    println!("{}", format!("All {} tests passed!", suite_name).green().bold());
    Ok(())
}
