//! Simulated chain client: state file, transactions and display helpers

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use opvault_model::{address::digest, Address, AssetBook, Protocol};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::NetworkConfig;

/// Everything the simulated chain remembers between invocations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainState {
    pub network: String,
    /// Transactions sent so far; feeds transaction hashes
    pub nonce: u64,
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub transactions: Vec<TxRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: String,
    pub from: Address,
    pub nonce: u64,
    pub kind: String,
    pub timestamp: u64,
    #[serde(default)]
    pub gas_price: Option<u128>,
}

/// Sender-side context handed to a transaction body
#[derive(Debug, Clone, Copy)]
pub struct TxContext {
    pub sender: Address,
    pub nonce: u64,
    pub now: u64,
}

impl ChainState {
    pub fn new(network: &str) -> Self {
        Self { network: network.to_string(), ..Self::default() }
    }

    pub fn protocol(&self) -> Result<&Protocol> {
        self.protocol
            .as_ref()
            .context("Protocol not initialized on this network; run `opvault init` first")
    }

    pub fn protocol_mut(&mut self) -> Result<&mut Protocol> {
        self.protocol
            .as_mut()
            .context("Protocol not initialized on this network; run `opvault init` first")
    }
}

/// Load the chain state, or start an empty chain when the file does not exist yet
pub async fn load_state(config: &NetworkConfig) -> Result<ChainState> {
    let path = &config.state_path;
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        log::debug!("no state at {}, starting empty chain", path.display());
        return Ok(ChainState::new(&config.network));
    }
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let state: ChainState = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    if state.network != config.network {
        anyhow::bail!(
            "State file {} belongs to network {}, not {}",
            path.display(),
            state.network,
            config.network
        );
    }
    Ok(state)
}

/// Persist the chain state atomically (write temp file, then rename)
pub async fn save_state(config: &NetworkConfig, state: &ChainState) -> Result<()> {
    let path = &config.state_path;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace state file: {}", path.display()))?;
    Ok(())
}

/// Hash identifying a transaction: sender, nonce and kind
pub fn tx_hash(sender: &Address, nonce: u64, kind: &str) -> String {
    format!("0x{}", hex::encode(digest("opvault.tx", &(sender, nonce, kind))))
}

/// Send a transaction and wait for it.
///
/// The body runs against a copy of the chain state; only when it succeeds is
/// the copy recorded, persisted and swapped in. Returns the transaction hash
/// and the body's result.
pub async fn send_and_confirm<T, F>(
    config: &NetworkConfig,
    state: &mut ChainState,
    kind: &str,
    gas_price: Option<u128>,
    body: F,
) -> Result<(String, T)>
where
    F: FnOnce(&mut ChainState, TxContext) -> Result<T>,
{
    let ctx = TxContext { sender: config.sender, nonce: state.nonce, now: config.now };
    let hash = tx_hash(&ctx.sender, ctx.nonce, kind);

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Waiting for {} to be mined...", kind));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let mut next = state.clone();
    let result = body(&mut next, ctx);
    spinner.finish_and_clear();
    let value = result.with_context(|| format!("Transaction {} reverted", kind))?;

    next.nonce += 1;
    next.transactions.push(TxRecord {
        hash: hash.clone(),
        from: ctx.sender,
        nonce: ctx.nonce,
        kind: kind.to_string(),
        timestamp: ctx.now,
        gas_price,
    });
    save_state(config, &next).await?;
    *state = next;
    log::info!("{} mined in {}", kind, hash);
    Ok((hash, value))
}

/// Resolve an asset given as an address or a registered symbol
pub fn resolve_asset(assets: &AssetBook, text: &str) -> Result<Address> {
    if let Ok(address) = text.parse::<Address>() {
        return Ok(address);
    }
    if text.eq_ignore_ascii_case("ETH") {
        return Ok(Address::ZERO);
    }
    assets
        .iter()
        .find(|(_, info)| info.symbol.eq_ignore_ascii_case(text))
        .map(|(address, _)| *address)
        .with_context(|| format!("Unknown asset: {}", text))
}

pub fn parse_address(text: &str) -> Result<Address> {
    text.parse().with_context(|| format!("Invalid address: {}", text))
}

/// Parse a decimal amount ("12.5") into raw units with `decimals` places
pub fn parse_units(text: &str, decimals: u32) -> Result<u128> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    if fraction.len() > decimals as usize {
        anyhow::bail!("Amount {} has more than {} decimals", text, decimals);
    }
    let padded = format!("{}{:0<width$}", whole, fraction, width = decimals as usize);
    padded
        .parse::<u128>()
        .with_context(|| format!("Invalid amount: {}", text))
}

/// Format raw units with `decimals` places, trimming trailing zeros
pub fn format_units(amount: u128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let whole = amount / scale;
    let fraction = amount % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Parse an amount of `asset` in its own decimals
pub fn parse_asset_amount(assets: &AssetBook, asset: &Address, text: &str) -> Result<u128> {
    let decimals = assets.decimals(asset)?;
    parse_units(text, decimals)
}

/// Format an amount of `asset` with its symbol
pub fn format_asset_amount(assets: &AssetBook, asset: &Address, amount: u128) -> String {
    match assets.info(asset) {
        Ok(info) => format!("{} {}", format_units(amount, info.decimals), info.symbol),
        Err(_) => format!("{} (raw)", amount),
    }
}

pub fn print_tx(hash: &str) {
    println!("{} {}", "Transaction:".bright_cyan(), hash.dimmed());
}

/// Pretty print an address as shortened hex
pub fn format_address(address: &Address) -> String {
    let text = address.to_string();
    format!("{}...{}", &text[0..8], &text[text.len() - 6..]).bright_yellow().to_string()
}
