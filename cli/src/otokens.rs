//! Option token creation and inspection

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use colored::Colorize;
use opvault_model::math::{OTOKEN_DECIMALS, STRIKE_DECIMALS};
use opvault_model::{name_and_symbol, AssetBook, OptionTerms};

use crate::client::{self, ChainState};
use crate::config::NetworkConfig;

/// Option terms as given on the command line
pub struct TermsArgs {
    pub underlying: String,
    pub strike_asset: String,
    pub collateral: String,
    pub strike: String,
    pub expiry: String,
    pub call: bool,
}

/// Expiry as a unix timestamp or a `YYYY-MM-DD` date (08:00 UTC)
pub fn parse_expiry(text: &str) -> Result<u64> {
    if let Ok(timestamp) = text.parse::<u64>() {
        return Ok(timestamp);
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Invalid expiry: {} (use a timestamp or YYYY-MM-DD)", text))?;
    let at_eight = date.and_hms_opt(8, 0, 0).context("Invalid expiry time")?;
    Ok(Utc.from_utc_datetime(&at_eight).timestamp().max(0) as u64)
}

pub fn resolve_terms(assets: &AssetBook, args: &TermsArgs) -> Result<OptionTerms> {
    Ok(OptionTerms {
        underlying: client::resolve_asset(assets, &args.underlying)?,
        strike_asset: client::resolve_asset(assets, &args.strike_asset)?,
        collateral_asset: client::resolve_asset(assets, &args.collateral)?,
        strike_price: client::parse_units(&args.strike, STRIKE_DECIMALS)?,
        expiry: parse_expiry(&args.expiry)?,
        is_put: !args.call,
    })
}

pub async fn create_otoken(config: &NetworkConfig, args: TermsArgs) -> Result<()> {
    println!("{}", "=== Create Otoken ===".bright_green().bold());
    let mut state = client::load_state(config).await?;
    let terms = resolve_terms(&state.protocol()?.assets, &args)?;
    let (name, symbol) = name_and_symbol(&state.protocol()?.assets, &terms)?;
    println!("{} {}", "Name:".bright_cyan(), name);
    println!("{} {}", "Symbol:".bright_cyan(), symbol);

    let (hash, address) = create_with(config, &mut state, terms).await?;
    println!("\n{} {}", "Otoken created at".bright_green(), address);
    client::print_tx(&hash);
    Ok(())
}

pub async fn create_with(config: &NetworkConfig, state: &mut ChainState, terms: OptionTerms) -> Result<(String, opvault_model::Address)> {
    client::send_and_confirm(config, state, "create_otoken", None, |state, tx| {
        Ok(state.protocol_mut()?.create_otoken(terms, tx.now)?)
    })
    .await
}

pub async fn show_target_address(config: &NetworkConfig, args: TermsArgs) -> Result<()> {
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let terms = resolve_terms(&protocol.assets, &args)?;
    let target = protocol.target_otoken_address(&terms)?;
    println!("{} {}", "Target Address:".bright_cyan(), target);
    match protocol.factory.get_otoken(&terms) {
        Some(_) => println!("{}", "Already created".yellow()),
        None => println!("{}", "Not created yet".dimmed()),
    }
    Ok(())
}

pub async fn show_otoken(config: &NetworkConfig, address: String) -> Result<()> {
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    let address = client::parse_address(&address)?;
    let otoken = protocol.otoken(&address)?;
    let terms = otoken.terms()?;

    println!("{}", "=== Otoken ===".bright_green().bold());
    println!("{} {}", "Address:".bright_cyan(), address);
    println!("{} {}", "Name:".bright_cyan(), otoken.name());
    println!("{} {}", "Symbol:".bright_cyan(), otoken.symbol());
    println!("{} {}", "Implementation:".bright_cyan(), otoken.implementation);
    println!("{} {}", "Underlying:".bright_cyan(), protocol.assets.symbol(&terms.underlying)?);
    println!("{} {}", "Strike Asset:".bright_cyan(), protocol.assets.symbol(&terms.strike_asset)?);
    println!("{} {}", "Collateral:".bright_cyan(), protocol.assets.symbol(&terms.collateral_asset)?);
    println!("{} {}", "Strike:".bright_cyan(), client::format_units(terms.strike_price, STRIKE_DECIMALS));
    println!("{} {}", "Expiry:".bright_cyan(), format_expiry(terms.expiry));
    println!("{} {}", "Type:".bright_cyan(), if terms.is_put { "Put" } else { "Call" });
    println!("{} {}", "Total Supply:".bright_cyan(), client::format_units(otoken.total_supply(), OTOKEN_DECIMALS));
    println!(
        "{} {}",
        "Expired:".bright_cyan(),
        if terms.is_expired(config.now) { "Yes".yellow() } else { "No".normal() }
    );
    Ok(())
}

pub async fn list_otokens(config: &NetworkConfig) -> Result<()> {
    println!("{}", "=== Otokens ===".bright_green().bold());
    let state = client::load_state(config).await?;
    let protocol = state.protocol()?;
    if protocol.factory.otokens_length() == 0 {
        println!("{}", "No otokens created".dimmed());
        return Ok(());
    }
    for (i, address) in protocol.factory.otokens().iter().enumerate() {
        let otoken = protocol.otoken(address)?;
        println!("  {} {} {}", format!("[{}]", i).dimmed(), otoken.symbol().bright_cyan(), address);
    }
    Ok(())
}

fn format_expiry(expiry: u64) -> String {
    match Utc.timestamp_opt(expiry as i64, 0).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => expiry.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup;

    fn weth_put(strike: &str, expiry: &str) -> TermsArgs {
        TermsArgs {
            underlying: "WETH".into(),
            strike_asset: "USDC".into(),
            collateral: "USDC".into(),
            strike: strike.into(),
            expiry: expiry.into(),
            call: false,
        }
    }

    #[test]
    fn test_parse_expiry() {
        assert_eq!(parse_expiry("2025-07-29").unwrap(), 1_753_776_000);
        assert_eq!(parse_expiry("1753776000").unwrap(), 1_753_776_000);
        assert!(parse_expiry("29/07/2025").is_err());
        assert_eq!(format_expiry(1_753_776_000), "2025-07-29 08:00 UTC");
    }

    #[tokio::test]
    async fn test_create_matches_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localnet.json");
        let config = NetworkConfig::new("localnet", Some(path.display().to_string()), None, None, Some(1_753_000_000)).unwrap();
        let mut state = client::load_state(&config).await.unwrap();
        setup::init_with(&config, &mut state, &setup::default_protocol_config().unwrap()).await.unwrap();

        let terms = resolve_terms(&state.protocol().unwrap().assets, &weth_put("200", "2025-07-29")).unwrap();
        let target = state.protocol().unwrap().target_otoken_address(&terms).unwrap();
        let (_, created) = create_with(&config, &mut state, terms).await.unwrap();
        assert_eq!(created, target);
        assert_eq!(state.protocol().unwrap().otoken(&created).unwrap().symbol(), "oWETHUSDC-29JUL25-200P");

        let err = create_with(&config, &mut state, terms).await.unwrap_err();
        assert!(format!("{:#}", err).contains("reverted"));
    }
}
