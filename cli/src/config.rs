//! Network selection, sender identity and protocol configuration

use anyhow::{Context, Result};
use opvault_model::{Address, MarginConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: String,
    /// JSON file holding the simulated chain state
    pub state_path: PathBuf,
    /// Protocol config (TOML) used by `init`
    pub config_path: Option<PathBuf>,
    pub sender: Address,
    /// Block timestamp applied to every call
    pub now: u64,
}

impl NetworkConfig {
    pub fn new(
        network: &str,
        state_path: Option<String>,
        config_path: Option<String>,
        sender: Option<String>,
        now: Option<u64>,
    ) -> Result<Self> {
        let network = match network {
            "localnet" | "local" => "localnet",
            "testnet" => "testnet",
            "mainnet" => "mainnet",
            _ => anyhow::bail!("Unknown network: {}. Use localnet, testnet, or mainnet", network),
        };

        let state_path = match state_path {
            Some(path) => expand_path(&path)?,
            None => expand_path(&format!("~/.opvault/{}.json", network))?,
        };
        let config_path = config_path.map(|p| expand_path(&p)).transpose()?;

        let sender = match sender {
            Some(text) => text
                .parse()
                .with_context(|| format!("Invalid sender address: {}", text))?,
            None => default_sender(network),
        };

        let now = now.unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);

        Ok(Self {
            network: network.to_string(),
            state_path,
            config_path,
            sender,
            now,
        })
    }
}

/// Deterministic operator account used when no `--sender` is given
pub fn default_sender(network: &str) -> Address {
    Address::derive("opvault.cli.sender", network)
}

fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("Failed to expand path: {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Asset listed in the protocol config
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub decimals: u32,
    /// Derived from the symbol when absent
    pub address: Option<Address>,
    /// Whitelist as vault collateral
    #[serde(default)]
    pub collateral: bool,
    /// Initial real-time price, 8 decimals
    pub price: Option<u64>,
    /// Dust limit in raw asset units
    pub dust_limit: Option<u64>,
}

impl AssetConfig {
    pub fn resolved_address(&self) -> Address {
        self.address
            .unwrap_or_else(|| Address::derive("opvault.cli.asset", self.symbol.as_str()))
    }
}

/// Product whitelisted at init, assets named by symbol
#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    pub underlying: String,
    pub strike: String,
    pub collateral: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub margin: MarginConfig,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

impl ProtocolConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse protocol config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Protocol config not found: {}", path.display());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read protocol config: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid protocol config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[margin]
spot_shock_bps = 2500

[[margin.upper_bounds]]
max_time_to_expiry = 604800
value_bps = 800

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
dust_limit = 1000000

[[assets]]
symbol = "WETH"
decimals = 18
address = "0x00000000000000000000000000000000000000aa"
price = 100000000000

[[products]]
underlying = "WETH"
strike = "USDC"
collateral = "USDC"
"#;

    #[test]
    fn test_network_names() {
        let config = NetworkConfig::new("local", Some("/tmp/state.json".into()), None, None, Some(7)).unwrap();
        assert_eq!(config.network, "localnet");
        assert_eq!(config.now, 7);
        assert_eq!(config.sender, default_sender("localnet"));
        assert!(NetworkConfig::new("moon", None, None, None, None).is_err());
    }

    #[test]
    fn test_sender_must_parse() {
        let err = NetworkConfig::new("localnet", None, None, Some("0x12".into()), None).err().unwrap();
        assert!(err.to_string().contains("Invalid sender address"));
    }

    #[test]
    fn test_parse_protocol_config() {
        let config = ProtocolConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.margin.spot_shock_bps, 2_500);
        assert_eq!(config.margin.upper_bound_value(86_400).unwrap(), 800);
        assert_eq!(config.margin.liquidation.auction_time_secs, 3_600);
        assert_eq!(config.assets.len(), 2);
        assert!(config.assets[0].collateral);
        assert!(!config.assets[1].collateral);
        assert_eq!(config.assets[0].price, Some(100_000_000));
        assert_eq!(config.assets[0].dust_limit, Some(1_000_000));
        assert_eq!(config.assets[1].price, Some(100_000_000_000));
        assert_eq!(config.assets[1].resolved_address(), Address::from_low_u64(0xaa));
        assert_eq!(config.assets[0].resolved_address(), config.assets[0].resolved_address());
        assert_eq!(config.products.len(), 1);
        assert_eq!(config.products[0].underlying, "WETH");
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProtocolConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Protocol config not found"));
    }
}
