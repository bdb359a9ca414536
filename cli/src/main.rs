//! opvault CLI - deployment and operator tool
//!
//! Drives a simulated chain holding an options margin-vault protocol:
//! deploys pair pricers, manages assets, oracle prices and otokens, runs
//! vault batches and liquidations, and hosts the keeper bot.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod client;
mod config;
mod deploy;
mod keeper;
mod liquidation;
mod margin;
mod otokens;
mod setup;
mod tests;

use config::NetworkConfig;

#[derive(Parser)]
#[command(name = "opvault")]
#[command(about = "opvault CLI - Deploy and operate an options margin-vault protocol", long_about = None)]
#[command(version)]
struct Cli {
    /// Network to connect to (localnet, testnet, mainnet)
    #[arg(short, long, default_value = "localnet")]
    network: String,

    /// Chain state file (defaults to ~/.opvault/<network>.json)
    #[arg(short, long)]
    state: Option<String>,

    /// Protocol config file (TOML) used by `init`
    #[arg(short, long)]
    config: Option<String>,

    /// Sender address (defaults to the network's operator account)
    #[arg(long)]
    sender: Option<String>,

    /// Block timestamp to use (defaults to the current time)
    #[arg(long)]
    now: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a pair pricer contract
    DeployPricer {
        /// Bot address allowed to publish prices
        #[arg(long)]
        bot: String,

        /// Asset priced (address or symbol)
        #[arg(long)]
        asset: String,

        /// Price emitter address
        #[arg(long)]
        price_emitter: String,

        /// Trading pair address
        #[arg(long)]
        pair: String,

        /// Denomination token (address or symbol)
        #[arg(long)]
        denomination_token: String,

        /// Oracle address
        #[arg(long)]
        oracle: String,

        /// Gas price (wei)
        #[arg(long)]
        gas_price: Option<u128>,
    },

    /// Deploy and initialize the protocol
    Init,

    /// Asset registry operations
    Asset {
        #[command(subcommand)]
        command: AssetCommands,
    },

    /// Whitelist operations (owner only)
    Whitelist {
        #[command(subcommand)]
        command: WhitelistCommands,
    },

    /// Oracle operations
    Oracle {
        #[command(subcommand)]
        command: OracleCommands,
    },

    /// Otoken operations
    Otoken {
        #[command(subcommand)]
        command: OtokenCommands,
    },

    /// Vault operations
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },

    /// Liquidation operations
    Liquidation {
        #[command(subcommand)]
        command: LiquidationCommands,
    },

    /// Keeper bot operations
    Keeper {
        #[command(subcommand)]
        command: KeeperCommands,
    },

    /// Controller administration
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Run the smoke test suite on a throwaway chain
    Test,

    /// Show protocol status
    Status {
        /// Show assets and recent transactions
        #[arg(short, long)]
        detailed: bool,
    },
}

#[derive(Subcommand)]
enum AssetCommands {
    /// Register a token
    Register {
        /// Symbol
        symbol: String,

        /// Decimals
        decimals: u32,

        /// Address (derived from the symbol if omitted)
        #[arg(long)]
        address: Option<String>,
    },

    /// Mint test tokens
    Faucet {
        /// Asset (address or symbol)
        asset: String,

        /// Amount in whole units
        amount: String,

        /// Recipient (defaults to sender)
        #[arg(long)]
        to: Option<String>,
    },

    /// Show a token or otoken balance
    Balance {
        /// Token (address or symbol)
        token: String,

        /// Holder (defaults to sender)
        #[arg(long)]
        holder: Option<String>,
    },
}

#[derive(Subcommand)]
enum WhitelistCommands {
    /// Whitelist a collateral asset
    Collateral { asset: String },

    /// Whitelist a product
    Product {
        underlying: String,
        strike: String,
        collateral: String,
    },

    /// Whitelist a callee for call actions
    Callee { address: String },

    /// Whitelist an otoken
    Otoken { address: String },
}

#[derive(Subcommand)]
enum OracleCommands {
    /// Set the real-time price (USD)
    SetPrice { asset: String, price: String },

    /// Record a historical price round
    SetRound {
        asset: String,
        round_id: u64,
        price: String,

        /// Observation time (defaults to now)
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Set an expiry price directly
    SetExpiry { asset: String, expiry: String, price: String },

    /// Set the naked margin dust limit
    SetDust { asset: String, amount: String },

    /// Authorize a pricer for an asset (owner only)
    SetPricer { asset: String, pricer: String },

    /// Set reserves of a trading pair (raw units)
    SetReserves {
        pair: String,
        asset_reserve: u128,
        denomination_reserve: u128,
    },

    /// Have a pricer publish the expiry price from its pair
    Publish {
        pricer: String,
        expiry: String,
    },
}

#[derive(clap::Args)]
struct TermsCli {
    /// Underlying asset
    #[arg(long)]
    underlying: String,

    /// Strike asset
    #[arg(long)]
    strike_asset: String,

    /// Collateral asset
    #[arg(long)]
    collateral: String,

    /// Strike price
    #[arg(long)]
    strike: String,

    /// Expiry (timestamp or YYYY-MM-DD)
    #[arg(long)]
    expiry: String,

    /// Call option (default: put)
    #[arg(long)]
    call: bool,
}

impl From<TermsCli> for otokens::TermsArgs {
    fn from(cli: TermsCli) -> Self {
        Self {
            underlying: cli.underlying,
            strike_asset: cli.strike_asset,
            collateral: cli.collateral,
            strike: cli.strike,
            expiry: cli.expiry,
            call: cli.call,
        }
    }
}

#[derive(Subcommand)]
enum OtokenCommands {
    /// Create an otoken
    Create {
        #[command(flatten)]
        terms: TermsCli,
    },

    /// Show the address an otoken would be created at
    Target {
        #[command(flatten)]
        terms: TermsCli,
    },

    /// Show otoken details
    Show { address: String },

    /// List created otokens
    List,
}

#[derive(Subcommand)]
enum VaultCommands {
    /// Open a vault
    Open {
        /// Vault ID (defaults to the next one)
        #[arg(long)]
        id: Option<u64>,

        /// Naked margin vault
        #[arg(long)]
        naked: bool,

        /// Act for this owner as an operator
        #[arg(long)]
        owner: Option<String>,
    },

    /// Deposit collateral
    Deposit {
        id: u64,
        asset: String,
        amount: String,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Withdraw collateral
    Withdraw {
        id: u64,
        asset: String,
        amount: String,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Deposit a long otoken
    DepositLong {
        id: u64,
        otoken: String,
        amount: String,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Withdraw a long otoken
    WithdrawLong {
        id: u64,
        otoken: String,
        amount: String,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Mint short otokens
    Mint {
        id: u64,
        otoken: String,
        amount: String,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Burn short otokens
    Burn {
        id: u64,
        otoken: String,
        amount: String,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Settle a vault after expiry
    Settle {
        id: u64,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Redeem expired otokens
    Redeem { otoken: String, amount: String },

    /// Submit a batch of actions from a JSON file
    Operate { file: PathBuf },

    /// Show a vault
    Show {
        id: u64,
        #[arg(long)]
        owner: Option<String>,
    },

    /// List vaults
    List {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show margin requirements of a vault
    Requirements {
        id: u64,
        #[arg(long)]
        owner: Option<String>,
    },
}

#[derive(Subcommand)]
enum LiquidationCommands {
    /// Quote a liquidation
    Quote { owner: String, id: u64, round: u64 },

    /// Liquidate a naked margin vault
    Execute {
        owner: String,
        id: u64,
        round: u64,

        /// Otokens to repay (defaults to the whole short)
        #[arg(long)]
        amount: Option<String>,

        /// Collateral receiver (defaults to sender)
        #[arg(long)]
        receiver: Option<String>,
    },

    /// List liquidatable vaults at a price round
    List { round: u64 },

    /// Show liquidation history
    History {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum KeeperCommands {
    /// Report health of every vault
    Scan {
        /// Price round to check liquidations against
        #[arg(long)]
        round: Option<u64>,

        /// Pre-liquidation buffer (basis points of the requirement)
        #[arg(long, default_value = "1000")]
        buffer_bps: u64,
    },

    /// Run the keeper loop
    Run {
        /// Price round to liquidate against
        #[arg(long)]
        round: u64,

        /// Check interval in seconds
        #[arg(short, long, default_value = "10")]
        interval: u64,

        /// Only report, never liquidate
        #[arg(long)]
        monitor_only: bool,

        /// Stop after this many checks
        #[arg(long)]
        max_ticks: Option<u64>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Partially pause or unpause the system
    PartialPause {
        #[arg(long)]
        off: bool,
    },

    /// Fully pause or unpause the system
    FullPause {
        #[arg(long)]
        off: bool,
    },

    /// Restrict call actions to whitelisted callees
    RestrictCalls {
        #[arg(long)]
        off: bool,
    },

    /// Grant or revoke an operator for the sender
    Operator {
        operator: String,
        #[arg(long)]
        revoke: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    // Initialize network configuration
    let config = NetworkConfig::new(&cli.network, cli.state.clone(), cli.config.clone(), cli.sender.clone(), cli.now)?;

    if cli.verbose {
        println!("{} {}", "Network:".bright_cyan(), config.network);
        println!("{} {}", "State:".bright_cyan(), config.state_path.display());
        println!("{} {}", "Sender:".bright_cyan(), config.sender);
        println!("{} {}", "Now:".bright_cyan(), config.now);
    }

    // Execute command
    match cli.command {
        Commands::DeployPricer { bot, asset, price_emitter, pair, denomination_token, oracle, gas_price } => {
            let args = deploy::PricerArgs { bot, asset, price_emitter, pair, denomination_token, oracle, gas_price };
            deploy::deploy_pricer(&config, args).await?;
        }
        Commands::Init => {
            setup::initialize_protocol(&config).await?;
        }
        Commands::Asset { command } => match command {
            AssetCommands::Register { symbol, decimals, address } => {
                setup::register_asset(&config, address, symbol, decimals).await?;
            }
            AssetCommands::Faucet { asset, amount, to } => {
                setup::faucet(&config, asset, to, amount).await?;
            }
            AssetCommands::Balance { token, holder } => {
                setup::show_balance(&config, token, holder).await?;
            }
        },
        Commands::Whitelist { command } => {
            let target = match command {
                WhitelistCommands::Collateral { asset } => setup::WhitelistTarget::Collateral(asset),
                WhitelistCommands::Product { underlying, strike, collateral } => {
                    setup::WhitelistTarget::Product { underlying, strike, collateral }
                }
                WhitelistCommands::Callee { address } => setup::WhitelistTarget::Callee(address),
                WhitelistCommands::Otoken { address } => setup::WhitelistTarget::Otoken(address),
            };
            setup::whitelist(&config, target).await?;
        }
        Commands::Oracle { command } => {
            let update = match command {
                OracleCommands::SetPrice { asset, price } => setup::OracleUpdate::Price { asset, price },
                OracleCommands::SetRound { asset, round_id, price, timestamp } => {
                    setup::OracleUpdate::Round { asset, round_id, price, timestamp }
                }
                OracleCommands::SetExpiry { asset, expiry, price } => {
                    let expiry = otokens::parse_expiry(&expiry)?;
                    setup::OracleUpdate::Expiry { asset, expiry, price }
                }
                OracleCommands::SetDust { asset, amount } => setup::OracleUpdate::Dust { asset, amount },
                OracleCommands::SetPricer { asset, pricer } => setup::OracleUpdate::Pricer { asset, pricer },
                OracleCommands::SetReserves { pair, asset_reserve, denomination_reserve } => {
                    setup::OracleUpdate::Reserves { pair, asset_reserve, denomination_reserve }
                }
                OracleCommands::Publish { pricer, expiry } => {
                    let expiry = otokens::parse_expiry(&expiry)?;
                    setup::publish_expiry_price(&config, pricer, expiry).await?;
                    return Ok(());
                }
            };
            setup::update_oracle(&config, update).await?;
        }
        Commands::Otoken { command } => match command {
            OtokenCommands::Create { terms } => {
                otokens::create_otoken(&config, terms.into()).await?;
            }
            OtokenCommands::Target { terms } => {
                otokens::show_target_address(&config, terms.into()).await?;
            }
            OtokenCommands::Show { address } => {
                otokens::show_otoken(&config, address).await?;
            }
            OtokenCommands::List => {
                otokens::list_otokens(&config).await?;
            }
        },
        Commands::Vault { command } => {
            use margin::VaultCommand;
            let (owner, command) = match command {
                VaultCommands::Open { id, naked, owner } => (owner, VaultCommand::Open { vault_id: id, naked }),
                VaultCommands::Deposit { id, asset, amount, owner } => {
                    (owner, VaultCommand::Deposit { vault_id: id, asset, amount })
                }
                VaultCommands::Withdraw { id, asset, amount, owner } => {
                    (owner, VaultCommand::Withdraw { vault_id: id, asset, amount })
                }
                VaultCommands::DepositLong { id, otoken, amount, owner } => {
                    (owner, VaultCommand::DepositLong { vault_id: id, otoken, amount })
                }
                VaultCommands::WithdrawLong { id, otoken, amount, owner } => {
                    (owner, VaultCommand::WithdrawLong { vault_id: id, otoken, amount })
                }
                VaultCommands::Mint { id, otoken, amount, owner } => {
                    (owner, VaultCommand::Mint { vault_id: id, otoken, amount })
                }
                VaultCommands::Burn { id, otoken, amount, owner } => {
                    (owner, VaultCommand::Burn { vault_id: id, otoken, amount })
                }
                VaultCommands::Settle { id, owner } => (owner, VaultCommand::Settle { vault_id: id }),
                VaultCommands::Redeem { otoken, amount } => (None, VaultCommand::Redeem { otoken, amount }),
                VaultCommands::Operate { file } => {
                    margin::operate_file(&config, file).await?;
                    return Ok(());
                }
                VaultCommands::Show { id, owner } => {
                    margin::show_vault(&config, owner, id).await?;
                    return Ok(());
                }
                VaultCommands::List { owner } => {
                    margin::list_vaults(&config, owner).await?;
                    return Ok(());
                }
                VaultCommands::Requirements { id, owner } => {
                    margin::show_margin_requirements(&config, owner, id).await?;
                    return Ok(());
                }
            };
            margin::run_vault_command(&config, owner, command).await?;
        }
        Commands::Liquidation { command } => match command {
            LiquidationCommands::Quote { owner, id, round } => {
                liquidation::quote_liquidation(&config, owner, id, round).await?;
            }
            LiquidationCommands::Execute { owner, id, round, amount, receiver } => {
                liquidation::execute_liquidation(&config, owner, id, round, amount, receiver).await?;
            }
            LiquidationCommands::List { round } => {
                liquidation::list_liquidatable(&config, round).await?;
            }
            LiquidationCommands::History { limit } => {
                liquidation::show_history(&config, limit).await?;
            }
        },
        Commands::Keeper { command } => match command {
            KeeperCommands::Scan { round, buffer_bps } => {
                keeper::scan(&config, round, buffer_bps).await?;
            }
            KeeperCommands::Run { round, interval, monitor_only, max_ticks } => {
                keeper::run_keeper(&config, round, interval, monitor_only, max_ticks).await?;
            }
        },
        Commands::Admin { command } => {
            let update = match command {
                AdminCommands::PartialPause { off } => setup::AdminUpdate::PartialPause(!off),
                AdminCommands::FullPause { off } => setup::AdminUpdate::FullPause(!off),
                AdminCommands::RestrictCalls { off } => setup::AdminUpdate::CallRestriction(!off),
                AdminCommands::Operator { operator, revoke } => {
                    setup::AdminUpdate::Operator { operator, is_operator: !revoke }
                }
            };
            setup::admin(&config, update).await?;
        }
        Commands::Test => {
            println!("{}", "Running test suite...".bright_green().bold());
            tests::run_smoke_tests(&config).await?;
        }
        Commands::Status { detailed } => {
            setup::query_status(&config, detailed).await?;
        }
    }

    Ok(())
}
