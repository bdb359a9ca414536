//! Off-chain model of an options margin protocol
//!
//! Option tokens (otokens) are cloned from logic templates by a factory,
//! minted against collateral in vaults and settled against oracle prices.
//! The controller applies ordered batches of vault actions atomically;
//! naked margin vaults can be liquidated against historical price rounds.

pub mod actions;
pub mod address;
pub mod address_book;
pub mod assets;
pub mod calculator;
pub mod controller;
pub mod error;
pub mod events;
pub mod factory;
pub mod math;
pub mod oracle;
pub mod otoken;
pub mod pricer;
pub mod protocol;
pub mod vault;
pub mod whitelist;

pub use actions::{Action, ActionArgs, ActionType};
pub use address::Address;
pub use address_book::{AddressBook, Role};
pub use assets::{AssetBook, AssetInfo, TokenBalances};
pub use calculator::{LiquidationParams, LiquidationQuote, MarginCalculator, MarginConfig, UpperBound};
pub use controller::{BatchError, BatchOutcome, BatchStage, BatchState, Context, Controller, Ledger};
pub use error::{ErrorKind, ProtocolError, Result};
pub use events::ControllerEvent;
pub use factory::OtokenFactory;
pub use oracle::{HistoricalPrice, Oracle};
pub use otoken::{name_and_symbol, OptionTerms, Otoken, OtokenBook, OtokenLogic};
pub use pricer::{PairPricer, PairReserves, PricerParams};
pub use protocol::{component_address, Protocol};
pub use vault::{AssetKind, MintBurn, Vault, VaultRecord, VaultStore, VaultType};
pub use whitelist::{Product, Whitelist};
