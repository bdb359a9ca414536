//! Error types
//!
//! Display strings are the reasons surfaced to callers when a batch reverts.

use thiserror::Error;

use crate::address::Address;

/// Coarse classification of a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A per-action or per-call precondition did not hold
    PreconditionFailure,
    /// Every action passed but the resulting vault state is not allowed
    InvalidFinalState,
    /// A referenced record (price round, vault, asset) does not exist
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    // ---- access control ----
    #[error("Ownable: caller is not the owner")]
    NotOwner,

    #[error("Controller: sender is not pauser")]
    NotPauser,

    #[error("Controller: msg.sender is not authorized to run action")]
    Unauthorized,

    #[error("Controller: depositor address and msg.sender address mismatch")]
    DepositorMismatch,

    #[error("Controller: burner address is not msg.sender or an operator of it")]
    BurnerNotAuthorized,

    #[error("Controller: system is partially paused")]
    SystemPartiallyPaused,

    #[error("Controller: system is fully paused")]
    SystemFullyPaused,

    // ---- action parsing ----
    #[error("Actions: invalid action type {0}")]
    InvalidActionType(u8),

    #[error("Actions: invalid vault type {0}")]
    InvalidVaultType(u64),

    #[error("Actions: cannot open vault for the zero address")]
    ZeroOwner,

    #[error("Controller: amount must be greater than zero")]
    ZeroAmount,

    // ---- whitelist ----
    #[error("Controller: asset is not whitelisted to be used as collateral")]
    CollateralNotWhitelisted,

    #[error("Controller: otoken is not whitelisted to be used as collateral")]
    LongNotWhitelisted,

    #[error("Controller: otoken is not whitelisted to be minted")]
    ShortNotWhitelisted,

    #[error("Controller: callee is not whitelisted")]
    CalleeNotWhitelisted,

    // ---- vault ----
    #[error("Controller: vault {vault_id} already exists for {owner}")]
    VaultAlreadyExists { owner: Address, vault_id: u64 },

    #[error("Controller: can not run actions on inexistent vault {vault_id} of {owner}")]
    VaultNotFound { owner: Address, vault_id: u64 },

    #[error("Controller: Long otokens not allowed in this vault")]
    LongNotAllowed,

    #[error("MarginVault: short otoken address mismatch")]
    ShortMismatch,

    #[error("MarginVault: long otoken address mismatch")]
    LongMismatch,

    #[error("MarginVault: collateral asset mismatch")]
    CollateralMismatch,

    #[error("MarginVault: invalid index {0}")]
    InvalidIndex(usize),

    #[error("MarginVault: amount exceeds vault balance")]
    ExceedsVaultBalance,

    #[error("Controller: naked margin vault must have at least the dust limit of collateral")]
    BelowDustLimit,

    #[error("Controller: invalid final vault state")]
    InvalidFinalState,

    // ---- expiry ----
    #[error("Controller: can not mint expired otoken")]
    MintExpired,

    #[error("Controller: can not burn expired otoken")]
    BurnExpired,

    #[error("Controller: otoken used as collateral is already expired")]
    DepositExpiredLong,

    #[error("Controller: can not withdraw an expired otoken")]
    WithdrawExpiredLong,

    #[error("Controller: otoken has not expired yet")]
    NotExpired,

    #[error("Controller: asset prices not finalized yet")]
    PriceNotFinalized,

    #[error("Controller: vault has no otoken to settle")]
    NothingToSettle,

    // ---- liquidation ----
    #[error("Controller: only naked margin vaults can be liquidated")]
    LiquidationNotNakedMargin,

    #[error("Controller: vault has no short otoken to liquidate")]
    LiquidationNoShort,

    #[error("Controller: can not liquidate a vault with an expired short otoken")]
    LiquidationExpired,

    #[error("Controller: vault was adjusted recently")]
    AdjustedRecently,

    #[error("Controller: vault was adjusted after the price round")]
    RoundBeforeAdjustment,

    #[error("Controller: price round is in the future")]
    RoundInFuture,

    #[error("Controller: vault is not undercollateralized")]
    NotUndercollateralized,

    #[error("Controller: can not repay more than the vault short amount")]
    RepayExceedsShort,

    #[error("Controller: partial liquidation can not leave less than the dust limit")]
    LiquidationLeavesDust,

    // ---- tokens ----
    #[error("Contract instance has already been initialized")]
    AlreadyInitialized,

    #[error("Otoken: instance {0} has not been initialized")]
    NotInitialized(Address),

    #[error("Otoken: Only Controller can mint Otokens")]
    OnlyControllerMint,

    #[error("Otoken: Only Controller can burn Otokens")]
    OnlyControllerBurn,

    #[error("ERC20: amount exceeds balance of {holder} for {token}")]
    InsufficientBalance { token: Address, holder: Address },

    #[error("MarginPool: insufficient {0} held by the pool")]
    PoolInsufficient(Address),

    #[error("AssetBook: unknown asset {0}")]
    UnknownAsset(Address),

    #[error("AssetBook: asset {0} already registered")]
    AssetAlreadyRegistered(Address),

    #[error("Otoken: unknown otoken {0}")]
    UnknownOtoken(Address),

    // ---- factory ----
    #[error("OtokenFactory: Unsupported Product")]
    UnsupportedProduct,

    #[error("OtokenFactory: Option already created")]
    OptionAlreadyCreated,

    #[error("OtokenFactory: Can't create expired option")]
    ExpiredOption,

    #[error("OtokenFactory: Option has to expire 08:00 UTC")]
    ExpiryNotAtEightUtc,

    #[error("AddressBook: otoken implementation is not set")]
    ImplementationNotSet,

    #[error("AddressBook: implementation {0} is not registered")]
    UnknownImplementation(Address),

    #[error("AddressBook: implementation {0} already registered")]
    ImplementationExists(Address),

    // ---- oracle ----
    #[error("Oracle: price not set for {0}")]
    PriceNotFound(Address),

    #[error("Oracle: no historical price for {asset} at round {round_id}")]
    HistoricalPriceNotFound { asset: Address, round_id: u64 },

    #[error("Oracle: no expiry price for {asset} at {expiry}")]
    ExpiryPriceNotFound { asset: Address, expiry: u64 },

    #[error("Oracle: caller is not authorized to set expiry price")]
    NotAssetPricer,

    // ---- margin ----
    #[error("MarginCalculator: no upper bound value for time to expiry {0}s")]
    UpperBoundNotFound(u64),

    #[error("MarginCalculator: long otoken is not marginable against the short")]
    LongNotMarginable,

    #[error("MarginCalculator: arithmetic overflow")]
    Overflow,

    // ---- pricer ----
    #[error("PairPricer: {0} cannot be the zero address")]
    PricerZeroAddress(&'static str),

    #[error("PairPricer: sender is not bot address")]
    PricerUnauthorized,

    #[error("PairPricer: pair reserves must be non-zero")]
    EmptyReserves,
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        use ProtocolError::*;
        match self {
            InvalidFinalState | LongNotMarginable => ErrorKind::InvalidFinalState,
            VaultNotFound { .. }
            | UnknownAsset(_)
            | UnknownOtoken(_)
            | UnknownImplementation(_)
            | PriceNotFound(_)
            | HistoricalPriceNotFound { .. }
            | ExpiryPriceNotFound { .. }
            | UpperBoundNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::PreconditionFailure,
        }
    }
}

pub type Result<T> = core::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_match_controller_messages() {
        assert_eq!(
            ProtocolError::BelowDustLimit.to_string(),
            "Controller: naked margin vault must have at least the dust limit of collateral"
        );
        assert_eq!(ProtocolError::UnsupportedProduct.to_string(), "OtokenFactory: Unsupported Product");
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(ProtocolError::InvalidFinalState.kind(), ErrorKind::InvalidFinalState);
        assert_eq!(ProtocolError::BelowDustLimit.kind(), ErrorKind::PreconditionFailure);
        assert_eq!(ProtocolError::AlreadyInitialized.kind(), ErrorKind::PreconditionFailure);
        let missing = ProtocolError::HistoricalPriceNotFound { asset: Address::ZERO, round_id: 3 };
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
