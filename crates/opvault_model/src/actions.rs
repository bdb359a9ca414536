//! Controller actions
//!
//! `ActionArgs` is the flat record callers submit (and batch files contain);
//! `Action` is the validated, typed form the controller executes.
//!
//! Field usage per action:
//!
//! | action             | owner | second_address | asset   | vault_id | amount | index      |
//! |--------------------|-------|----------------|---------|----------|--------|------------|
//! | OpenVault          | owner |                |         | id       |        | vault type |
//! | MintShortOption    | owner | to             | otoken  | id       | amount | 0          |
//! | BurnShortOption    | owner | from           | otoken  | id       | amount | 0          |
//! | DepositLongOption  | owner | from           | otoken  | id       | amount | 0          |
//! | WithdrawLongOption | owner | to             | otoken  | id       | amount | 0          |
//! | DepositCollateral  | owner | from           | asset   | id       | amount | 0          |
//! | WithdrawCollateral | owner | to             | asset   | id       | amount | 0          |
//! | SettleVault        | owner | to             |         | id       |        |            |
//! | Redeem             |       | receiver       | otoken  |          | amount |            |
//! | Call               |       | callee         |         |          |        |            |
//! | Liquidate          | owner | receiver       |         | id       | amount | round id   |

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{ProtocolError, Result};
use crate::vault::VaultType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ActionType {
    OpenVault = 0,
    MintShortOption = 1,
    BurnShortOption = 2,
    DepositLongOption = 3,
    WithdrawLongOption = 4,
    DepositCollateral = 5,
    WithdrawCollateral = 6,
    SettleVault = 7,
    Redeem = 8,
    Call = 9,
    InvalidAction = 10,
    Liquidate = 11,
}

impl TryFrom<u8> for ActionType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        use ActionType::*;
        Ok(match value {
            0 => OpenVault,
            1 => MintShortOption,
            2 => BurnShortOption,
            3 => DepositLongOption,
            4 => WithdrawLongOption,
            5 => DepositCollateral,
            6 => WithdrawCollateral,
            7 => SettleVault,
            8 => Redeem,
            9 => Call,
            10 => InvalidAction,
            11 => Liquidate,
            other => return Err(ProtocolError::InvalidActionType(other)),
        })
    }
}

impl From<ActionType> for u8 {
    fn from(action: ActionType) -> u8 {
        action as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionArgs {
    pub action_type: ActionType,
    #[serde(default = "zero_address")]
    pub owner: Address,
    #[serde(default = "zero_address")]
    pub second_address: Address,
    #[serde(default = "zero_address")]
    pub asset: Address,
    #[serde(default)]
    pub vault_id: u64,
    #[serde(default)]
    pub amount: u128,
    #[serde(default)]
    pub index: u64,
    /// Opaque payload, only forwarded by `Call`
    #[serde(default)]
    pub data: Vec<u8>,
}

fn zero_address() -> Address {
    Address::ZERO
}

impl ActionArgs {
    fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            owner: Address::ZERO,
            second_address: Address::ZERO,
            asset: Address::ZERO,
            vault_id: 0,
            amount: 0,
            index: 0,
            data: Vec::new(),
        }
    }

    pub fn open_vault(owner: Address, vault_id: u64, vault_type: VaultType) -> Self {
        Self { owner, vault_id, index: vault_type as u64, ..Self::new(ActionType::OpenVault) }
    }

    pub fn deposit_collateral(owner: Address, from: Address, asset: Address, vault_id: u64, amount: u128) -> Self {
        Self { owner, second_address: from, asset, vault_id, amount, ..Self::new(ActionType::DepositCollateral) }
    }

    pub fn withdraw_collateral(owner: Address, to: Address, asset: Address, vault_id: u64, amount: u128) -> Self {
        Self { owner, second_address: to, asset, vault_id, amount, ..Self::new(ActionType::WithdrawCollateral) }
    }

    pub fn deposit_long(owner: Address, from: Address, otoken: Address, vault_id: u64, amount: u128) -> Self {
        Self { owner, second_address: from, asset: otoken, vault_id, amount, ..Self::new(ActionType::DepositLongOption) }
    }

    pub fn withdraw_long(owner: Address, to: Address, otoken: Address, vault_id: u64, amount: u128) -> Self {
        Self { owner, second_address: to, asset: otoken, vault_id, amount, ..Self::new(ActionType::WithdrawLongOption) }
    }

    pub fn mint_short(owner: Address, to: Address, otoken: Address, vault_id: u64, amount: u128) -> Self {
        Self { owner, second_address: to, asset: otoken, vault_id, amount, ..Self::new(ActionType::MintShortOption) }
    }

    pub fn burn_short(owner: Address, from: Address, otoken: Address, vault_id: u64, amount: u128) -> Self {
        Self { owner, second_address: from, asset: otoken, vault_id, amount, ..Self::new(ActionType::BurnShortOption) }
    }

    pub fn settle_vault(owner: Address, to: Address, vault_id: u64) -> Self {
        Self { owner, second_address: to, vault_id, ..Self::new(ActionType::SettleVault) }
    }

    pub fn redeem(receiver: Address, otoken: Address, amount: u128) -> Self {
        Self { second_address: receiver, asset: otoken, amount, ..Self::new(ActionType::Redeem) }
    }

    pub fn call(callee: Address, data: Vec<u8>) -> Self {
        Self { second_address: callee, data, ..Self::new(ActionType::Call) }
    }

    pub fn liquidate(owner: Address, receiver: Address, vault_id: u64, amount: u128, round_id: u64) -> Self {
        Self { owner, second_address: receiver, vault_id, amount, index: round_id, ..Self::new(ActionType::Liquidate) }
    }
}

/// Position inside a vault list, always 0 for single-entry vaults
pub type SlotIndex = usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    OpenVault { owner: Address, vault_id: u64, vault_type: VaultType },
    MintShort { owner: Address, vault_id: u64, to: Address, otoken: Address, index: SlotIndex, amount: u128 },
    BurnShort { owner: Address, vault_id: u64, from: Address, otoken: Address, index: SlotIndex, amount: u128 },
    DepositLong { owner: Address, vault_id: u64, from: Address, otoken: Address, index: SlotIndex, amount: u128 },
    WithdrawLong { owner: Address, vault_id: u64, to: Address, otoken: Address, index: SlotIndex, amount: u128 },
    DepositCollateral { owner: Address, vault_id: u64, from: Address, asset: Address, index: SlotIndex, amount: u128 },
    WithdrawCollateral { owner: Address, vault_id: u64, to: Address, asset: Address, index: SlotIndex, amount: u128 },
    SettleVault { owner: Address, vault_id: u64, to: Address },
    Redeem { receiver: Address, otoken: Address, amount: u128 },
    Call { callee: Address, data: Vec<u8> },
    Liquidate { owner: Address, vault_id: u64, receiver: Address, amount: u128, round_id: u64 },
}

impl Action {
    /// Vault this action acts on as its owner (or operator), if any
    pub fn vault(&self) -> Option<(Address, u64)> {
        use Action::*;
        match self {
            OpenVault { owner, vault_id, .. }
            | MintShort { owner, vault_id, .. }
            | BurnShort { owner, vault_id, .. }
            | DepositLong { owner, vault_id, .. }
            | WithdrawLong { owner, vault_id, .. }
            | DepositCollateral { owner, vault_id, .. }
            | WithdrawCollateral { owner, vault_id, .. }
            | SettleVault { owner, vault_id, .. } => Some((*owner, *vault_id)),
            Redeem { .. } | Call { .. } | Liquidate { .. } => None,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Action::OpenVault { .. } => ActionType::OpenVault,
            Action::MintShort { .. } => ActionType::MintShortOption,
            Action::BurnShort { .. } => ActionType::BurnShortOption,
            Action::DepositLong { .. } => ActionType::DepositLongOption,
            Action::WithdrawLong { .. } => ActionType::WithdrawLongOption,
            Action::DepositCollateral { .. } => ActionType::DepositCollateral,
            Action::WithdrawCollateral { .. } => ActionType::WithdrawCollateral,
            Action::SettleVault { .. } => ActionType::SettleVault,
            Action::Redeem { .. } => ActionType::Redeem,
            Action::Call { .. } => ActionType::Call,
            Action::Liquidate { .. } => ActionType::Liquidate,
        }
    }
}

fn slot(index: u64) -> Result<SlotIndex> {
    usize::try_from(index).map_err(|_| ProtocolError::InvalidIndex(usize::MAX))
}

impl TryFrom<&ActionArgs> for Action {
    type Error = ProtocolError;

    fn try_from(args: &ActionArgs) -> Result<Self> {
        let a = args;
        Ok(match a.action_type {
            ActionType::OpenVault => {
                if a.owner.is_zero() {
                    return Err(ProtocolError::ZeroOwner);
                }
                Action::OpenVault { owner: a.owner, vault_id: a.vault_id, vault_type: VaultType::try_from(a.index)? }
            }
            ActionType::MintShortOption => Action::MintShort {
                owner: a.owner,
                vault_id: a.vault_id,
                to: a.second_address,
                otoken: a.asset,
                index: slot(a.index)?,
                amount: a.amount,
            },
            ActionType::BurnShortOption => Action::BurnShort {
                owner: a.owner,
                vault_id: a.vault_id,
                from: a.second_address,
                otoken: a.asset,
                index: slot(a.index)?,
                amount: a.amount,
            },
            ActionType::DepositLongOption => Action::DepositLong {
                owner: a.owner,
                vault_id: a.vault_id,
                from: a.second_address,
                otoken: a.asset,
                index: slot(a.index)?,
                amount: a.amount,
            },
            ActionType::WithdrawLongOption => Action::WithdrawLong {
                owner: a.owner,
                vault_id: a.vault_id,
                to: a.second_address,
                otoken: a.asset,
                index: slot(a.index)?,
                amount: a.amount,
            },
            ActionType::DepositCollateral => Action::DepositCollateral {
                owner: a.owner,
                vault_id: a.vault_id,
                from: a.second_address,
                asset: a.asset,
                index: slot(a.index)?,
                amount: a.amount,
            },
            ActionType::WithdrawCollateral => Action::WithdrawCollateral {
                owner: a.owner,
                vault_id: a.vault_id,
                to: a.second_address,
                asset: a.asset,
                index: slot(a.index)?,
                amount: a.amount,
            },
            ActionType::SettleVault => Action::SettleVault { owner: a.owner, vault_id: a.vault_id, to: a.second_address },
            ActionType::Redeem => Action::Redeem { receiver: a.second_address, otoken: a.asset, amount: a.amount },
            ActionType::Call => Action::Call { callee: a.second_address, data: a.data.clone() },
            ActionType::Liquidate => Action::Liquidate {
                owner: a.owner,
                vault_id: a.vault_id,
                receiver: a.second_address,
                amount: a.amount,
                round_id: a.index,
            },
            ActionType::InvalidAction => return Err(ProtocolError::InvalidActionType(ActionType::InvalidAction as u8)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_encoding_round_trips_through_json() {
        let owner = Address::from_low_u64(1);
        let args = ActionArgs::open_vault(owner, 1, VaultType::NakedMargin);
        let json = serde_json::to_string(&args).unwrap();
        assert!(json.contains("\"action_type\":0"));
        assert!(json.contains("\"index\":1"));
        assert_eq!(serde_json::from_str::<ActionArgs>(&json).unwrap(), args);

        let err = serde_json::from_str::<ActionArgs>(r#"{"action_type":12}"#).unwrap_err();
        assert!(err.to_string().contains("invalid action type 12"));
    }

    #[test]
    fn omitted_fields_default_to_zero() {
        let args: ActionArgs = serde_json::from_str(r#"{"action_type":9,"second_address":"0x0000000000000000000000000000000000000007"}"#).unwrap();
        assert_eq!(Action::try_from(&args).unwrap(), Action::Call { callee: Address::from_low_u64(7), data: vec![] });
    }

    #[test]
    fn open_vault_parsing() {
        let owner = Address::from_low_u64(1);
        let parsed = Action::try_from(&ActionArgs::open_vault(owner, 4, VaultType::FullyCollateralized)).unwrap();
        assert_eq!(parsed.vault(), Some((owner, 4)));

        let zero_owner = ActionArgs::open_vault(Address::ZERO, 1, VaultType::NakedMargin);
        assert_eq!(Action::try_from(&zero_owner), Err(ProtocolError::ZeroOwner));

        let bad_type = ActionArgs { index: 2, ..ActionArgs::open_vault(owner, 1, VaultType::NakedMargin) };
        assert_eq!(Action::try_from(&bad_type), Err(ProtocolError::InvalidVaultType(2)));
    }

    #[test]
    fn invalid_action_is_rejected() {
        let args = ActionArgs::new(ActionType::InvalidAction);
        assert_eq!(Action::try_from(&args), Err(ProtocolError::InvalidActionType(10)));
    }

    #[test]
    fn liquidate_carries_round_in_index() {
        let owner = Address::from_low_u64(1);
        let args = ActionArgs::liquidate(owner, owner, 3, 5, 15);
        match Action::try_from(&args).unwrap() {
            Action::Liquidate { round_id, amount, .. } => {
                assert_eq!(round_id, 15);
                assert_eq!(amount, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
