use serde::{Deserialize, Serialize};

use crate::address::Address;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerEvent {
    VaultOpened {
        owner: Address,
        vault_id: u64,
        vault_type: u64,
    },
    CollateralDeposited {
        asset: Address,
        owner: Address,
        from: Address,
        vault_id: u64,
        amount: u128,
    },
    CollateralWithdrawn {
        asset: Address,
        owner: Address,
        to: Address,
        vault_id: u64,
        amount: u128,
    },
    LongOtokenDeposited {
        otoken: Address,
        owner: Address,
        from: Address,
        vault_id: u64,
        amount: u128,
    },
    LongOtokenWithdrawn {
        otoken: Address,
        owner: Address,
        to: Address,
        vault_id: u64,
        amount: u128,
    },
    ShortOtokenMinted {
        otoken: Address,
        owner: Address,
        to: Address,
        vault_id: u64,
        amount: u128,
    },
    ShortOtokenBurned {
        otoken: Address,
        owner: Address,
        from: Address,
        vault_id: u64,
        amount: u128,
    },
    Redeem {
        otoken: Address,
        redeemer: Address,
        receiver: Address,
        collateral: Address,
        otoken_burned: u128,
        payout: u128,
    },
    VaultSettled {
        owner: Address,
        to: Address,
        vault_id: u64,
        payout: u128,
    },
    VaultLiquidated {
        liquidator: Address,
        receiver: Address,
        owner: Address,
        vault_id: u64,
        round_id: u64,
        debt_amount: u128,
        collateral_payout: u128,
    },
    CallExecuted {
        from: Address,
        to: Address,
        data: Vec<u8>,
    },
    AccountOperatorUpdated {
        account_owner: Address,
        operator: Address,
        is_set: bool,
    },
    SystemPartiallyPaused {
        paused: bool,
    },
    SystemFullyPaused {
        paused: bool,
    },
    CallRestricted {
        is_restricted: bool,
    },
}
