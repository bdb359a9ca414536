//! Vault state and the per-owner vault store
//!
//! A vault holds at most one short otoken, one long otoken and one
//! collateral asset, each as a pair of parallel lists. Entries are only ever
//! addressed at index 0; an entry whose amount reaches zero is removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{ProtocolError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultType {
    /// Short backed by collateral or by a matching long option
    FullyCollateralized = 0,
    /// Short backed by partial collateral only; longs are not allowed
    NakedMargin = 1,
}

impl TryFrom<u64> for VaultType {
    type Error = ProtocolError;

    fn try_from(value: u64) -> Result<Self> {
        match value {
            0 => Ok(VaultType::FullyCollateralized),
            1 => Ok(VaultType::NakedMargin),
            other => Err(ProtocolError::InvalidVaultType(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Collateral,
    Long,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MintBurn {
    Mint(u128),
    Burn(u128),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub short_otokens: Vec<Address>,
    pub short_amounts: Vec<u128>,
    pub long_otokens: Vec<Address>,
    pub long_amounts: Vec<u128>,
    pub collateral_assets: Vec<Address>,
    pub collateral_amounts: Vec<u128>,
}

impl Vault {
    pub fn short(&self) -> Option<(Address, u128)> {
        first(&self.short_otokens, &self.short_amounts)
    }

    pub fn long(&self) -> Option<(Address, u128)> {
        first(&self.long_otokens, &self.long_amounts)
    }

    pub fn collateral(&self) -> Option<(Address, u128)> {
        first(&self.collateral_assets, &self.collateral_amounts)
    }

    pub fn short_amount(&self) -> u128 {
        self.short().map_or(0, |(_, amount)| amount)
    }

    pub fn long_amount(&self) -> u128 {
        self.long().map_or(0, |(_, amount)| amount)
    }

    pub fn collateral_amount(&self) -> u128 {
        self.collateral().map_or(0, |(_, amount)| amount)
    }

    pub fn is_empty(&self) -> bool {
        self.short_otokens.is_empty() && self.long_otokens.is_empty() && self.collateral_assets.is_empty()
    }

    pub fn add_short(&mut self, otoken: Address, amount: u128, index: usize) -> Result<()> {
        add_entry(&mut self.short_otokens, &mut self.short_amounts, otoken, amount, index, ProtocolError::ShortMismatch)
    }

    pub fn remove_short(&mut self, otoken: Address, amount: u128, index: usize) -> Result<()> {
        remove_entry(&mut self.short_otokens, &mut self.short_amounts, otoken, amount, index, ProtocolError::ShortMismatch)
    }

    pub fn add_long(&mut self, otoken: Address, amount: u128, index: usize) -> Result<()> {
        add_entry(&mut self.long_otokens, &mut self.long_amounts, otoken, amount, index, ProtocolError::LongMismatch)
    }

    pub fn remove_long(&mut self, otoken: Address, amount: u128, index: usize) -> Result<()> {
        remove_entry(&mut self.long_otokens, &mut self.long_amounts, otoken, amount, index, ProtocolError::LongMismatch)
    }

    pub fn add_collateral(&mut self, asset: Address, amount: u128, index: usize) -> Result<()> {
        add_entry(
            &mut self.collateral_assets,
            &mut self.collateral_amounts,
            asset,
            amount,
            index,
            ProtocolError::CollateralMismatch,
        )
    }

    pub fn remove_collateral(&mut self, asset: Address, amount: u128, index: usize) -> Result<()> {
        remove_entry(
            &mut self.collateral_assets,
            &mut self.collateral_amounts,
            asset,
            amount,
            index,
            ProtocolError::CollateralMismatch,
        )
    }
}

fn first(assets: &[Address], amounts: &[u128]) -> Option<(Address, u128)> {
    Some((*assets.first()?, *amounts.first()?))
}

fn add_entry(
    assets: &mut Vec<Address>,
    amounts: &mut Vec<u128>,
    asset: Address,
    amount: u128,
    index: usize,
    mismatch: ProtocolError,
) -> Result<()> {
    if amount == 0 {
        return Err(ProtocolError::ZeroAmount);
    }
    if index != 0 {
        return Err(ProtocolError::InvalidIndex(index));
    }
    match assets.first() {
        None => {
            assets.push(asset);
            amounts.push(amount);
        }
        Some(existing) if *existing == asset => {
            amounts[0] = amounts[0].checked_add(amount).ok_or(ProtocolError::Overflow)?;
        }
        Some(_) => return Err(mismatch),
    }
    Ok(())
}

fn remove_entry(
    assets: &mut Vec<Address>,
    amounts: &mut Vec<u128>,
    asset: Address,
    amount: u128,
    index: usize,
    mismatch: ProtocolError,
) -> Result<()> {
    if amount == 0 {
        return Err(ProtocolError::ZeroAmount);
    }
    if index >= assets.len() {
        return Err(ProtocolError::InvalidIndex(index));
    }
    if assets[index] != asset {
        return Err(mismatch);
    }
    let remaining = amounts[index].checked_sub(amount).ok_or(ProtocolError::ExceedsVaultBalance)?;
    if remaining == 0 {
        assets.remove(index);
        amounts.remove(index);
    } else {
        amounts[index] = remaining;
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub vault: Vault,
    pub vault_type: VaultType,
    /// Timestamp of the latest owner-side adjustment
    pub latest_update: u64,
}

/// (owner, vault id) -> vault
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStore {
    vaults: BTreeMap<Address, BTreeMap<u64, VaultRecord>>,
}

impl VaultStore {
    pub fn open_vault(&mut self, owner: Address, vault_id: u64, vault_type: VaultType, now: u64) -> Result<()> {
        let owned = self.vaults.entry(owner).or_default();
        if owned.contains_key(&vault_id) {
            return Err(ProtocolError::VaultAlreadyExists { owner, vault_id });
        }
        owned.insert(vault_id, VaultRecord { vault: Vault::default(), vault_type, latest_update: now });
        Ok(())
    }

    pub fn get_vault(&self, owner: &Address, vault_id: u64) -> Result<&VaultRecord> {
        self.vaults
            .get(owner)
            .and_then(|owned| owned.get(&vault_id))
            .ok_or(ProtocolError::VaultNotFound { owner: *owner, vault_id })
    }

    pub fn get_vault_mut(&mut self, owner: &Address, vault_id: u64) -> Result<&mut VaultRecord> {
        self.vaults
            .get_mut(owner)
            .and_then(|owned| owned.get_mut(&vault_id))
            .ok_or(ProtocolError::VaultNotFound { owner: *owner, vault_id })
    }

    pub fn apply_deposit(
        &mut self,
        owner: &Address,
        vault_id: u64,
        kind: AssetKind,
        asset: Address,
        amount: u128,
        index: usize,
    ) -> Result<()> {
        let record = self.get_vault_mut(owner, vault_id)?;
        match kind {
            AssetKind::Collateral => record.vault.add_collateral(asset, amount, index),
            AssetKind::Long => {
                if record.vault_type == VaultType::NakedMargin {
                    return Err(ProtocolError::LongNotAllowed);
                }
                record.vault.add_long(asset, amount, index)
            }
        }
    }

    pub fn apply_withdraw(
        &mut self,
        owner: &Address,
        vault_id: u64,
        kind: AssetKind,
        asset: Address,
        amount: u128,
        index: usize,
    ) -> Result<()> {
        let record = self.get_vault_mut(owner, vault_id)?;
        match kind {
            AssetKind::Collateral => record.vault.remove_collateral(asset, amount, index),
            AssetKind::Long => record.vault.remove_long(asset, amount, index),
        }
    }

    pub fn apply_mint_burn(
        &mut self,
        owner: &Address,
        vault_id: u64,
        otoken: Address,
        change: MintBurn,
        index: usize,
    ) -> Result<()> {
        let record = self.get_vault_mut(owner, vault_id)?;
        match change {
            MintBurn::Mint(amount) => record.vault.add_short(otoken, amount, index),
            MintBurn::Burn(amount) => record.vault.remove_short(otoken, amount, index),
        }
    }

    /// Record an owner-side adjustment at `now`
    pub fn touch(&mut self, owner: &Address, vault_id: u64, now: u64) -> Result<()> {
        self.get_vault_mut(owner, vault_id)?.latest_update = now;
        Ok(())
    }

    /// Empty the vault, returning what it held. The record itself stays.
    pub fn clear(&mut self, owner: &Address, vault_id: u64) -> Result<Vault> {
        let record = self.get_vault_mut(owner, vault_id)?;
        Ok(std::mem::take(&mut record.vault))
    }

    pub fn vault_count(&self, owner: &Address) -> u64 {
        self.vaults.get(owner).map_or(0, |owned| owned.len() as u64)
    }

    /// All vaults ordered by (owner, id)
    pub fn iter(&self) -> impl Iterator<Item = (Address, u64, &VaultRecord)> + '_ {
        self.vaults
            .iter()
            .flat_map(|(owner, owned)| owned.iter().map(move |(id, record)| (*owner, *id, record)))
    }
}
