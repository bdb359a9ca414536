//! Health calculation for margin vaults

use anyhow::{Context, Result};
use opvault_model::{Address, Protocol, VaultRecord, VaultType};

const BPS: i128 = 10_000;

/// Where a vault stands relative to its collateral requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// No short outstanding
    Idle,
    Healthy,
    /// Covered, but within the buffer above the requirement
    PreLiquidation,
    /// Eligible for liquidation at the scanned round
    Liquidatable { debt_price: u128 },
    /// Short expired; only settlement applies
    Expired,
}

/// Snapshot of one vault for keeper monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHealth {
    pub owner: Address,
    pub vault_id: u64,
    pub vault_type: VaultType,
    pub short: Option<Address>,
    pub short_amount: u128,
    pub collateral: u128,
    pub required: u128,
    pub status: HealthStatus,
}

impl VaultHealth {
    pub fn health(&self) -> i128 {
        calculate_health(self.collateral, self.required)
    }

    /// Collateral missing to reach the requirement, 0 when covered
    pub fn shortfall(&self) -> u128 {
        self.required.saturating_sub(self.collateral)
    }
}

/// Calculate health: collateral - required
///
/// Returns health value where:
/// - health < 0: below the requirement
/// - 0 <= health < buffer: pre-liquidation zone
/// - health >= buffer: healthy
pub fn calculate_health(collateral: u128, required: u128) -> i128 {
    clamp_i128(collateral).saturating_sub(clamp_i128(required))
}

/// True when health is non-negative but below `buffer_bps` of the requirement
pub fn is_in_preliq_zone(health: i128, required: u128, buffer_bps: u64) -> bool {
    let buffer = clamp_i128(required).saturating_mul(i128::from(buffer_bps)) / BPS;
    health >= 0 && health < buffer
}

fn clamp_i128(value: u128) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}

/// Assess one vault.
///
/// With `round_id` set, naked margin vaults are also checked for liquidation
/// eligibility at that price round. A round that does not exist for the
/// vault's underlying is logged and treated as "not liquidatable".
pub fn assess_vault(
    protocol: &Protocol,
    owner: &Address,
    vault_id: u64,
    round_id: Option<u64>,
    now: u64,
    buffer_bps: u64,
) -> Result<VaultHealth> {
    let record = protocol
        .get_vault(owner, vault_id)
        .with_context(|| format!("Failed to load vault {} of {}", vault_id, owner))?;
    assess_record(protocol, owner, vault_id, record, round_id, now, buffer_bps)
}

fn assess_record(
    protocol: &Protocol,
    owner: &Address,
    vault_id: u64,
    record: &VaultRecord,
    round_id: Option<u64>,
    now: u64,
    buffer_bps: u64,
) -> Result<VaultHealth> {
    let collateral = record.vault.collateral_amount();
    let mut health = VaultHealth {
        owner: *owner,
        vault_id,
        vault_type: record.vault_type,
        short: None,
        short_amount: 0,
        collateral,
        required: 0,
        status: HealthStatus::Idle,
    };

    let Some((short, short_amount)) = record.vault.short() else {
        return Ok(health);
    };
    health.short = Some(short);
    health.short_amount = short_amount;

    let terms = protocol.ledger.otokens.terms(&short)?;
    if terms.is_expired(now) {
        health.status = HealthStatus::Expired;
        return Ok(health);
    }

    health.required = protocol
        .required_collateral(owner, vault_id, now)
        .with_context(|| format!("Failed to compute requirement of vault {} of {}", vault_id, owner))?;

    if let (Some(round_id), VaultType::NakedMargin) = (round_id, record.vault_type) {
        match protocol.is_liquidatable(owner, vault_id, round_id, now) {
            Ok(true) => {
                let quote = protocol.liquidation_quote(owner, vault_id, round_id, now)?;
                log::debug!("vault {} of {} liquidatable at round {}", vault_id, owner, round_id);
                health.status = HealthStatus::Liquidatable { debt_price: quote.debt_price };
                return Ok(health);
            }
            Ok(false) => {}
            Err(e) => log::warn!("vault {} of {}: round {} unusable: {}", vault_id, owner, round_id, e),
        }
    }

    health.status = if is_in_preliq_zone(health.health(), health.required, buffer_bps) {
        HealthStatus::PreLiquidation
    } else {
        HealthStatus::Healthy
    };
    Ok(health)
}

/// Assess every vault of every owner
pub fn scan_vaults(protocol: &Protocol, round_id: Option<u64>, now: u64, buffer_bps: u64) -> Result<Vec<VaultHealth>> {
    let mut out = Vec::new();
    for (owner, vault_id, record) in protocol.ledger.vaults.iter() {
        out.push(assess_record(protocol, &owner, vault_id, record, round_id, now, buffer_bps)?);
    }
    log::info!("scanned {} vaults", out.len());
    Ok(out)
}

/// Liquidatable vaults, largest shortfall first
pub fn liquidation_candidates(scan: &[VaultHealth]) -> Vec<&VaultHealth> {
    let mut candidates: Vec<&VaultHealth> = scan
        .iter()
        .filter(|h| matches!(h.status, HealthStatus::Liquidatable { .. }))
        .collect();
    candidates.sort_by(|a, b| b.shortfall().cmp(&a.shortfall()));
    candidates
}
