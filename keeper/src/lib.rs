//! Vault monitoring for liquidation keepers

pub mod health;

pub use health::{assess_vault, liquidation_candidates, scan_vaults, HealthStatus, VaultHealth};
