//! Fuzzing suite for controller batches
//!
//! Run with: cargo test --features fuzz
//! Increase cases: PROPTEST_CASES=1000 cargo test --features fuzz
//!
//! - Snapshot-based "no mutation on error" checking
//! - Global invariants (pool solvency, supply matches shorts, no naked longs)
//! - Random batch state machine
//! - Focused property tests for the calculator and the factory

#![cfg(feature = "fuzz")]

mod common;

use common::*;
use opvault_model::*;
use proptest::prelude::*;

// ============================================================================
// SECTION 1: ACTIONS
// ============================================================================

#[derive(Clone, Debug)]
enum FuzzAction {
    Open { vault_id: u64, naked: bool },
    Deposit { vault_id: u64, amount: u128 },
    Withdraw { vault_id: u64, amount: u128 },
    Mint { vault_id: u64, strike: usize, amount: u128 },
    Burn { vault_id: u64, strike: usize, amount: u128 },
    DepositLong { vault_id: u64, strike: usize, amount: u128 },
    WithdrawLong { vault_id: u64, strike: usize, amount: u128 },
    Advance { secs: u64 },
}

const STRIKES: [u128; 3] = [150, 200, 250];

fn action_strategy() -> impl Strategy<Value = FuzzAction> {
    let vault_id = 1u64..4;
    let strike = 0usize..STRIKES.len();
    let usdc = (0u128..400).prop_map(|n| n * USDC);
    let otokens = (0u128..8).prop_map(|n| n * E18 / 4);
    prop_oneof![
        (vault_id.clone(), any::<bool>()).prop_map(|(vault_id, naked)| FuzzAction::Open { vault_id, naked }),
        (vault_id.clone(), usdc.clone()).prop_map(|(vault_id, amount)| FuzzAction::Deposit { vault_id, amount }),
        (vault_id.clone(), usdc).prop_map(|(vault_id, amount)| FuzzAction::Withdraw { vault_id, amount }),
        (vault_id.clone(), strike.clone(), otokens.clone())
            .prop_map(|(vault_id, strike, amount)| FuzzAction::Mint { vault_id, strike, amount }),
        (vault_id.clone(), strike.clone(), otokens.clone())
            .prop_map(|(vault_id, strike, amount)| FuzzAction::Burn { vault_id, strike, amount }),
        (vault_id.clone(), strike.clone(), otokens.clone())
            .prop_map(|(vault_id, strike, amount)| FuzzAction::DepositLong { vault_id, strike, amount }),
        (vault_id, strike, otokens)
            .prop_map(|(vault_id, strike, amount)| FuzzAction::WithdrawLong { vault_id, strike, amount }),
        (0u64..DAY).prop_map(|secs| FuzzAction::Advance { secs }),
    ]
}

// ============================================================================
// SECTION 2: STATE
// ============================================================================

struct FuzzState {
    world: World,
    puts: Vec<Address>,
    now: u64,
}

impl FuzzState {
    fn new() -> Self {
        let mut world = world();
        world.whitelist_usdc();
        let puts = STRIKES.iter().map(|strike| world.create_put(*strike)).collect();
        Self { world, puts, now: NOW }
    }

    fn args(&self, action: &FuzzAction) -> Option<ActionArgs> {
        let alice = self.world.alice;
        let usdc = self.world.usdc;
        Some(match *action {
            FuzzAction::Open { vault_id, naked } => {
                let vault_type = if naked { VaultType::NakedMargin } else { VaultType::FullyCollateralized };
                ActionArgs::open_vault(alice, vault_id, vault_type)
            }
            FuzzAction::Deposit { vault_id, amount } => ActionArgs::deposit_collateral(alice, alice, usdc, vault_id, amount),
            FuzzAction::Withdraw { vault_id, amount } => ActionArgs::withdraw_collateral(alice, alice, usdc, vault_id, amount),
            FuzzAction::Mint { vault_id, strike, amount } => {
                ActionArgs::mint_short(alice, alice, self.puts[strike], vault_id, amount)
            }
            FuzzAction::Burn { vault_id, strike, amount } => {
                ActionArgs::burn_short(alice, alice, self.puts[strike], vault_id, amount)
            }
            FuzzAction::DepositLong { vault_id, strike, amount } => {
                ActionArgs::deposit_long(alice, alice, self.puts[strike], vault_id, amount)
            }
            FuzzAction::WithdrawLong { vault_id, strike, amount } => {
                ActionArgs::withdraw_long(alice, alice, self.puts[strike], vault_id, amount)
            }
            FuzzAction::Advance { .. } => return None,
        })
    }

    /// Run one batch; returns whether it committed
    fn execute(&mut self, batch: &[FuzzAction]) -> bool {
        let mut args = Vec::new();
        for action in batch {
            match action {
                FuzzAction::Advance { secs } => self.now = (self.now + secs).min(EXPIRY - 1),
                other => args.extend(self.args(other)),
            }
        }
        if args.is_empty() {
            return true;
        }

        let before = self.world.protocol.ledger.clone();
        let events_before = self.world.protocol.events.len();
        let result = self.world.protocol.operate(self.world.alice, &args, self.now);
        if result.is_err() {
            assert_eq!(self.world.protocol.ledger, before, "failed batch mutated the ledger");
            assert_eq!(self.world.protocol.events.len(), events_before, "failed batch emitted events");
        }
        self.check_invariants();
        result.is_ok()
    }

    fn check_invariants(&self) {
        let protocol = &self.world.protocol;
        let pool = protocol.controller.pool;
        let mut collateral = 0u128;
        let mut shorts = vec![0u128; self.puts.len()];
        let mut longs = vec![0u128; self.puts.len()];

        for (owner, vault_id, record) in protocol.ledger.vaults.iter() {
            if record.vault_type == VaultType::NakedMargin {
                assert!(record.vault.long().is_none(), "naked vault {} of {} holds a long", vault_id, owner);
            }
            assert!(
                protocol.is_valid_final_state(&owner, vault_id, self.now).unwrap_or(false),
                "committed vault {} of {} is not in a valid final state",
                vault_id,
                owner
            );
            collateral += record.vault.collateral_amount();
            for (i, put) in self.puts.iter().enumerate() {
                if let Some((short, amount)) = record.vault.short() {
                    if short == *put {
                        shorts[i] += amount;
                    }
                }
                if let Some((long, amount)) = record.vault.long() {
                    if long == *put {
                        longs[i] += amount;
                    }
                }
            }
        }

        assert_eq!(protocol.balance_of(&self.world.usdc, &pool), collateral, "pool holds exactly vault collateral");
        for (i, put) in self.puts.iter().enumerate() {
            assert_eq!(protocol.otoken(put).unwrap().total_supply(), shorts[i], "supply of {} != minted shorts", put);
            assert_eq!(protocol.balance_of(put, &pool), longs[i], "pool holds exactly vault longs");
        }
    }
}

// ============================================================================
// SECTION 3: STATE MACHINE
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn fuzz_random_batches(
        batches in prop::collection::vec(prop::collection::vec(action_strategy(), 1..5), 20..60)
    ) {
        let mut state = FuzzState::new();
        for batch in &batches {
            state.execute(batch);
        }
    }

    #[test]
    fn fuzz_batches_with_dust_limit(
        dust in 0u128..100,
        batches in prop::collection::vec(prop::collection::vec(action_strategy(), 1..5), 20..60)
    ) {
        let mut state = FuzzState::new();
        state.world.protocol.oracle.set_dust_limit(state.world.usdc, dust * USDC);
        for batch in &batches {
            state.execute(batch);
        }
    }
}

// ============================================================================
// SECTION 4: FOCUSED PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Minting then burning the same amount restores the vault and the supply
    #[test]
    fn fuzz_prop_mint_burn_round_trip(amount in 1u128..4 * E18, collateral in 1_000u128..5_000) {
        let mut state = FuzzState::new();
        let alice = state.world.alice;
        let usdc = state.world.usdc;
        let put = state.puts[1];
        let setup = [
            ActionArgs::open_vault(alice, 1, VaultType::FullyCollateralized),
            ActionArgs::deposit_collateral(alice, alice, usdc, 1, collateral * USDC),
        ];
        state.world.protocol.operate(alice, &setup, NOW).unwrap();
        let before = state.world.protocol.get_vault(&alice, 1).unwrap().clone();

        let round_trip = [
            ActionArgs::mint_short(alice, alice, put, 1, amount),
            ActionArgs::burn_short(alice, alice, put, 1, amount),
        ];
        let committed = state.world.protocol.operate(alice, &round_trip, NOW).is_ok();
        prop_assert!(committed);
        prop_assert_eq!(state.world.protocol.get_vault(&alice, 1).unwrap(), &before);
        prop_assert_eq!(state.world.protocol.otoken(&put).unwrap().total_supply(), 0);
    }

    /// Naked requirement never exceeds the fully collateralized one for puts
    #[test]
    fn fuzz_prop_naked_put_bounded_by_strike(
        strike in 1u128..5_000,
        spot in 1u128..10_000,
        amount in 1u128..100,
        days in 1u64..30
    ) {
        let w = world();
        let calc = MarginCalculator::new(
            w.protocol.controller.config(),
            &w.protocol.oracle,
            &w.protocol.assets,
            &w.protocol.ledger.otokens,
        );
        let terms = w.put_terms(strike);
        let naked = calc.naked_margin_required(&terms, amount * E18, spot * USD, EXPIRY - days * DAY).unwrap();
        prop_assert!(naked <= strike * amount * USDC, "naked {} above cash secured {}", naked, strike * amount * USDC);
        prop_assert!(naked > 0);
    }

    /// The predicted address is where the factory places the option
    #[test]
    fn fuzz_prop_target_address_matches(strike in 1u128..100_000, is_put in any::<bool>(), weeks in 0u64..52) {
        let mut w = world();
        let product = Product { underlying: w.weth, strike_asset: w.usdc, collateral_asset: w.usdc };
        w.protocol.whitelist.whitelist_product(w.owner, product).unwrap();
        let terms = OptionTerms { strike_price: strike * E18, is_put, expiry: EXPIRY + weeks * 7 * DAY, ..w.put_terms(1) };
        let target = w.protocol.target_otoken_address(&terms).unwrap();
        prop_assert_eq!(w.protocol.create_otoken(terms, NOW).unwrap(), target);
    }
}
