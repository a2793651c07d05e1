// Genesis committee ordering under arbitrary delegations and listing order

use proptest::prelude::*;
use std::cmp::Ordering;
use tenure::{Allocation, GenesisConfig, GenesisDelegation, GenesisValidator};
use tenure_consensus::rank_order;
use tenure_core::{Address, CommonParams, Public};

const DELEGATOR: Address = Address([0xee; 20]);

fn config(validators: &[(u8, u64, u64)]) -> GenesisConfig {
    GenesisConfig {
        block_number: 0,
        timestamp: 0,
        params: CommonParams::default().with_validator_bounds(1, 8),
        stakes: vec![Allocation { address: DELEGATOR, amount: 1_000_000 }],
        coins: vec![],
        delegations: validators
            .iter()
            .map(|(seed, delegation, _)| GenesisDelegation {
                delegator: DELEGATOR,
                delegatee: Public([*seed; 32]).address(),
                amount: *delegation,
            })
            .collect(),
        validators: validators
            .iter()
            .map(|(seed, _, deposit)| GenesisValidator {
                pubkey: Public([*seed; 32]),
                deposit: *deposit,
                metadata: String::new(),
            })
            .collect(),
    }
}

/// Up to eight validators with distinct keys; few distinct deposits so ties happen.
fn validator_set() -> impl Strategy<Value = Vec<(u8, u64, u64)>> {
    prop::collection::vec((1u64..5_000, 0u64..3), 1..8).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (delegation, deposit))| (i as u8 + 1, delegation, 100 + deposit))
            .collect()
    })
}

proptest! {
    #[test]
    fn genesis_committee_follows_rank_order(validators in validator_set()) {
        let state = config(&validators).build().unwrap();
        prop_assert_eq!(state.validators.len(), validators.len());
        for pair in state.validators.windows(2) {
            prop_assert_eq!(rank_order(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn genesis_committee_ignores_listing_order(
        shuffled in validator_set().prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let (listed, reordered) = shuffled;
        let a = config(&listed).build().unwrap();
        let b = config(&reordered).build().unwrap();
        prop_assert_eq!(a.validator_addresses(), b.validator_addresses());
        prop_assert_eq!(a.state_root().unwrap(), b.state_root().unwrap());
    }
}
