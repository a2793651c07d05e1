// Validator set calculation
//
// SAFETY INVARIANTS:
// 1. Pure: the same pool, jail, ledger, committee and params yield the same set
// 2. Order is delegation desc, deposit desc, address asc; it drives author rotation
// 3. Promotion needs delegation >= threshold; retention (backfill only) needs a
//    sitting seat and deposit >= minimum
// 4. |set| <= max; |set| >= min whenever promoted plus retainable candidates allow it
// 5. Jailed and banned accounts are never elected

use log::debug;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tenure_core::{Address, CommonParams};
use tenure_state::{CandidatePool, JailRegistry, StakeLedger, Validator};

/// Canonical committee ordering.
pub fn rank_order(a: &Validator, b: &Validator) -> Ordering {
    b.delegation
        .cmp(&a.delegation)
        .then_with(|| b.deposit.cmp(&a.deposit))
        .then_with(|| a.address.cmp(&b.address))
}

/// Order used when backfilling from the sitting committee.
fn retention_order(a: &Validator, b: &Validator) -> Ordering {
    b.deposit
        .cmp(&a.deposit)
        .then_with(|| b.delegation.cmp(&a.delegation))
        .then_with(|| a.address.cmp(&b.address))
}

/// Elect the committee for the next term.
pub fn compute_validators(
    candidates: &CandidatePool,
    jail: &JailRegistry,
    ledger: &StakeLedger,
    sitting: &[Validator],
    params: &CommonParams,
) -> Vec<Validator> {
    let delegations = ledger.delegation_totals();
    let (mut elected, passed_over): (Vec<Validator>, Vec<Validator>) = candidates
        .iter()
        .filter(|c| !jail.is_jailed(&c.address) && !jail.is_banned(&c.address))
        .map(|c| Validator {
            address: c.address,
            pubkey: c.pubkey,
            delegation: delegations.get(&c.address).copied().unwrap_or(0),
            deposit: c.deposit,
        })
        .partition(|v| v.delegation >= params.delegation_threshold);

    elected.sort_by(rank_order);
    elected.truncate(params.max_num_of_validators);

    if elected.len() < params.min_num_of_validators {
        let seated: BTreeSet<&Address> = sitting.iter().map(|v| &v.address).collect();
        let mut retained: Vec<Validator> = passed_over
            .into_iter()
            .filter(|v| seated.contains(&v.address) && v.deposit >= params.min_deposit)
            .collect();
        retained.sort_by(retention_order);
        retained.truncate(params.min_num_of_validators - elected.len());
        debug!(
            "{} promoted below minimum {}, retaining {} sitting validators",
            elected.len(),
            params.min_num_of_validators,
            retained.len()
        );
        elected.extend(retained);
        elected.sort_by(rank_order);
    }

    elected
}
