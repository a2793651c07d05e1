// End-to-end chain scenarios: genesis config, block import and queries
//
// Coverage:
// 1. An offline validator is jailed, serves custody and wins its seat back
// 2. Committee size follows quorum-signed params changes
// 3. A params change in the closing block already governs the election
// 4. Possible authors and term metadata by height, revert, persist/resume
// 5. Out-of-band misbehavior reports ban at the next block
// 6. A params change leaves the rest of its own block untouched
// 7. Five seated validators: the idle one is jailed and a newly delegated one replaces it
// 8. Equal delegations rank by deposit, then by address, as the committee size changes
// 9. A change never decides the term end or jail periods of its own block
// 10. Unbounded periods from a params change saturate

use ed25519_dalek::SigningKey;
use tenure::{ActionError, Allocation, Block, Chain, ChainError, GenesisConfig, GenesisDelegation, GenesisValidator, ImportedBlock};
use tenure_consensus::{Evidence, MisbehaviorError};
use tenure_core::{Action, Address, BlockHeader, CommonParams, Public, Transaction};
use tenure_governance::{sign_params_change, ParamsError};
use tenure_state::{MemoryStore, NominationError};

const DELEGATOR: u8 = 9;

fn signer(n: u8) -> SigningKey {
    SigningKey::from_bytes(&[n; 32])
}

fn key(n: u8) -> Public {
    Public(signer(n).verifying_key().to_bytes())
}

fn addr(n: u8) -> Address {
    key(n).address()
}

fn params(max: usize) -> CommonParams {
    let mut p = CommonParams::default().with_validator_bounds(2, max);
    p.term_seconds = 100;
    p.delegation_threshold = 1_000;
    p.min_deposit = 100;
    p.nomination_expiration = 10;
    p.custody_period = 2;
    p.release_period = 5;
    p
}

/// Validators `1..` with the given delegations from a single stakeholder.
fn genesis(max: usize, delegations: &[u64]) -> GenesisConfig {
    let seeds = 1..=delegations.len() as u8;
    GenesisConfig {
        block_number: 0,
        timestamp: 0,
        params: params(max),
        stakes: vec![Allocation { address: addr(DELEGATOR), amount: 100_000 }],
        coins: vec![
            Allocation { address: addr(1), amount: 1_000 },
            Allocation { address: addr(5), amount: 200_000 },
        ],
        delegations: seeds
            .clone()
            .zip(delegations)
            .map(|(n, amount)| GenesisDelegation { delegator: addr(DELEGATOR), delegatee: addr(n), amount: *amount })
            .collect(),
        validators: seeds
            .map(|n| GenesisValidator { pubkey: key(n), deposit: 100_000, metadata: String::new() })
            .collect(),
    }
}

fn chain(max: usize, delegations: &[u64]) -> Chain {
    Chain::new(genesis(max, delegations).build().unwrap(), None)
}

fn tx(n: u8, action: Action) -> Transaction {
    Transaction::new(key(n), action)
}

/// A params change signed by the only stakeholder.
fn change(seq: u64, proposed: CommonParams) -> Transaction {
    let signature = sign_params_change(&signer(DELEGATOR), seq, &proposed).unwrap();
    tx(
        DELEGATOR,
        Action::ChangeParams { metadata_seq: seq, params: Box::new(proposed), signatures: vec![signature] },
    )
}

fn change_max(seq: u64, max: usize) -> Transaction {
    change(seq, params(max))
}

/// Import the next block; every validator not in `offline` authors or precommits.
fn produce(chain: &mut Chain, timestamp: u64, txs: Vec<Transaction>, offline: &[Address]) -> ImportedBlock {
    let number = chain.best_block() + 1;
    let online: Vec<Address> = chain
        .get_possible_authors(None)
        .unwrap()
        .into_iter()
        .filter(|a| !offline.contains(a))
        .collect();
    let header = BlockHeader::new(number, timestamp, online[0]).with_precommits(online);
    chain.import_block(&Block::new(header).with_transactions(txs)).unwrap()
}

fn committee(chain: &Chain) -> Vec<Address> {
    chain.get_validators().iter().map(|v| v.address).collect()
}

#[test_log::test]
fn offline_validator_jailed_then_renominated() {
    let (alice, betty) = (addr(1), addr(5));
    let mut chain = chain(4, &[4_200, 4_100, 4_000, 5_000]);
    assert_eq!(committee(&chain), vec![addr(4), alice, addr(2), addr(3)]);

    let block = produce(
        &mut chain,
        10,
        vec![
            tx(5, Action::SelfNominate { deposit: 100_000, metadata: b"betty".to_vec() }),
            tx(DELEGATOR, Action::Delegate { delegatee: betty, quantity: 2 }),
        ],
        &[alice],
    );
    assert!(block.receipts.iter().all(|r| r.is_success()));

    // Term 0 closes: alice never participated, betty lacks delegation
    let transition = produce(&mut chain, 100, vec![], &[alice]).transition.unwrap();
    assert_eq!(transition.jailed, vec![alice]);
    assert_eq!(committee(&chain), vec![addr(4), addr(2), addr(3)]);
    let prisoner = &chain.get_jailed()[0];
    assert_eq!((prisoner.custody_until, prisoner.release_at, prisoner.deposit), (2, 5, 100_000));
    assert_eq!(chain.state().ledger.delegated_to(&alice), 4_200);

    let block = produce(
        &mut chain,
        150,
        vec![
            tx(DELEGATOR, Action::Delegate { delegatee: betty, quantity: 5_000 }),
            tx(1, Action::SelfNominate { deposit: 10, metadata: vec![] }),
        ],
        &[],
    );
    assert!(block.receipts[0].is_success());
    assert_eq!(
        block.receipts[1].result,
        Err(ActionError::Nomination(NominationError::StillInCustody {
            address: alice,
            custody_until: 2,
            current_term: 1,
        }))
    );

    produce(&mut chain, 200, vec![], &[]);
    assert_eq!(committee(&chain), vec![betty, addr(4), addr(2), addr(3)]);

    // Custody over: the prisoner's deposit carries into the new nomination
    let block = produce(&mut chain, 210, vec![tx(1, Action::SelfNominate { deposit: 10, metadata: vec![] })], &[]);
    assert!(block.receipts[0].is_success());
    assert_eq!(chain.state().candidates.get(&alice).unwrap().deposit, 100_010);
    assert!(chain.get_jailed().is_empty());

    produce(&mut chain, 300, vec![], &[]);
    assert_eq!(committee(&chain), vec![betty, addr(4), alice, addr(2)]);
    assert_eq!(chain.state().current_term(), 3);
}

#[test_log::test]
fn committee_size_follows_params_changes() {
    let mut chain = chain(5, &[5_000, 4_000, 3_000, 2_000, 1_000]);
    assert_eq!(chain.get_validators().len(), 5);

    let block = produce(&mut chain, 10, vec![change_max(0, 3)], &[]);
    assert!(block.receipts[0].is_success());
    assert_eq!(block.activated_params.unwrap().max_num_of_validators, 3);
    assert_eq!(chain.params_at(1).max_num_of_validators, 5);
    assert_eq!(chain.params_at(2).max_num_of_validators, 3);

    produce(&mut chain, 100, vec![], &[]);
    assert_eq!(committee(&chain), vec![addr(1), addr(2), addr(3)]);

    let block = produce(&mut chain, 110, vec![change_max(0, 4), change_max(1, 4)], &[]);
    assert_eq!(
        block.receipts[0].result,
        Err(ActionError::Params(ParamsError::SeqMismatch { expected: 1, got: 0 }))
    );
    assert!(block.receipts[1].is_success());

    produce(&mut chain, 200, vec![], &[]);
    assert_eq!(committee(&chain), vec![addr(1), addr(2), addr(3), addr(4)]);
}

#[test_log::test]
fn params_change_without_majority_rejected() {
    let mut chain = chain(5, &[5_000, 4_000, 3_000]);
    let proposed = params(3);
    // Validator 2 holds no stake
    let signature = sign_params_change(&signer(2), 0, &proposed).unwrap();
    let change = tx(2, Action::ChangeParams { metadata_seq: 0, params: Box::new(proposed), signatures: vec![signature] });

    let block = produce(&mut chain, 10, vec![change], &[]);
    assert!(matches!(block.receipts[0].result, Err(ActionError::Params(_))));
    assert_eq!(block.activated_params, None);
    assert_eq!(chain.state().params.next_seq(), 0);
}

#[test_log::test]
fn change_in_closing_block_governs_election() {
    let mut chain = chain(5, &[5_000, 4_000, 3_000, 2_000, 1_000]);
    produce(&mut chain, 10, vec![], &[]);

    let block = produce(&mut chain, 100, vec![change_max(0, 3)], &[]);
    assert_eq!(block.transition.unwrap().validators.len(), 3);
    assert_eq!(chain.params_at(2).max_num_of_validators, 5);
    assert_eq!(chain.params_at(3).max_num_of_validators, 3);
}

#[test_log::test]
fn queries_by_height_and_revert() {
    let alice = addr(1);
    let mut chain = chain(4, &[4_200, 4_100, 4_000, 5_000]);
    produce(&mut chain, 10, vec![], &[alice]);
    produce(&mut chain, 100, vec![], &[alice]);

    assert!(chain.get_possible_authors(Some(2)).unwrap().contains(&alice));
    assert!(!chain.get_possible_authors(Some(3)).unwrap().contains(&alice));
    assert_eq!(chain.get_possible_authors(None).unwrap(), chain.get_possible_authors(Some(3)).unwrap());

    assert_eq!(chain.get_term_metadata(Some(1)).unwrap().term_id, 0);
    let term = chain.get_term_metadata(None).unwrap();
    assert_eq!((term.term_id, term.last_term_finished_block, term.first_block()), (1, 2, 3));

    chain.revert_to(1).unwrap();
    assert_eq!(chain.best_block(), 1);
    assert!(chain.get_jailed().is_empty());
    assert!(chain.get_term_metadata(Some(2)).is_err());

    // Alice shows up in the replacement block
    let transition = produce(&mut chain, 100, vec![], &[]).transition.unwrap();
    assert!(transition.jailed.is_empty());
    assert!(committee(&chain).contains(&alice));
}

#[test_log::test]
fn resume_from_store_matches_live_chain() {
    let mut live = chain(4, &[4_200, 4_100, 4_000, 5_000]);
    produce(&mut live, 10, vec![], &[addr(1)]);
    produce(&mut live, 100, vec![], &[addr(1)]);

    let mut store = MemoryStore::new();
    live.persist(&mut store).unwrap();
    let mut resumed = Chain::from_store(&store, 2, None).unwrap();
    assert_eq!(resumed.state(), live.state());

    let delegate = || vec![tx(DELEGATOR, Action::Delegate { delegatee: addr(2), quantity: 50 })];
    produce(&mut live, 150, delegate(), &[]);
    produce(&mut resumed, 150, delegate(), &[]);
    assert_eq!(resumed.state().state_root().unwrap(), live.state().state_root().unwrap());
}

#[test_log::test]
fn reported_misbehavior_bans_at_next_block() {
    let offender = addr(2);
    let mut chain = chain(4, &[4_200, 4_100, 4_000, 5_000]);
    let evidence = Evidence::DoubleVote {
        offender,
        height: 1,
        round: 0,
        vote_a: b"a".to_vec(),
        vote_b: b"b".to_vec(),
    };
    chain.report_misbehavior(evidence.clone()).unwrap();

    let block = produce(&mut chain, 10, vec![], &[]);
    assert_eq!(block.bans.len(), 1);
    assert!(block.bans[0].was_validator);
    assert_eq!(block.bans[0].forfeited_deposit, 100_000);
    assert_eq!(chain.get_banned(), vec![offender]);
    // Still seated until the term closes
    assert!(committee(&chain).contains(&offender));
    assert_eq!(chain.state().ledger.delegated_to(&offender), 0);

    assert_eq!(
        chain.report_misbehavior(evidence),
        Err(ChainError::Misbehavior(MisbehaviorError::Duplicate))
    );

    produce(&mut chain, 100, vec![], &[]);
    assert!(!committee(&chain).contains(&offender));
    let nominate = tx(2, Action::SelfNominate { deposit: 100, metadata: vec![] });
    let block = produce(&mut chain, 110, vec![nominate], &[]);
    assert_eq!(
        block.receipts[0].result,
        Err(ActionError::Nomination(NominationError::Banned(offender)))
    );
}

#[test_log::test]
fn change_does_not_affect_its_own_block() {
    let mut chain = chain(5, &[5_000, 4_000, 3_000]);
    let mut proposed = params(5);
    proposed.max_candidate_metadata_size = 4;

    let block = produce(
        &mut chain,
        10,
        vec![change(0, proposed), tx(5, Action::SelfNominate { deposit: 100, metadata: b"betty".to_vec() })],
        &[],
    );
    assert!(block.receipts.iter().all(|r| r.is_success()));

    let block = produce(&mut chain, 20, vec![tx(1, Action::SelfNominate { deposit: 10, metadata: b"alice".to_vec() })], &[]);
    assert_eq!(
        block.receipts[0].result,
        Err(ActionError::Syntax(tenure_core::ActionSyntaxError::MetadataTooLong { len: 5, max: 4 }))
    );
}

#[test_log::test]
fn idle_validator_replaced_by_delegated_one() {
    let (alice, betty) = (addr(4), addr(5));
    let mut chain = chain(5, &[4_200, 4_100, 4_000, 5_000, 2]);
    assert_eq!(committee(&chain), vec![alice, addr(1), addr(2), addr(3), betty]);

    let block = produce(
        &mut chain,
        10,
        vec![
            tx(5, Action::SelfNominate { deposit: 50_000, metadata: b"betty".to_vec() }),
            tx(DELEGATOR, Action::Delegate { delegatee: betty, quantity: 5_000 }),
        ],
        &[alice],
    );
    assert!(block.receipts.iter().all(|r| r.is_success()));
    assert_eq!(chain.state().candidates.get(&betty).unwrap().deposit, 150_000);
    assert_eq!(chain.state().ledger.delegated_to(&betty), 5_002);

    let transition = produce(&mut chain, 100, vec![], &[alice]).transition.unwrap();
    assert_eq!(transition.jailed, vec![alice]);
    assert_eq!(committee(&chain), vec![betty, addr(1), addr(2), addr(3)]);
    assert_eq!(chain.get_possible_authors(Some(3)).unwrap(), vec![betty, addr(1), addr(2), addr(3)]);
    assert_eq!(chain.get_jailed()[0].address, alice);
}

#[test_log::test]
fn idle_validator_dropped_without_replacement() {
    let (alice, betty) = (addr(4), addr(5));
    let mut chain = chain(5, &[4_200, 4_100, 4_000, 5_000, 2]);

    produce(&mut chain, 10, vec![], &[alice]);
    let transition = produce(&mut chain, 100, vec![], &[alice]).transition.unwrap();
    assert_eq!(transition.jailed, vec![alice]);
    assert_eq!(committee(&chain), vec![addr(1), addr(2), addr(3)]);
    // Below the delegation threshold but still nominated
    assert!(chain.get_candidates().iter().any(|c| c.address == betty));
}

#[test_log::test]
fn equal_delegations_rank_by_deposit_then_address() {
    let mut config = genesis(5, &[3_000, 2_000, 2_000, 2_000, 2_000]);
    for (validator, deposit) in config.validators.iter_mut().zip([100_000, 100_000, 100_001, 100_002, 100_002]) {
        validator.deposit = deposit;
    }
    let mut chain = Chain::new(config.build().unwrap(), None);
    let (lo, hi) = if addr(4) < addr(5) { (addr(4), addr(5)) } else { (addr(5), addr(4)) };
    assert_eq!(committee(&chain), vec![addr(1), lo, hi, addr(3), addr(2)]);

    produce(&mut chain, 10, vec![change_max(0, 3)], &[]);
    produce(&mut chain, 100, vec![], &[]);
    assert_eq!(committee(&chain), vec![addr(1), lo, hi]);

    produce(&mut chain, 110, vec![change_max(1, 4)], &[]);
    produce(&mut chain, 200, vec![], &[]);
    assert_eq!(committee(&chain), vec![addr(1), lo, hi, addr(3)]);
}

#[test_log::test]
fn shorter_term_applies_from_next_block() {
    let mut chain = chain(4, &[4_200, 4_100, 4_000, 5_000]);
    produce(&mut chain, 10, vec![], &[]);

    let mut shorter = params(4);
    shorter.term_seconds = 40;
    let block = produce(&mut chain, 50, vec![change(0, shorter)], &[]);
    assert!(block.receipts[0].is_success());
    assert!(block.transition.is_none());
    assert_eq!(chain.params_at(2).term_seconds, 100);
    assert_eq!(chain.params_at(3).term_seconds, 40);

    let transition = produce(&mut chain, 60, vec![], &[]).transition.unwrap();
    assert_eq!((transition.closed_term, transition.closing_block), (0, 3));
}

#[test_log::test]
fn jail_periods_from_closing_block_params() {
    let alice = addr(1);
    let mut chain = chain(4, &[4_200, 4_100, 4_000, 5_000]);
    produce(&mut chain, 10, vec![], &[alice]);

    let mut longer = params(4);
    longer.custody_period = 3;
    longer.release_period = 6;
    let block = produce(&mut chain, 100, vec![change(0, longer)], &[alice]);
    assert_eq!(block.transition.unwrap().jailed, vec![alice]);

    let prisoner = &chain.get_jailed()[0];
    assert_eq!((prisoner.custody_until, prisoner.release_at), (2, 5));
    assert_eq!(chain.state().candidates.get(&addr(2)).unwrap().nomination_ends_at, 10);
    assert_eq!(chain.params_at(3).custody_period, 3);
}

#[test_log::test]
fn unbounded_periods_saturate() {
    let (alice, betty) = (addr(1), addr(5));
    let mut chain = chain(4, &[4_200, 4_100, 4_000, 5_000]);
    produce(&mut chain, 10, vec![], &[]);
    produce(&mut chain, 100, vec![], &[]);

    let mut unbounded = params(4);
    unbounded.nomination_expiration = u64::MAX;
    unbounded.custody_period = u64::MAX - 1;
    unbounded.release_period = u64::MAX;
    let block = produce(&mut chain, 110, vec![change(0, unbounded)], &[alice]);
    assert!(block.receipts[0].is_success());

    let block = produce(
        &mut chain,
        120,
        vec![tx(5, Action::SelfNominate { deposit: 100, metadata: vec![] })],
        &[alice],
    );
    assert!(block.receipts[0].is_success());
    assert_eq!(chain.state().candidates.get(&betty).unwrap().nomination_ends_at, u64::MAX);

    let transition = produce(&mut chain, 200, vec![], &[alice]).transition.unwrap();
    assert_eq!(transition.jailed, vec![alice]);
    let prisoner = &chain.get_jailed()[0];
    assert_eq!((prisoner.custody_until, prisoner.release_at), (u64::MAX, u64::MAX));
    assert_eq!(chain.state().candidates.get(&addr(2)).unwrap().nomination_ends_at, u64::MAX);
    assert_eq!(committee(&chain), vec![addr(4), addr(2), addr(3)]);
}
