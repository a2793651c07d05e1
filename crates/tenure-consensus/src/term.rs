// Term controller - deterministic term transitions driven by block timestamps
//
// SAFETY INVARIANTS:
// 1. Term end is a pure function of (block timestamp, term start, term length, block count)
// 2. A term never closes without at least one block of its own
// 3. term_id grows by exactly one per transition
// 4. Closing order: jail idle validators, renew the rest, expire stale nominations,
//    release prisoners, elect, commit
// 5. An empty committee is fatal: the caller must stop producing blocks
// 6. Term end, jail periods and renewal read the params of the closing block;
//    only the election reads the params effective from the next block

use crate::election::compute_validators;
use crate::oracle::{ParticipationOracle, RecordedParticipation};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tenure_core::{Address, BlockHeader, CommonParams, TermId};
use tenure_state::{ChainState, LedgerError, StakeLedger, TermMetadata, Validator};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermError {
    #[error("term {term_id} would start with an empty validator set")]
    EmptyValidatorSet { term_id: TermId },

    #[error("deposit refund failed: {0}")]
    Refund(#[from] LedgerError),
}

/// Outcome of one term close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermTransition {
    pub closed_term: TermId,
    pub new_term: TermId,

    /// Last block of the closed term
    pub closing_block: u64,

    pub jailed: Vec<Address>,
    pub expired: Vec<Address>,
    pub released: Vec<Address>,

    /// Committee of the new term, effective from `closing_block + 1`
    pub validators: Vec<Validator>,
}

/// Whether `header` is the last block of the current term.
pub fn is_term_end(params: &CommonParams, term: &TermMetadata, header: &BlockHeader) -> bool {
    params.terms_enabled()
        && header.number > term.last_term_finished_block
        && header.timestamp.saturating_sub(term.term_started_at) >= params.term_seconds
}

/// Drives the term state machine once per finalized block.
pub struct TermController<'o> {
    /// Participation source; the recorded headers when absent
    oracle: Option<&'o dyn ParticipationOracle>,
}

impl Default for TermController<'_> {
    fn default() -> Self {
        TermController { oracle: None }
    }
}

impl<'o> TermController<'o> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_oracle(oracle: &'o dyn ParticipationOracle) -> Self {
        TermController { oracle: Some(oracle) }
    }

    /// Record `header` and close the term if it ends here.
    ///
    /// Params must already be committed for this block. A change committed
    /// by this block does not decide whether the block ends the term.
    pub fn on_block_closed(
        &self,
        state: &mut ChainState,
        header: &BlockHeader,
    ) -> Result<Option<TermTransition>, TermError> {
        state.participation.record(header);
        if !is_term_end(state.params.params_at(header.number), &state.term, header) {
            return Ok(None);
        }
        let participation = match self.oracle {
            Some(oracle) => oracle.validator_participation(state.term.term_id),
            None => RecordedParticipation::new(&state.participation, &state.validators)
                .validator_participation(state.term.term_id),
        };
        close_term(state, header, &participation).map(Some)
    }
}

/// Close the current term at `header`.
///
/// Jailing and renewal use the params governing `header`; the new committee is
/// elected with the params governing the block after it.
pub fn close_term(
    state: &mut ChainState,
    header: &BlockHeader,
    participation: &dyn ParticipationOracle,
) -> Result<TermTransition, TermError> {
    let closing = state.term.term_id;
    let block_params = state.params.params_at(header.number).clone();
    let params = state.current_params().clone();
    let participation = participation.validator_participation(closing);
    let sitting = state.validators.clone();

    let mut jailed = Vec::new();
    for validator in &sitting {
        if participation.get(&validator.address) != Some(&false) || state.jail.is_banned(&validator.address) {
            continue;
        }
        let (pubkey, deposit) = match state.candidates.remove(&validator.address) {
            Some(candidate) => (candidate.pubkey, candidate.deposit),
            None => (validator.pubkey, 0),
        };
        state.jail.imprison(
            validator.address,
            pubkey,
            deposit,
            closing,
            block_params.custody_period,
            block_params.release_period,
        );
        jailed.push(validator.address);
    }

    let renewed: Vec<Address> = sitting
        .iter()
        .map(|v| v.address)
        .filter(|address| !jailed.contains(address))
        .collect();
    state.candidates.renew(&renewed, closing, block_params.nomination_expiration);

    let mut expired = Vec::new();
    for candidate in state.candidates.expire_stale(closing) {
        retire(&mut state.ledger, &candidate.address, candidate.deposit)?;
        expired.push(candidate.address);
    }

    let mut released = Vec::new();
    for prisoner in state.jail.drain_released(closing) {
        retire(&mut state.ledger, &prisoner.address, prisoner.deposit)?;
        released.push(prisoner.address);
    }

    let validators = compute_validators(&state.candidates, &state.jail, &state.ledger, &sitting, &params);
    let new_term = closing + 1;
    if validators.is_empty() {
        error!("Term {} closing at block {} elected no validators", closing, header.number);
        return Err(TermError::EmptyValidatorSet { term_id: new_term });
    }
    if validators.len() < params.min_num_of_validators {
        warn!(
            "Term {} starts with {} validators, below the minimum {}",
            new_term,
            validators.len(),
            params.min_num_of_validators
        );
    }

    state.validators = validators.clone();
    state.term = state.term.next(header.number, header.timestamp);
    state.participation.reset(new_term);

    info!(
        "Term {} closed at block {}: {} validators, {} jailed, {} expired, {} released",
        closing,
        header.number,
        validators.len(),
        jailed.len(),
        expired.len(),
        released.len()
    );

    Ok(TermTransition {
        closed_term: closing,
        new_term,
        closing_block: header.number,
        jailed,
        expired,
        released,
        validators,
    })
}

/// Refund the locked deposit and return delegations of an account leaving the race.
fn retire(ledger: &mut StakeLedger, address: &Address, deposit: u64) -> Result<(), LedgerError> {
    ledger.credit_coin(address, deposit)?;
    ledger.revert_delegations_to(address);
    Ok(())
}
