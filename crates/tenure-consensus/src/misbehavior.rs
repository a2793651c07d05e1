// Misbehavior reports - evidence-based permanent bans
//
// SAFETY INVARIANTS:
// 1. Only well-formed evidence bans; the conflicting payloads must differ
// 2. The same evidence is acted upon at most once
// 3. A ban removes candidacy and custody, forfeits the deposit and returns delegations
// 4. A banned sitting validator keeps its seat until the term closes

use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tenure_core::{Address, BlockNumber};
use tenure_state::{ChainState, EvidenceId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MisbehaviorError {
    #[error("evidence for {0} carries identical conflicting payloads")]
    NoConflict(Address),

    #[error("evidence for {0} has empty payloads")]
    EmptyPayload(Address),

    #[error("evidence already processed")]
    Duplicate,

    #[error("{0} is already banned")]
    AlreadyBanned(Address),

    #[error("evidence encoding failed: {0}")]
    Encoding(String),
}

/// Proof of a severe protocol violation, produced by the BFT engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evidence {
    /// Two different votes at the same height and round
    DoubleVote {
        offender: Address,
        height: BlockNumber,
        round: u64,
        vote_a: Vec<u8>,
        vote_b: Vec<u8>,
    },

    /// Two different proposals at the same height
    DoubleProposal {
        offender: Address,
        height: BlockNumber,
        proposal_a: Vec<u8>,
        proposal_b: Vec<u8>,
    },
}

impl Evidence {
    pub fn offender(&self) -> Address {
        match self {
            Evidence::DoubleVote { offender, .. } | Evidence::DoubleProposal { offender, .. } => *offender,
        }
    }

    /// Structural checks; signatures are checked by the engine that produced it.
    pub fn verify_form(&self) -> Result<(), MisbehaviorError> {
        let (a, b) = match self {
            Evidence::DoubleVote { vote_a, vote_b, .. } => (vote_a, vote_b),
            Evidence::DoubleProposal { proposal_a, proposal_b, .. } => (proposal_a, proposal_b),
        };
        if a.is_empty() || b.is_empty() {
            return Err(MisbehaviorError::EmptyPayload(self.offender()));
        }
        if a == b {
            return Err(MisbehaviorError::NoConflict(self.offender()));
        }
        Ok(())
    }

    /// Order-independent fingerprint: swapping the two payloads yields the same id.
    pub fn id(&self) -> Result<EvidenceId, MisbehaviorError> {
        let canonical = match self.clone() {
            Evidence::DoubleVote { offender, height, round, vote_a, vote_b } => {
                let (vote_a, vote_b) = if vote_a <= vote_b { (vote_a, vote_b) } else { (vote_b, vote_a) };
                Evidence::DoubleVote { offender, height, round, vote_a, vote_b }
            }
            Evidence::DoubleProposal { offender, height, proposal_a, proposal_b } => {
                let (proposal_a, proposal_b) =
                    if proposal_a <= proposal_b { (proposal_a, proposal_b) } else { (proposal_b, proposal_a) };
                Evidence::DoubleProposal { offender, height, proposal_a, proposal_b }
            }
        };
        let encoded = bincode::serialize(&canonical).map_err(|e| MisbehaviorError::Encoding(e.to_string()))?;
        Ok(Sha256::digest(&encoded).into())
    }
}

/// What a ban took away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanOutcome {
    pub offender: Address,
    pub forfeited_deposit: u64,
    pub reverted_delegations: u64,

    /// Seated in the current committee; the seat is lost at the term close
    pub was_validator: bool,
}

/// Ban the offender named by `evidence`.
pub fn report_misbehavior(state: &mut ChainState, evidence: &Evidence) -> Result<BanOutcome, MisbehaviorError> {
    evidence.verify_form()?;
    let id = evidence.id()?;
    if state.evidence.contains(&id) {
        return Err(MisbehaviorError::Duplicate);
    }
    let offender = evidence.offender();
    if state.jail.is_banned(&offender) {
        return Err(MisbehaviorError::AlreadyBanned(offender));
    }

    let candidate_deposit = state.candidates.remove(&offender).map_or(0, |c| c.deposit);
    let prisoner_deposit = state.jail.ban(offender).map_or(0, |p| p.deposit);
    let reverted_delegations = state.ledger.revert_delegations_to(&offender);
    state.evidence.insert(id);

    let outcome = BanOutcome {
        offender,
        forfeited_deposit: candidate_deposit + prisoner_deposit,
        reverted_delegations,
        was_validator: state.is_validator(&offender),
    };
    warn!(
        "Banned {} for misbehavior: forfeited deposit {}, returned {} delegated stake",
        offender, outcome.forfeited_deposit, outcome.reverted_delegations
    );
    Ok(outcome)
}
