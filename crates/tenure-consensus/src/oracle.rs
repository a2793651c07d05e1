// Participation facts consumed from the BFT engine

use log::warn;
use std::collections::BTreeMap;
use tenure_core::{Address, TermId};
use tenure_state::{ParticipationRecord, Validator};

/// Did each validator propose or precommit during a term.
///
/// Validators missing from the map are treated as having participated.
pub trait ParticipationOracle {
    fn validator_participation(&self, term_id: TermId) -> BTreeMap<Address, bool>;
}

/// A fixed map, as delivered by an external engine.
impl ParticipationOracle for BTreeMap<Address, bool> {
    fn validator_participation(&self, _term_id: TermId) -> BTreeMap<Address, bool> {
        self.clone()
    }
}

/// Participation derived from the headers recorded in chain state.
pub struct RecordedParticipation<'a> {
    record: &'a ParticipationRecord,
    validators: &'a [Validator],
}

impl<'a> RecordedParticipation<'a> {
    pub fn new(record: &'a ParticipationRecord, validators: &'a [Validator]) -> Self {
        RecordedParticipation { record, validators }
    }
}

impl ParticipationOracle for RecordedParticipation<'_> {
    fn validator_participation(&self, term_id: TermId) -> BTreeMap<Address, bool> {
        if self.record.term_id() != term_id {
            warn!(
                "Participation record covers term {}, asked for term {}",
                self.record.term_id(),
                term_id
            );
            return BTreeMap::new();
        }
        self.record
            .for_validators(self.validators.iter().map(|v| &v.address))
    }
}
