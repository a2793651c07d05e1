// Tenure state: ledgers, registries and the height-indexed chain state aggregate
pub mod stake_ledger;
pub mod candidates;
pub mod jail;
pub mod validators;
pub mod participation;
pub mod chain_state;
pub mod history;
pub mod store;

pub use candidates::{Candidate, CandidatePool, Nomination, NominationError};
pub use chain_state::{ChainState, EvidenceId};
pub use history::{HistoryError, StateHistory};
pub use jail::{JailReason, JailRegistry, Prisoner};
pub use participation::ParticipationRecord;
pub use stake_ledger::{LedgerError, StakeAccount, StakeLedger};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use validators::{TermMetadata, Validator};
