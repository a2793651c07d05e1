// Tenure consensus: validator election, term transitions and misbehavior bans
pub mod election;
pub mod oracle;
pub mod term;
pub mod misbehavior;

pub use election::{compute_validators, rank_order};
pub use misbehavior::{report_misbehavior, BanOutcome, Evidence, MisbehaviorError};
pub use oracle::{ParticipationOracle, RecordedParticipation};
pub use term::{close_term, is_term_end, TermController, TermError, TermTransition};
