// === Primitives ===
pub mod address;
pub mod block;

// === Governance-tunable configuration ===
pub mod params;

// === Transactions ===
pub mod action;

// === Re-exports for broader ecosystem access ===
pub use action::{Action, ActionSyntaxError, ParamsSignature, Transaction};
pub use address::{Address, AddressParseError, Public};
pub use block::{BlockHeader, BlockNumber, TermId, Timestamp};
pub use params::{CommonParams, InvalidParams};
