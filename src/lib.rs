// Tenure: term-based validator-set management
//
// The library crates hold the state machine; this crate wires them into a
// block-importing chain with genesis configuration and a command line.

pub mod actions;
pub mod chain;
pub mod config;

pub use actions::{ActionError, DelegationError, StakeActionHandler};
pub use chain::{Block, Chain, ChainError, ImportedBlock, TxReceipt};
pub use config::{Allocation, ConfigError, GenesisConfig, GenesisDelegation, GenesisValidator, NodeConfig};
