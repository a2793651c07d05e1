// Node configuration and genesis construction
//
// Sources, later ones winning:
//   1. the file passed on the command line (JSON, TOML or YAML by extension)
//   2. environment variables prefixed `TENURE__`, nested with `__`
//      e.g. TENURE__GENESIS__PARAMS__TERM_SECONDS=60

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tenure_consensus::rank_order;
use tenure_core::{Address, BlockNumber, CommonParams, Public, Timestamp};
use tenure_governance::ParamsError;
use tenure_state::{Candidate, ChainState, LedgerError, Validator};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("genesis params rejected: {0}")]
    Params(#[from] ParamsError),

    #[error("genesis allocation failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("genesis delegation to {0}, which is not a genesis validator")]
    UnknownDelegatee(Address),

    #[error("genesis validator {0} listed twice")]
    DuplicateValidator(Address),

    #[error("genesis declares no validators")]
    NoValidators,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub genesis: GenesisConfig,

    /// State snapshots kept for historical queries; unset keeps all
    #[serde(default)]
    pub history_retention: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub address: Address,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDelegation {
    pub delegator: Address,
    pub delegatee: Address,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub pubkey: Public,

    /// Deposit locked at genesis; not charged to any coin balance
    pub deposit: u64,

    #[serde(default)]
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub block_number: BlockNumber,

    pub timestamp: Timestamp,

    pub params: CommonParams,

    /// Initial undelegated stake
    #[serde(default)]
    pub stakes: Vec<Allocation>,

    /// Initial coins for nomination deposits
    #[serde(default)]
    pub coins: Vec<Allocation>,

    #[serde(default)]
    pub delegations: Vec<GenesisDelegation>,

    /// First committee, also seeded as candidates
    pub validators: Vec<GenesisValidator>,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("TENURE").prefix_separator("__").separator("__"))
            .build()?;
        let node: NodeConfig = settings.try_deserialize()?;
        info!("Loaded configuration from {}", path.display());
        Ok(node)
    }
}

impl GenesisConfig {
    /// Build the genesis chain state.
    pub fn build(&self) -> Result<ChainState, ConfigError> {
        let mut state = ChainState::new(self.block_number, self.timestamp, self.params.clone())?;

        for allocation in &self.stakes {
            state.ledger.allocate(allocation.address, allocation.amount)?;
        }
        for allocation in &self.coins {
            state.ledger.credit_coin(&allocation.address, allocation.amount)?;
        }

        if self.validators.is_empty() {
            return Err(ConfigError::NoValidators);
        }
        let mut seated = BTreeSet::new();
        for validator in &self.validators {
            let address = validator.pubkey.address();
            if !seated.insert(address) {
                return Err(ConfigError::DuplicateValidator(address));
            }
            state.candidates.insert(Candidate {
                address,
                pubkey: validator.pubkey,
                deposit: validator.deposit,
                nomination_block: self.block_number,
                nomination_ends_at: self.params.nomination_expiration,
                metadata: validator.metadata.as_bytes().to_vec(),
            });
        }

        for delegation in &self.delegations {
            if !seated.contains(&delegation.delegatee) {
                return Err(ConfigError::UnknownDelegatee(delegation.delegatee));
            }
            state
                .ledger
                .delegate(&delegation.delegator, &delegation.delegatee, delegation.amount)?;
        }

        let mut committee: Vec<Validator> = state
            .candidates
            .iter()
            .map(|c| Validator {
                address: c.address,
                pubkey: c.pubkey,
                delegation: state.ledger.delegated_to(&c.address),
                deposit: c.deposit,
            })
            .collect();
        committee.sort_by(rank_order);
        state.validators = committee;

        info!(
            "Genesis at block {}: {} validators, {} total stake",
            self.block_number,
            state.validators.len(),
            state.ledger.total_issued()
        );
        Ok(state)
    }
}
