use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tenure::{Allocation, Block, Chain, GenesisConfig, GenesisDelegation, GenesisValidator, NodeConfig};
use tenure_core::{Address, BlockHeader, CommonParams, Public};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tenure")]
#[command(about = "Term-based validator-set management", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a genesis configuration with deterministic development keys
    GenesisTemplate {
        #[arg(long, default_value_t = 4)]
        validators: u8,
    },

    /// Validate a common params file (JSON)
    CheckParams { file: PathBuf },

    /// Run the term state machine over synthetic blocks
    Simulate {
        #[arg(long)]
        config: PathBuf,

        #[arg(long, default_value_t = 100)]
        blocks: u64,

        /// Seconds between consecutive blocks
        #[arg(long, default_value_t = 60)]
        block_time: u64,

        /// Validators that neither author nor precommit
        #[arg(long)]
        offline: Vec<Address>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::GenesisTemplate { validators } => genesis_template(validators),
        Commands::CheckParams { file } => check_params(file),
        Commands::Simulate {
            config,
            blocks,
            block_time,
            offline,
        } => simulate(config, blocks, block_time, offline),
    }
}

/// Development key for validator `index`; never use outside local networks.
fn dev_key(index: u8) -> SigningKey {
    SigningKey::from_bytes(&[index.wrapping_add(1); 32])
}

fn genesis_template(validators: u8) -> Result<()> {
    if validators == 0 {
        bail!("at least one validator is required");
    }
    let params = CommonParams::default();
    let delegator = Public(dev_key(u8::MAX - 1).verifying_key().to_bytes()).address();
    let keys: Vec<Public> = (0..validators)
        .map(|i| Public(dev_key(i).verifying_key().to_bytes()))
        .collect();
    for (i, key) in keys.iter().enumerate() {
        info!("validator {}: address {}, secret {}", i, key.address(), hex::encode(dev_key(i as u8).to_bytes()));
    }
    info!("delegator: address {}, secret {}", delegator, hex::encode(dev_key(u8::MAX - 1).to_bytes()));

    let per_validator = params.delegation_threshold;
    let genesis = GenesisConfig {
        block_number: 0,
        timestamp: 0,
        stakes: vec![Allocation {
            address: delegator,
            amount: per_validator * u64::from(validators) * 10,
        }],
        coins: keys
            .iter()
            .map(|key| Allocation {
                address: key.address(),
                amount: params.min_deposit * 10,
            })
            .collect(),
        delegations: keys
            .iter()
            .map(|key| GenesisDelegation {
                delegator,
                delegatee: key.address(),
                amount: per_validator,
            })
            .collect(),
        validators: keys
            .iter()
            .map(|key| GenesisValidator {
                pubkey: *key,
                deposit: params.min_deposit,
                metadata: String::new(),
            })
            .collect(),
        params,
    };
    let node = NodeConfig {
        genesis,
        history_retention: Some(10_000),
    };
    println!("{}", serde_json::to_string_pretty(&node)?);
    Ok(())
}

fn check_params(file: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
    let params: CommonParams = serde_json::from_str(&raw).context("parsing common params")?;
    params.verify()?;
    info!("{} is valid", file.display());
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn simulate(config: PathBuf, blocks: u64, block_time: u64, offline: Vec<Address>) -> Result<()> {
    let node = NodeConfig::load(&config)?;
    let genesis = node.genesis.build()?;
    let start = node.genesis.timestamp;
    let offline: BTreeSet<Address> = offline.into_iter().collect();
    let mut chain = Chain::new(genesis, node.history_retention);

    for step in 1..=blocks {
        let number = chain.best_block() + 1;
        let authors = chain.get_possible_authors(None)?;
        let online: Vec<Address> = authors.iter().filter(|a| !offline.contains(a)).copied().collect();
        if online.is_empty() {
            bail!("every validator of block {} is offline", number);
        }
        let author = online[(number as usize) % online.len()];
        let header = BlockHeader::new(number, start + step * block_time, author).with_precommits(online);

        match chain.import_block(&Block::new(header)) {
            Ok(imported) => {
                if let Some(transition) = imported.transition {
                    println!("{}", serde_json::to_string(&transition)?);
                }
            }
            Err(e) => {
                error!("Simulation stopped: {}", e);
                return Err(e.into());
            }
        }
    }

    let state = chain.state();
    let jailed = state.jail.prisoners().count();
    if jailed > 0 {
        warn!("{} accounts in jail at the end of the run", jailed);
    }
    info!(
        "Simulated {} blocks: term {}, {} validators, state root {}",
        blocks,
        state.current_term(),
        state.validators.len(),
        state.state_root()?
    );
    Ok(())
}
