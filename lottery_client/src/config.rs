use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use lottery_core::{constants::PROGRAM_ID, state::PoolStorageData};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    native_token::LAMPORTS_PER_SOL,
    pubkey::Pubkey,
    signer::keypair::{read_keypair_file, Keypair},
};
use std::{str::FromStr, time::Duration};

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_DRAW_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TICKET_PRICE_LAMPORTS: u64 = LAMPORTS_PER_SOL / 2;
pub const DEFAULT_INITIAL_POOL_LAMPORTS: u64 = 10 * LAMPORTS_PER_SOL;

/// Everything the client needs, passed explicitly instead of read from globals.
#[derive(Debug)]
pub struct LotteryConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub authority: Keypair,
    pub program_id: Pubkey,
    pub draw_interval: Duration,
    pub prize_weights: Vec<u64>,
    pub ticket_price: u64,
    pub initial_pool_lamports: u64,
}

impl LotteryConfig {
    /// Load from the process environment, after applying any `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let authority = match (
            lookup("POOL_AUTHORITY_KEYPAIR"),
            lookup("POOL_AUTHORITY_KEYPAIR_PATH"),
        ) {
            (Some(json), _) => parse_keypair_json(&json)?,
            (None, Some(path)) => read_keypair_file(&path)
                .map_err(|e| anyhow!("Failed to read keypair file {}: {}", path, e))?,
            (None, None) => {
                bail!("POOL_AUTHORITY_KEYPAIR or POOL_AUTHORITY_KEYPAIR_PATH must be set")
            }
        };

        let program_id = match lookup("PROGRAM_ID") {
            Some(id) => Pubkey::from_str(id.trim())
                .map_err(|e| anyhow!("Invalid PROGRAM_ID {}: {}", id, e))?,
            None => PROGRAM_ID,
        };

        let commitment = match lookup("COMMITMENT") {
            Some(level) => parse_commitment(&level)?,
            None => CommitmentConfig::confirmed(),
        };

        let prize_weights = match lookup("PRIZE_WEIGHTS") {
            Some(weights) => parse_weights(&weights)?,
            None => lottery_core::constants::DEFAULT_PRIZE_WEIGHTS.to_vec(),
        };

        Ok(Self {
            rpc_url: lookup("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            commitment,
            authority,
            program_id,
            draw_interval: Duration::from_secs(parse_u64(
                &lookup,
                "DRAW_INTERVAL_SECS",
                DEFAULT_DRAW_INTERVAL_SECS,
            )?),
            prize_weights,
            ticket_price: parse_u64(
                &lookup,
                "TICKET_PRICE_LAMPORTS",
                DEFAULT_TICKET_PRICE_LAMPORTS,
            )?,
            initial_pool_lamports: parse_u64(
                &lookup,
                "INITIAL_POOL_LAMPORTS",
                DEFAULT_INITIAL_POOL_LAMPORTS,
            )?,
        })
    }

    /// Pool record written when the pool is bootstrapped.
    pub fn pool_storage(&self) -> PoolStorageData {
        PoolStorageData {
            ticket_price: self.ticket_price,
            draft_count: 0,
            initial_amount: self.initial_pool_lamports,
        }
    }
}

fn parse_keypair_json(json: &str) -> Result<Keypair> {
    let bytes: Vec<u8> =
        serde_json::from_str(json).context("POOL_AUTHORITY_KEYPAIR is not a JSON byte array")?;
    Keypair::try_from(&bytes[..]).map_err(|e| anyhow!("Invalid pool authority keypair: {}", e))
}

fn parse_commitment(level: &str) -> Result<CommitmentConfig> {
    match level.trim().to_ascii_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => bail!("Unknown COMMITMENT level: {}", other),
    }
}

fn parse_weights(weights: &str) -> Result<Vec<u64>> {
    weights
        .split(',')
        .map(|w| {
            w.trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid PRIZE_WEIGHTS entry {:?}", w))
        })
        .collect()
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, value)),
        None => Ok(default),
    }
}
