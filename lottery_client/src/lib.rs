use anyhow::{anyhow, Result};
use lottery_core::{
    constants::POOL_STORAGE_DATA_LENGTH,
    instruction::initialize_pool,
    pda::find_stake_pool_vault_pda,
    state::PoolStorageData,
};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::future::Future;

pub mod config;
pub mod service;

pub use config::LotteryConfig;
pub use service::{DrawService, RoundOutcome, TicketRequest};

/// Build a transaction paid for and signed by `payer`.
pub fn create_signed_transaction(
    payer: &Keypair,
    instructions: &[Instruction],
    recent_blockhash: Hash,
) -> Result<Transaction> {
    let mut transaction = Transaction::new_with_payer(instructions, Some(&payer.pubkey()));
    transaction
        .try_sign(&[payer], recent_blockhash)
        .map_err(|e| anyhow!("Failed to sign transaction: {}", e))?;
    Ok(transaction)
}

/// Lamports the pool can pay out: its balance above the rent-exempt minimum.
pub fn payable_prize(balance: u64, rent_exempt_minimum: u64) -> u64 {
    balance.saturating_sub(rent_exempt_minimum)
}

/// What the draw service needs from the ledger.
pub trait Ledger {
    fn program_id(&self) -> Pubkey;

    fn authority(&self) -> Pubkey;

    /// Current payable prize of the pool.
    fn pool_prize(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Sign, send and confirm `instructions` as one transaction.
    fn submit(
        &self,
        instructions: &[Instruction],
    ) -> impl Future<Output = Result<Signature>> + Send;
}

/// RPC-backed client acting as the pool authority.
pub struct LotteryClient {
    rpc_client: RpcClient,
    authority: Keypair,
    program_id: Pubkey,
}

impl LotteryClient {
    pub fn new(
        rpc_url: String,
        commitment: CommitmentConfig,
        authority: Keypair,
        program_id: Pubkey,
    ) -> Self {
        Self {
            rpc_client: RpcClient::new_with_commitment(rpc_url, commitment),
            authority,
            program_id,
        }
    }

    pub fn from_config(config: LotteryConfig) -> Self {
        Self::new(
            config.rpc_url,
            config.commitment,
            config.authority,
            config.program_id,
        )
    }

    pub fn pool_vault(&self) -> Result<Pubkey> {
        let (vault, _) = find_stake_pool_vault_pda(&self.program_id, &self.authority.pubkey())?;
        Ok(vault)
    }

    pub async fn pool_balance(&self) -> Result<u64> {
        Ok(self.rpc_client.get_balance(&self.pool_vault()?).await?)
    }

    /// Create the pool unless its vault already exists. Returns the signature
    /// of the initializing transaction, if one was sent.
    pub async fn initialize_pool_if_missing(
        &self,
        pool: PoolStorageData,
    ) -> Result<Option<Signature>> {
        let vault = self.pool_vault()?;
        let existing = self
            .rpc_client
            .get_account_with_commitment(&vault, self.rpc_client.commitment())
            .await?
            .value;
        if existing.is_some() {
            log::info!("pool vault {} already initialized", vault);
            return Ok(None);
        }

        log::info!(
            "initializing pool vault {} (ticket price {}, initial amount {})",
            vault,
            pool.ticket_price,
            pool.initial_amount
        );
        let ix = initialize_pool(&self.program_id, &self.authority.pubkey(), pool)?;
        Ok(Some(self.submit(&[ix]).await?))
    }

    pub async fn send_instructions(&self, instructions: &[Instruction]) -> Result<Signature> {
        let recent_blockhash = self.rpc_client.get_latest_blockhash().await?;
        let transaction =
            create_signed_transaction(&self.authority, instructions, recent_blockhash)?;
        let signature = self
            .rpc_client
            .send_and_confirm_transaction(&transaction)
            .await?;
        log::debug!("confirmed transaction {}", signature);
        Ok(signature)
    }
}

impl Ledger for LotteryClient {
    fn program_id(&self) -> Pubkey {
        self.program_id
    }

    fn authority(&self) -> Pubkey {
        self.authority.pubkey()
    }

    async fn pool_prize(&self) -> Result<u64> {
        let balance = self.pool_balance().await?;
        let rent_exempt_minimum = self
            .rpc_client
            .get_minimum_balance_for_rent_exemption(POOL_STORAGE_DATA_LENGTH)
            .await?;
        Ok(payable_prize(balance, rent_exempt_minimum))
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<Signature> {
        self.send_instructions(instructions).await
    }
}
