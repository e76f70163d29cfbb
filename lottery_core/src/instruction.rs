//! Instruction builders for the lottery program.
//!
//! Account order and signer/writable flags are part of the program's
//! contract: the program reads accounts positionally and does not report a
//! misordered list, so each builder's order is pinned by tests.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::{
    codec::Schematic,
    constants::{RENT_SYSVAR_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID},
    error::{LotteryError, Result},
    pda::{
        find_player_pda_account, find_player_token_pda_account, find_stake_pool_mint_pda,
        find_stake_pool_vault_pda,
    },
    state::{DraftWinner, LotteryInstruction, PoolStorageData, TicketAccountData},
};

fn build(
    program_id: &Pubkey,
    instruction: &LotteryInstruction,
    accounts: Vec<AccountMeta>,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data: instruction.pack()?,
    })
}

/// Create the pool vault and receipt mint for `pool_authority`.
pub fn initialize_pool(
    program_id: &Pubkey,
    pool_authority: &Pubkey,
    pool: PoolStorageData,
) -> Result<Instruction> {
    let (pool_vault, _) = find_stake_pool_vault_pda(program_id, pool_authority)?;
    let (pool_mint, _) = find_stake_pool_mint_pda(program_id, pool_authority)?;

    build(
        program_id,
        &LotteryInstruction::InitializePool(pool),
        vec![
            AccountMeta::new(*pool_authority, true),
            AccountMeta::new(pool_vault, false),
            AccountMeta::new(pool_mint, false),
            AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
    )
}

/// Transfer `amount` lamports from `payer` into the pool vault.
pub fn deposit(
    program_id: &Pubkey,
    payer: &Pubkey,
    pool_authority: &Pubkey,
    amount: u64,
) -> Result<Instruction> {
    if amount == 0 {
        return Err(LotteryError::InvalidArgument(
            "deposit amount must be greater than 0".to_string(),
        ));
    }
    let (pool_vault, _) = find_stake_pool_vault_pda(program_id, pool_authority)?;

    build(
        program_id,
        &LotteryInstruction::Deposit(amount),
        vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(pool_vault, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
    )
}

/// Move `amount` lamports from the player's PDA back to the player.
pub fn withdraw(program_id: &Pubkey, player: &Pubkey, amount: u64) -> Result<Instruction> {
    if amount == 0 {
        return Err(LotteryError::InvalidArgument(
            "withdraw amount must be greater than 0".to_string(),
        ));
    }
    let (player_pda, _) = find_player_pda_account(program_id, player)?;

    build(
        program_id,
        &LotteryInstruction::Withdraw(amount),
        vec![
            AccountMeta::new(*player, true),
            AccountMeta::new(player_pda, false),
        ],
    )
}

/// Store a ticket commitment in the player's PDA and mint a receipt.
pub fn purchase_ticket(
    program_id: &Pubkey,
    pool_authority: &Pubkey,
    player: &Pubkey,
    ticket: TicketAccountData,
) -> Result<Instruction> {
    if ticket.total_tickets == 0 {
        return Err(LotteryError::InvalidArgument(
            "ticket commitment must cover at least one ticket".to_string(),
        ));
    }
    let (player_pda, _) = find_player_pda_account(program_id, player)?;
    let (player_token_pda, _) = find_player_token_pda_account(program_id, player)?;
    let (pool_vault, _) = find_stake_pool_vault_pda(program_id, pool_authority)?;
    let (pool_mint, _) = find_stake_pool_mint_pda(program_id, pool_authority)?;

    build(
        program_id,
        &LotteryInstruction::PurchaseTicket(ticket),
        vec![
            AccountMeta::new(*pool_authority, false),
            AccountMeta::new(*player, true),
            AccountMeta::new(player_pda, false),
            AccountMeta::new(player_token_pda, false),
            AccountMeta::new(pool_vault, false),
            AccountMeta::new(pool_mint, false),
            AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
    )
}

/// Pay out `winners`. Each winner appends its own account and token account,
/// in winner order; the program matches them positionally.
pub fn select_winners_and_airdrop(
    program_id: &Pubkey,
    pool_authority: &Pubkey,
    winners: Vec<DraftWinner>,
) -> Result<Instruction> {
    if winners.is_empty() {
        return Err(LotteryError::InvalidArgument(
            "draft needs at least one winner".to_string(),
        ));
    }
    if let Some(w) = winners.iter().find(|w| w.tickets.len() != w.ticket_indices.len()) {
        return Err(LotteryError::InvalidArgument(format!(
            "winner {} has {} tickets for {} indices",
            w.address,
            w.tickets.len(),
            w.ticket_indices.len()
        )));
    }
    let (pool_vault, _) = find_stake_pool_vault_pda(program_id, pool_authority)?;
    let (pool_mint, _) = find_stake_pool_mint_pda(program_id, pool_authority)?;

    let mut accounts = Vec::with_capacity(3 + 2 * winners.len());
    accounts.push(AccountMeta::new(*pool_authority, true));
    accounts.push(AccountMeta::new(pool_vault, false));
    accounts.push(AccountMeta::new(pool_mint, false));
    for winner in &winners {
        accounts.push(AccountMeta::new(winner.address, false));
        accounts.push(AccountMeta::new(winner.token_account, false));
    }

    build(
        program_id,
        &LotteryInstruction::SelectWinnersAndAirdrop(winners),
        accounts,
    )
}

/// Close the player's PDA and token account, returning lamports to the player.
pub fn close_player_account(
    program_id: &Pubkey,
    player: &Pubkey,
    pool_authority: &Pubkey,
) -> Result<Instruction> {
    let (player_pda, _) = find_player_pda_account(program_id, player)?;
    let (player_token_pda, _) = find_player_token_pda_account(program_id, player)?;
    let (pool_mint, _) = find_stake_pool_mint_pda(program_id, pool_authority)?;

    build(
        program_id,
        &LotteryInstruction::ClosePlayerAccount,
        vec![
            AccountMeta::new(*player, true),
            AccountMeta::new(player_pda, false),
            AccountMeta::new(player_token_pda, false),
            AccountMeta::new(*pool_authority, false),
            AccountMeta::new_readonly(pool_mint, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
    )
}
