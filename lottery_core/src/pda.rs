//! Program derived addresses for the lottery accounts.
//!
//! Every address is `find_program_address([tag, owner], program_id)`: the
//! bump starts at 255 and walks down until the hash falls off the ed25519
//! curve. Nothing here is cached; callers recompute on demand.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{LotteryError, Result};

/// Seed tags, one per logical account kind. Tags must stay distinct or two
/// different accounts would share an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolStorageSeed {
    StakePool,
    ReceiptMint,
    StakeHouse,
    PlayerAccount,
    PlayerTokenAccount,
}

impl PoolStorageSeed {
    pub const ALL: [PoolStorageSeed; 5] = [
        PoolStorageSeed::StakePool,
        PoolStorageSeed::ReceiptMint,
        PoolStorageSeed::StakeHouse,
        PoolStorageSeed::PlayerAccount,
        PoolStorageSeed::PlayerTokenAccount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStorageSeed::StakePool => "StakePool",
            PoolStorageSeed::ReceiptMint => "ReceiptMint",
            PoolStorageSeed::StakeHouse => "StakeHouse",
            PoolStorageSeed::PlayerAccount => "PlayerAccount",
            PoolStorageSeed::PlayerTokenAccount => "PlayerTokenAccount",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// A derived address together with the inputs that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub seed: PoolStorageSeed,
    pub owner: Pubkey,
    pub address: Pubkey,
    pub bump: u8,
}

impl DerivedAddress {
    /// Signer seeds for `invoke_signed`, bump included.
    pub fn signer_seeds(&self) -> Vec<Vec<u8>> {
        vec![
            self.seed.as_bytes().to_vec(),
            self.owner.to_bytes().to_vec(),
            vec![self.bump],
        ]
    }
}

/// Derive the address for `(seed, owner)` under `program_id`.
///
/// Fails with `DerivationExhausted` when none of the 256 bumps yields an
/// off-curve point.
pub fn derive(
    seed: PoolStorageSeed,
    owner: &Pubkey,
    program_id: &Pubkey,
) -> Result<DerivedAddress> {
    let (address, bump) =
        Pubkey::try_find_program_address(&[seed.as_bytes(), owner.as_ref()], program_id)
            .ok_or(LotteryError::DerivationExhausted {
                seed_tag: seed.as_str(),
            })?;

    Ok(DerivedAddress {
        seed,
        owner: *owner,
        address,
        bump,
    })
}

/// Pool vault holding the prize lamports and the `PoolStorageData` record.
pub fn find_stake_pool_vault_pda(
    program_id: &Pubkey,
    pool_authority: &Pubkey,
) -> Result<(Pubkey, u8)> {
    derive(PoolStorageSeed::StakePool, pool_authority, program_id).map(|d| (d.address, d.bump))
}

/// Receipt mint; one receipt token is minted per purchased ticket.
pub fn find_stake_pool_mint_pda(
    program_id: &Pubkey,
    pool_authority: &Pubkey,
) -> Result<(Pubkey, u8)> {
    derive(PoolStorageSeed::ReceiptMint, pool_authority, program_id).map(|d| (d.address, d.bump))
}

pub fn find_stake_house_pda(
    program_id: &Pubkey,
    pool_authority: &Pubkey,
) -> Result<(Pubkey, u8)> {
    derive(PoolStorageSeed::StakeHouse, pool_authority, program_id).map(|d| (d.address, d.bump))
}

/// Per-player account storing the player's `TicketAccountData`.
pub fn find_player_pda_account(
    program_id: &Pubkey,
    player: &Pubkey,
) -> Result<(Pubkey, u8)> {
    derive(PoolStorageSeed::PlayerAccount, player, program_id).map(|d| (d.address, d.bump))
}

/// Per-player Token-2022 account holding receipt tokens.
pub fn find_player_token_pda_account(
    program_id: &Pubkey,
    player: &Pubkey,
) -> Result<(Pubkey, u8)> {
    derive(PoolStorageSeed::PlayerTokenAccount, player, program_id).map(|d| (d.address, d.bump))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PROGRAM_ID;
    use std::collections::HashSet;

    #[test]
    fn test_derive_is_deterministic() {
        let owner = Pubkey::new_unique();
        for seed in PoolStorageSeed::ALL {
            let first = derive(seed, &owner, &PROGRAM_ID).unwrap();
            let second = derive(seed, &owner, &PROGRAM_ID).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_derive_matches_find_program_address() {
        let owner = Pubkey::new_unique();
        let derived = derive(PoolStorageSeed::StakePool, &owner, &PROGRAM_ID).unwrap();
        let expected = Pubkey::find_program_address(&[b"StakePool", owner.as_ref()], &PROGRAM_ID);
        assert_eq!((derived.address, derived.bump), expected);
        assert!(!derived.address.is_on_curve());
    }

    #[test]
    fn test_seed_tags_yield_distinct_addresses() {
        let owner = Pubkey::new_unique();
        let addresses: HashSet<Pubkey> = PoolStorageSeed::ALL
            .iter()
            .map(|seed| derive(*seed, &owner, &PROGRAM_ID).unwrap().address)
            .collect();
        assert_eq!(addresses.len(), PoolStorageSeed::ALL.len());
    }

    #[test]
    fn test_program_id_changes_address() {
        let owner = Pubkey::new_unique();
        let other_program = Pubkey::new_unique();
        let (a, _) = find_player_pda_account(&PROGRAM_ID, &owner).unwrap();
        let (b, _) = find_player_pda_account(&other_program, &owner).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_signer_seeds_recreate_address() {
        let owner = Pubkey::new_unique();
        let derived = derive(PoolStorageSeed::ReceiptMint, &owner, &PROGRAM_ID).unwrap();
        let seeds = derived.signer_seeds();
        let refs: Vec<&[u8]> = seeds.iter().map(|s| s.as_slice()).collect();
        let address = Pubkey::create_program_address(&refs, &PROGRAM_ID).unwrap();
        assert_eq!(address, derived.address);
    }
}
