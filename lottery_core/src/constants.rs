//! Fixed protocol constants shared with the on-chain lottery program.
//!
//! Changing any of these changes derived addresses or wire layouts.

use solana_sdk::{pubkey, pubkey::Pubkey};

/// Lottery program id.
pub const PROGRAM_ID: Pubkey = pubkey!("1cky9mEdiuQ8wNCcw1Z7pXuxF9bsdxej95Gf69XydoA");

/// SPL Token-2022 program, owner of the receipt mint and player token accounts.
pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

pub const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");

pub const RENT_SYSVAR_ID: Pubkey = pubkey!("SysvarRent111111111111111111111111111111111");

/// Numbers drawn per cycle.
pub const WINNING_NUMBERS: usize = 7;

/// Smallest drawable number.
pub const MIN_NUMBER: u8 = 0;

/// Largest drawable number (inclusive).
pub const MAX_NUMBER: u8 = 49;

/// Number groups a single ticket may carry.
pub const MAX_GROUPS_PER_TICKET: usize = 4;

/// Serialized size of `PoolStorageData`: three little-endian u64 fields.
pub const POOL_STORAGE_DATA_LENGTH: usize = 8 + 8 + 8;

/// Default prize weights, one per tier (7, 6, 5 and 4 matches).
pub const DEFAULT_PRIZE_WEIGHTS: [u64; 4] = [1, 1, 1, 1];
