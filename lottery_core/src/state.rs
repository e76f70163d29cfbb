//! Records exchanged with the lottery program and their wire schemas.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::{
    codec::{field, variant, Schema, Schematic, Value},
    error::{LotteryError, Result},
    merkle::{self, Hash, MultiProof},
};

/// Pool configuration stored in the pool vault account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStorageData {
    pub ticket_price: u64,
    pub draft_count: u64,
    pub initial_amount: u64,
}

/// Ticket commitment stored in a player account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAccountData {
    pub merkle_root: Hash,
    pub total_tickets: u64,
    pub address: Pubkey,
}

/// One paid winner of a draft. Carries a multi-proof of the winner's tickets
/// against the committed root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftWinner {
    pub amount: u64,
    pub ticket_indices: Vec<u32>,
    pub tickets: Vec<Hash>,
    pub proof_hashes: Vec<Hash>,
    pub proof_flags: Vec<bool>,
    pub total_tickets: u32,
    pub address: Pubkey,
    pub token_account: Pubkey,
}

impl DraftWinner {
    pub fn new(
        amount: u64,
        tickets: Vec<Hash>,
        proof: MultiProof,
        address: Pubkey,
        token_account: Pubkey,
    ) -> Self {
        Self {
            amount,
            ticket_indices: proof.leaf_indices,
            tickets,
            proof_hashes: proof.siblings,
            proof_flags: proof.flags,
            total_tickets: proof.leaf_count,
            address,
            token_account,
        }
    }

    pub fn proof(&self) -> MultiProof {
        MultiProof {
            leaf_indices: self.ticket_indices.clone(),
            siblings: self.proof_hashes.clone(),
            flags: self.proof_flags.clone(),
            leaf_count: self.total_tickets,
        }
    }

    /// Check the winner's tickets against a published commitment. The tree
    /// size is taken from the commitment, not from the winner record.
    pub fn verify_against(&self, commitment: &TicketAccountData) -> bool {
        let Ok(leaf_count) = u32::try_from(commitment.total_tickets) else {
            return false;
        };
        merkle::verify(&commitment.merkle_root, leaf_count, &self.proof(), &self.tickets)
    }
}

/// Instructions understood by the lottery program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryInstruction {
    /// 0. `[signer, writable]` pool authority
    /// 1. `[writable]` pool vault PDA
    /// 2. `[writable]` receipt mint PDA
    /// 3. `[]` rent sysvar
    /// 4. `[]` token program
    /// 5. `[]` system program
    InitializePool(PoolStorageData),

    /// 0. `[signer, writable]` payer
    /// 1. `[writable]` pool vault PDA
    /// 2. `[]` system program
    Deposit(u64),

    /// 0. `[signer, writable]` player
    /// 1. `[writable]` player PDA
    Withdraw(u64),

    /// 0. `[writable]` pool authority
    /// 1. `[signer, writable]` player
    /// 2. `[writable]` player PDA
    /// 3. `[writable]` player token PDA
    /// 4. `[writable]` pool vault PDA
    /// 5. `[writable]` receipt mint PDA
    /// 6. `[]` rent sysvar
    /// 7. `[]` token program
    /// 8. `[]` system program
    PurchaseTicket(TicketAccountData),

    /// 0. `[signer, writable]` pool authority
    /// 1. `[writable]` pool vault PDA
    /// 2. `[writable]` receipt mint PDA
    /// 3.. `[writable]` winner, `[writable]` winner token account, per winner
    SelectWinnersAndAirdrop(Vec<DraftWinner>),

    /// 0. `[signer, writable]` player
    /// 1. `[writable]` player PDA
    /// 2. `[writable]` player token PDA
    /// 3. `[writable]` pool authority
    /// 4. `[]` receipt mint PDA
    /// 5. `[]` token program
    ClosePlayerAccount,
}

impl LotteryInstruction {
    pub const INITIALIZE_POOL: u8 = 0;
    pub const DEPOSIT: u8 = 1;
    pub const WITHDRAW: u8 = 2;
    pub const PURCHASE_TICKET: u8 = 3;
    pub const SELECT_WINNERS_AND_AIRDROP: u8 = 4;
    pub const CLOSE_PLAYER_ACCOUNT: u8 = 5;

    /// Leading discriminant byte of the packed instruction.
    pub fn opcode(&self) -> u8 {
        match self {
            LotteryInstruction::InitializePool(_) => Self::INITIALIZE_POOL,
            LotteryInstruction::Deposit(_) => Self::DEPOSIT,
            LotteryInstruction::Withdraw(_) => Self::WITHDRAW,
            LotteryInstruction::PurchaseTicket(_) => Self::PURCHASE_TICKET,
            LotteryInstruction::SelectWinnersAndAirdrop(_) => Self::SELECT_WINNERS_AND_AIRDROP,
            LotteryInstruction::ClosePlayerAccount => Self::CLOSE_PLAYER_ACCOUNT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LotteryInstruction::InitializePool(_) => "InitializePool",
            LotteryInstruction::Deposit(_) => "Deposit",
            LotteryInstruction::Withdraw(_) => "Withdraw",
            LotteryInstruction::PurchaseTicket(_) => "PurchaseTicket",
            LotteryInstruction::SelectWinnersAndAirdrop(_) => "SelectWinnersAndAirdrop",
            LotteryInstruction::ClosePlayerAccount => "ClosePlayerAccount",
        }
    }
}

fn hash_value(hash: &Hash) -> Value {
    Value::fixed(hash)
}

fn pubkey_value(key: &Pubkey) -> Value {
    Value::fixed(key.as_ref())
}

fn pubkey_from(value: Value) -> Result<Pubkey> {
    Ok(Pubkey::new_from_array(value.into_fixed::<32>()?))
}

fn hashes_from(value: Value) -> Result<Vec<Hash>> {
    value.into_list()?.into_iter().map(|v| v.into_fixed::<32>()).collect()
}

impl Schematic for PoolStorageData {
    fn schema() -> Schema {
        Schema::Struct(vec![
            field("ticket_price", Schema::U64),
            field("draft_count", Schema::U64),
            field("initial_amount", Schema::U64),
        ])
    }

    fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::U64(self.ticket_price),
            Value::U64(self.draft_count),
            Value::U64(self.initial_amount),
        ])
    }

    fn from_value(value: Value) -> Result<Self> {
        let mut fields = value.into_record()?;
        let data = Self {
            ticket_price: fields.next("ticket_price")?.into_u64()?,
            draft_count: fields.next("draft_count")?.into_u64()?,
            initial_amount: fields.next("initial_amount")?.into_u64()?,
        };
        fields.finish()?;
        Ok(data)
    }
}

impl Schematic for TicketAccountData {
    fn schema() -> Schema {
        Schema::Struct(vec![
            field("merkle_root", Schema::FixedBytes(32)),
            field("total_tickets", Schema::U64),
            field("address", Schema::FixedBytes(32)),
        ])
    }

    fn to_value(&self) -> Value {
        Value::Record(vec![
            hash_value(&self.merkle_root),
            Value::U64(self.total_tickets),
            pubkey_value(&self.address),
        ])
    }

    fn from_value(value: Value) -> Result<Self> {
        let mut fields = value.into_record()?;
        let data = Self {
            merkle_root: fields.next("merkle_root")?.into_fixed()?,
            total_tickets: fields.next("total_tickets")?.into_u64()?,
            address: pubkey_from(fields.next("address")?)?,
        };
        fields.finish()?;
        Ok(data)
    }
}

impl Schematic for DraftWinner {
    fn schema() -> Schema {
        Schema::Struct(vec![
            field("amount", Schema::U64),
            field("ticket_indices", Schema::vec(Schema::U32)),
            field("tickets", Schema::vec(Schema::FixedBytes(32))),
            field("proof_hashes", Schema::vec(Schema::FixedBytes(32))),
            field("proof_flags", Schema::vec(Schema::Bool)),
            field("total_tickets", Schema::U32),
            field("address", Schema::FixedBytes(32)),
            field("token_account", Schema::FixedBytes(32)),
        ])
    }

    fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::U64(self.amount),
            Value::list(&self.ticket_indices, |i| Value::U32(*i)),
            Value::list(&self.tickets, hash_value),
            Value::list(&self.proof_hashes, hash_value),
            Value::list(&self.proof_flags, |f| Value::Bool(*f)),
            Value::U32(self.total_tickets),
            pubkey_value(&self.address),
            pubkey_value(&self.token_account),
        ])
    }

    fn from_value(value: Value) -> Result<Self> {
        let mut fields = value.into_record()?;
        let winner = Self {
            amount: fields.next("amount")?.into_u64()?,
            ticket_indices: fields
                .next("ticket_indices")?
                .into_list()?
                .into_iter()
                .map(Value::into_u32)
                .collect::<Result<_>>()?,
            tickets: hashes_from(fields.next("tickets")?)?,
            proof_hashes: hashes_from(fields.next("proof_hashes")?)?,
            proof_flags: fields
                .next("proof_flags")?
                .into_list()?
                .into_iter()
                .map(Value::into_bool)
                .collect::<Result<_>>()?,
            total_tickets: fields.next("total_tickets")?.into_u32()?,
            address: pubkey_from(fields.next("address")?)?,
            token_account: pubkey_from(fields.next("token_account")?)?,
        };
        fields.finish()?;
        Ok(winner)
    }
}

impl Schematic for LotteryInstruction {
    fn schema() -> Schema {
        Schema::Enum(vec![
            variant(
                Self::INITIALIZE_POOL,
                "InitializePool",
                vec![field("pool", PoolStorageData::schema())],
            ),
            variant(Self::DEPOSIT, "Deposit", vec![field("amount", Schema::U64)]),
            variant(Self::WITHDRAW, "Withdraw", vec![field("amount", Schema::U64)]),
            variant(
                Self::PURCHASE_TICKET,
                "PurchaseTicket",
                vec![field("ticket", TicketAccountData::schema())],
            ),
            variant(
                Self::SELECT_WINNERS_AND_AIRDROP,
                "SelectWinnersAndAirdrop",
                vec![field("winners", Schema::vec(DraftWinner::schema()))],
            ),
            variant(Self::CLOSE_PLAYER_ACCOUNT, "ClosePlayerAccount", vec![]),
        ])
    }

    fn to_value(&self) -> Value {
        let fields = match self {
            LotteryInstruction::InitializePool(pool) => vec![pool.to_value()],
            LotteryInstruction::Deposit(amount) | LotteryInstruction::Withdraw(amount) => {
                vec![Value::U64(*amount)]
            }
            LotteryInstruction::PurchaseTicket(ticket) => vec![ticket.to_value()],
            LotteryInstruction::SelectWinnersAndAirdrop(winners) => {
                vec![Value::list(winners, DraftWinner::to_value)]
            }
            LotteryInstruction::ClosePlayerAccount => vec![],
        };
        Value::Variant {
            discriminant: self.opcode(),
            fields,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        let (discriminant, mut fields) = value.into_variant()?;
        let instruction = match discriminant {
            Self::INITIALIZE_POOL => LotteryInstruction::InitializePool(
                PoolStorageData::from_value(fields.next("pool")?)?,
            ),
            Self::DEPOSIT => LotteryInstruction::Deposit(fields.next("amount")?.into_u64()?),
            Self::WITHDRAW => LotteryInstruction::Withdraw(fields.next("amount")?.into_u64()?),
            Self::PURCHASE_TICKET => LotteryInstruction::PurchaseTicket(
                TicketAccountData::from_value(fields.next("ticket")?)?,
            ),
            Self::SELECT_WINNERS_AND_AIRDROP => LotteryInstruction::SelectWinnersAndAirdrop(
                fields
                    .next("winners")?
                    .into_list()?
                    .into_iter()
                    .map(DraftWinner::from_value)
                    .collect::<Result<_>>()?,
            ),
            Self::CLOSE_PLAYER_ACCOUNT => LotteryInstruction::ClosePlayerAccount,
            other => {
                return Err(LotteryError::MalformedEncoding(format!(
                    "unknown instruction discriminant {}",
                    other
                )))
            }
        };
        fields.finish()?;
        Ok(instruction)
    }
}
