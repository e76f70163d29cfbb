//! Player tickets and their commitment hashes.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;

use crate::{
    codec::{encode, Schema, Value},
    constants::{MAX_GROUPS_PER_TICKET, MAX_NUMBER, WINNING_NUMBERS},
    error::{LotteryError, Result},
    merkle::{sha256, Hash},
};

/// One set of chosen numbers on a ticket.
pub type NumberGroup = Vec<u8>;

/// Ticket lifecycle. Status only ever moves forward:
/// `Pending -> Committed -> Won | Lost`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Pending,
    Committed,
    Won,
    Lost,
}

impl TicketStatus {
    fn rank(&self) -> u8 {
        match self {
            TicketStatus::Pending => 0,
            TicketStatus::Committed => 1,
            TicketStatus::Won | TicketStatus::Lost => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "Pending",
            TicketStatus::Committed => "Committed",
            TicketStatus::Won => "Won",
            TicketStatus::Lost => "Lost",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A player's ticket. Deserializing goes through the same checks as
/// [`Ticket::new`] and rejects a stored hash that does not match the numbers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TicketRecord")]
pub struct Ticket {
    pub address: Pubkey,
    numbers: Vec<NumberGroup>,
    commitment_hash: Hash,
    status: TicketStatus,
}

#[derive(Deserialize)]
struct TicketRecord {
    address: Pubkey,
    numbers: Vec<NumberGroup>,
    commitment_hash: Hash,
    status: TicketStatus,
}

impl TryFrom<TicketRecord> for Ticket {
    type Error = LotteryError;

    fn try_from(record: TicketRecord) -> Result<Self> {
        let mut ticket = Ticket::new(record.address, record.numbers)?;
        if ticket.commitment_hash != record.commitment_hash {
            return Err(LotteryError::InvalidArgument(
                "stored commitment hash does not match the ticket numbers".to_string(),
            ));
        }
        ticket.status = record.status;
        Ok(ticket)
    }
}

/// Wire schema of a ticket's number groups; the commitment hash covers
/// exactly these bytes.
pub fn numbers_schema() -> Schema {
    Schema::vec(Schema::Bytes)
}

/// SHA-256 of the canonical encoding of `numbers`.
pub fn commitment_hash(numbers: &[NumberGroup]) -> Result<Hash> {
    let value = Value::list(numbers, |group| Value::Bytes(group.clone()));
    Ok(sha256(&encode(&value, &numbers_schema())?))
}

fn validate_numbers(numbers: &[NumberGroup]) -> Result<()> {
    if numbers.is_empty() || numbers.len() > MAX_GROUPS_PER_TICKET {
        return Err(LotteryError::InvalidArgument(format!(
            "a ticket carries 1 to {} number groups, found {}",
            MAX_GROUPS_PER_TICKET,
            numbers.len()
        )));
    }
    for group in numbers {
        if group.is_empty() || group.len() > WINNING_NUMBERS {
            return Err(LotteryError::InvalidArgument(format!(
                "a number group holds 1 to {} numbers, found {}",
                WINNING_NUMBERS,
                group.len()
            )));
        }
        if let Some(n) = group.iter().find(|n| **n > MAX_NUMBER) {
            return Err(LotteryError::InvalidArgument(format!(
                "number {} is above {}",
                n, MAX_NUMBER
            )));
        }
        let unique: HashSet<&u8> = group.iter().collect();
        if unique.len() != group.len() {
            return Err(LotteryError::InvalidArgument(
                "numbers within a group must be distinct".to_string(),
            ));
        }
    }
    Ok(())
}

impl Ticket {
    /// A new pending ticket; the commitment hash is fixed here.
    pub fn new(address: Pubkey, numbers: Vec<NumberGroup>) -> Result<Self> {
        validate_numbers(&numbers)?;
        let commitment_hash = commitment_hash(&numbers)?;
        Ok(Self {
            address,
            numbers,
            commitment_hash,
            status: TicketStatus::Pending,
        })
    }

    pub fn numbers(&self) -> &[NumberGroup] {
        &self.numbers
    }

    pub fn commitment_hash(&self) -> Hash {
        self.commitment_hash
    }

    pub fn status(&self) -> TicketStatus {
        self.status
    }

    /// Move to `next`. Backward or sideways moves are rejected.
    pub fn advance(&mut self, next: TicketStatus) -> Result<()> {
        if next.rank() != self.status.rank() + 1 {
            return Err(LotteryError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// A fresh pending copy for resubmission into a new cycle.
    pub fn resubmit(&self) -> Self {
        Self {
            address: self.address,
            numbers: self.numbers.clone(),
            commitment_hash: self.commitment_hash,
            status: TicketStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_hash_is_stable() {
        let owner = Pubkey::new_unique();
        let a = Ticket::new(owner, vec![vec![1, 2, 3, 4, 5, 6, 7]]).unwrap();
        let b = Ticket::new(Pubkey::new_unique(), vec![vec![1, 2, 3, 4, 5, 6, 7]]).unwrap();
        assert_eq!(a.commitment_hash(), b.commitment_hash());

        let c = Ticket::new(owner, vec![vec![7, 6, 5, 4, 3, 2, 1]]).unwrap();
        assert_ne!(a.commitment_hash(), c.commitment_hash());
    }

    #[test]
    fn test_commitment_hash_covers_encoding() {
        let numbers = vec![vec![1u8, 2], vec![3u8]];
        let bytes = [&[2u8, 0, 0, 0][..], &[2, 0, 0, 0, 1, 2], &[1, 0, 0, 0, 3]].concat();
        assert_eq!(commitment_hash(&numbers).unwrap(), sha256(&bytes));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let owner = Pubkey::new_unique();
        assert!(Ticket::new(owner, vec![]).is_err());
        assert!(Ticket::new(owner, vec![vec![]]).is_err());
        assert!(Ticket::new(owner, vec![vec![50]]).is_err());
        assert!(Ticket::new(owner, vec![vec![3, 3]]).is_err());
        assert!(Ticket::new(owner, vec![vec![0, 1, 2, 3, 4, 5, 6, 7]]).is_err());
        assert!(Ticket::new(owner, vec![vec![1]; 5]).is_err());
        assert!(Ticket::new(owner, vec![vec![0, 49]; 4]).is_ok());
    }

    #[test]
    fn test_status_only_moves_forward() {
        let mut ticket = Ticket::new(Pubkey::new_unique(), vec![vec![1]]).unwrap();
        assert!(ticket.advance(TicketStatus::Won).is_err());
        ticket.advance(TicketStatus::Committed).unwrap();
        assert!(ticket.advance(TicketStatus::Pending).is_err());
        ticket.advance(TicketStatus::Lost).unwrap();
        assert!(ticket.advance(TicketStatus::Won).is_err());
        assert_eq!(ticket.status(), TicketStatus::Lost);

        let fresh = ticket.resubmit();
        assert_eq!(fresh.status(), TicketStatus::Pending);
        assert_eq!(fresh.commitment_hash(), ticket.commitment_hash());
    }

    #[test]
    fn test_deserialize_checks_commitment() {
        let mut ticket = Ticket::new(Pubkey::new_unique(), vec![vec![4, 8, 15]]).unwrap();
        ticket.advance(TicketStatus::Committed).unwrap();
        let json = serde_json::to_value(&ticket).unwrap();
        let restored: Ticket = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(restored, ticket);

        let mut forged = json.clone();
        forged["numbers"] = serde_json::json!([[16, 23, 42]]);
        assert!(serde_json::from_value::<Ticket>(forged).is_err());

        let mut invalid = json;
        invalid["numbers"] = serde_json::json!([[4, 4]]);
        assert!(serde_json::from_value::<Ticket>(invalid).is_err());
    }
}
