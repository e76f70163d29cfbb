//! Winning number draws, ticket matching and prize splitting.

use rand::Rng;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeSet;

use crate::{
    constants::{DEFAULT_PRIZE_WEIGHTS, MAX_NUMBER, MIN_NUMBER, WINNING_NUMBERS},
    error::{LotteryError, Result},
    ticket::Ticket,
};

/// Source of uniformly distributed numbers in `low..=high`.
///
/// Every `rand::Rng` is a source; tests plug in scripted ones.
pub trait NumberSource {
    fn next_number(&mut self, low: u8, high: u8) -> u8;
}

impl<R: Rng + ?Sized> NumberSource for R {
    fn next_number(&mut self, low: u8, high: u8) -> u8 {
        self.random_range(low..=high)
    }
}

/// Draw `WINNING_NUMBERS` distinct numbers, redrawing duplicates.
pub fn draw_numbers<S: NumberSource + ?Sized>(source: &mut S) -> BTreeSet<u8> {
    let mut numbers = BTreeSet::new();
    while numbers.len() < WINNING_NUMBERS {
        let n = source.next_number(MIN_NUMBER, MAX_NUMBER);
        if !numbers.insert(n) {
            log::trace!("redrawing duplicate number {}", n);
        }
    }
    numbers
}

/// Split `total` across tiers proportionally to `weights`:
/// `total * weight / sum(weights)`, floored, in exact integer math.
pub fn split_prize(total: u64, weights: &[u64]) -> Result<Vec<u64>> {
    if total == 0 {
        return Err(LotteryError::InvalidPool(
            "total prize must be greater than 0".to_string(),
        ));
    }
    let total_weight = validate_weights(weights)?;

    Ok(weights
        .iter()
        .map(|w| (total as u128 * *w as u128 / total_weight) as u64)
        .collect())
}

fn validate_weights(weights: &[u64]) -> Result<u128> {
    if weights.is_empty() {
        return Err(LotteryError::InvalidWeights(
            "at least one weight is required".to_string(),
        ));
    }
    if weights.iter().any(|w| *w == 0) {
        return Err(LotteryError::InvalidWeights(
            "weights must be positive".to_string(),
        ));
    }
    Ok(weights.iter().map(|w| *w as u128).sum())
}

/// Matching numbers per group of `ticket`.
pub fn match_counts(ticket: &Ticket, winning: &BTreeSet<u8>) -> Vec<usize> {
    ticket
        .numbers()
        .iter()
        .map(|group| group.iter().filter(|n| winning.contains(n)).count())
        .collect()
}

/// Payout amount owed to one ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerShare {
    /// Position of the ticket in the cycle's commitment tree.
    pub ticket_index: usize,
    pub address: Pubkey,
    pub amount: u64,
    /// Tier hit by each winning group.
    pub tiers: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub winning_numbers: BTreeSet<u8>,
    pub pool_total: u64,
    /// Ordered by ticket index.
    pub shares: Vec<WinnerShare>,
}

impl DrawResult {
    pub fn distributed(&self) -> u64 {
        self.shares.iter().map(|s| s.amount).sum()
    }

    pub fn is_winner(&self, ticket_index: usize) -> bool {
        self.shares.iter().any(|s| s.ticket_index == ticket_index)
    }
}

/// Draw policy: one weight per prize tier.
///
/// A group with all `WINNING_NUMBERS` numbers matched hits tier 0, one fewer
/// hits tier 1, and so on for as many tiers as there are weights. A tier's
/// allocation divides evenly among the groups that hit it; remainders and the
/// allocations of tiers nobody hit stay in the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawEngine {
    weights: Vec<u64>,
}

impl Default for DrawEngine {
    fn default() -> Self {
        Self {
            weights: DEFAULT_PRIZE_WEIGHTS.to_vec(),
        }
    }
}

impl DrawEngine {
    pub fn new(weights: Vec<u64>) -> Result<Self> {
        validate_weights(&weights)?;
        if weights.len() > WINNING_NUMBERS {
            return Err(LotteryError::InvalidWeights(format!(
                "at most {} tiers, found {}",
                WINNING_NUMBERS,
                weights.len()
            )));
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[u64] {
        &self.weights
    }

    /// Tier for a group with `matches` hits, if any.
    pub fn tier(&self, matches: usize) -> Option<usize> {
        WINNING_NUMBERS
            .checked_sub(matches)
            .filter(|tier| *tier < self.weights.len())
    }

    pub fn draw<S: NumberSource + ?Sized>(&self, source: &mut S) -> BTreeSet<u8> {
        let numbers = draw_numbers(source);
        log::debug!("drew winning numbers {:?}", numbers);
        numbers
    }

    /// Match `tickets` against `winning` and split `pool_total` among the winners.
    pub fn settle(
        &self,
        winning: &BTreeSet<u8>,
        tickets: &[Ticket],
        pool_total: u64,
    ) -> Result<DrawResult> {
        if winning.len() != WINNING_NUMBERS
            || winning.iter().any(|n| !(MIN_NUMBER..=MAX_NUMBER).contains(n))
        {
            return Err(LotteryError::InvalidArgument(format!(
                "winning set must hold {} distinct numbers in {}..={}",
                WINNING_NUMBERS, MIN_NUMBER, MAX_NUMBER
            )));
        }
        let allocations = split_prize(pool_total, &self.weights)?;

        let ticket_tiers: Vec<Vec<usize>> = tickets
            .iter()
            .map(|ticket| {
                match_counts(ticket, winning)
                    .into_iter()
                    .filter_map(|m| self.tier(m))
                    .collect()
            })
            .collect();

        let mut hits = vec![0u64; self.weights.len()];
        for tier in ticket_tiers.iter().flatten() {
            hits[*tier] += 1;
        }
        let per_group: Vec<u64> = allocations
            .iter()
            .zip(&hits)
            .map(|(allocation, count)| if *count == 0 { 0 } else { allocation / count })
            .collect();

        let shares: Vec<WinnerShare> = ticket_tiers
            .into_iter()
            .enumerate()
            .filter(|(_, tiers)| !tiers.is_empty())
            .map(|(ticket_index, tiers)| WinnerShare {
                ticket_index,
                address: tickets[ticket_index].address,
                amount: tiers.iter().map(|t| per_group[*t]).sum(),
                tiers,
            })
            .collect();

        log::debug!(
            "settled draw: {} tickets, {} winners, tier hits {:?}",
            tickets.len(),
            shares.len(),
            hits
        );
        Ok(DrawResult {
            winning_numbers: winning.clone(),
            pool_total,
            shares,
        })
    }
}
