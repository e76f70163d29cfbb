//! One draw cycle: `Collecting -> Committed -> Drawn -> Settled`.
//!
//! Tickets are only accepted while collecting. Committing freezes the ticket
//! set and builds its tree in one step, so nothing can join a tree whose root
//! has been handed out. All transitions take `&mut self`, which gives the
//! cycle exactly one writer. Every fallible transition computes its result
//! before touching the cycle, so a failed call leaves the phase unchanged.
//!
//! A cycle that fails before settlement is aborted back to collecting with
//! fresh ticket records; its tree and proofs are discarded, never reused.

use serde::{Deserialize, Serialize};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

use crate::{
    draw::{DrawEngine, DrawResult, NumberSource},
    error::{LotteryError, Result},
    instruction::{purchase_ticket, select_winners_and_airdrop},
    merkle::{CommitmentTree, Hash},
    pda::find_player_token_pda_account,
    state::{DraftWinner, TicketAccountData},
    ticket::{Ticket, TicketStatus},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    Collecting,
    Committed,
    Drawn,
    Settled,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Collecting => "Collecting",
            CyclePhase::Committed => "Committed",
            CyclePhase::Drawn => "Drawn",
            CyclePhase::Settled => "Settled",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DrawCycle {
    round: u64,
    phase: CyclePhase,
    tickets: Vec<Ticket>,
    tree: Option<CommitmentTree>,
    result: Option<DrawResult>,
    payout: Option<Instruction>,
}

impl DrawCycle {
    pub fn new(round: u64) -> Self {
        Self {
            round,
            phase: CyclePhase::Collecting,
            tickets: Vec::new(),
            tree: None,
            result: None,
            payout: None,
        }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn tree(&self) -> Option<&CommitmentTree> {
        self.tree.as_ref()
    }

    pub fn root(&self) -> Option<Hash> {
        self.tree.as_ref().map(CommitmentTree::root)
    }

    pub fn result(&self) -> Option<&DrawResult> {
        self.result.as_ref()
    }

    pub fn payout(&self) -> Option<&Instruction> {
        self.payout.as_ref()
    }

    fn expect_phase(&self, expected: CyclePhase, to: CyclePhase) -> Result<()> {
        if self.phase != expected {
            return Err(LotteryError::InvalidTransition {
                from: self.phase.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }

    /// Append a pending ticket; returns its future leaf index.
    pub fn add_ticket(&mut self, ticket: Ticket) -> Result<usize> {
        self.expect_phase(CyclePhase::Collecting, CyclePhase::Collecting)?;
        if ticket.status() != TicketStatus::Pending {
            return Err(LotteryError::InvalidArgument(format!(
                "only pending tickets can join a cycle, found {}",
                ticket.status()
            )));
        }
        self.tickets.push(ticket);
        Ok(self.tickets.len() - 1)
    }

    /// Freeze the ticket set and build its commitment tree.
    pub fn commit(&mut self) -> Result<Hash> {
        self.expect_phase(CyclePhase::Collecting, CyclePhase::Committed)?;
        let leaves: Vec<Hash> = self.tickets.iter().map(Ticket::commitment_hash).collect();
        let tree = CommitmentTree::build(&leaves)?;
        let root = tree.root();

        for ticket in &mut self.tickets {
            ticket.advance(TicketStatus::Committed)?;
        }
        self.tree = Some(tree);
        self.phase = CyclePhase::Committed;
        log::info!(
            "round {} committed {} tickets",
            self.round,
            self.tickets.len()
        );
        Ok(root)
    }

    /// The commitment record published on-chain for this cycle.
    pub fn commitment(&self, committer: &Pubkey) -> Result<TicketAccountData> {
        let tree = self.tree.as_ref().ok_or(LotteryError::InvalidTransition {
            from: self.phase.as_str(),
            to: CyclePhase::Committed.as_str(),
        })?;
        Ok(TicketAccountData {
            merkle_root: tree.root(),
            total_tickets: tree.leaf_count() as u64,
            address: *committer,
        })
    }

    /// Instruction publishing this cycle's root, recorded under `committer`.
    pub fn commit_instruction(
        &self,
        program_id: &Pubkey,
        pool_authority: &Pubkey,
        committer: &Pubkey,
    ) -> Result<Instruction> {
        purchase_ticket(
            program_id,
            pool_authority,
            committer,
            self.commitment(committer)?,
        )
    }

    /// Draw winning numbers and compute every ticket's share of `pool_total`.
    pub fn draw<S: NumberSource + ?Sized>(
        &mut self,
        engine: &DrawEngine,
        source: &mut S,
        pool_total: u64,
    ) -> Result<&DrawResult> {
        self.expect_phase(CyclePhase::Committed, CyclePhase::Drawn)?;
        let winning = engine.draw(source);
        let result = engine.settle(&winning, &self.tickets, pool_total)?;

        for (index, ticket) in self.tickets.iter_mut().enumerate() {
            let status = if result.is_winner(index) {
                TicketStatus::Won
            } else {
                TicketStatus::Lost
            };
            ticket.advance(status)?;
        }
        self.phase = CyclePhase::Drawn;
        log::info!(
            "round {} drawn {:?}: {} winning tickets, {} lamports owed",
            self.round,
            result.winning_numbers,
            result.shares.len(),
            result.distributed()
        );
        Ok(self.result.insert(result))
    }

    /// Per-owner payout records with multi-proofs against this cycle's root,
    /// in order of each owner's first winning ticket. Owners owed nothing are
    /// left out.
    pub fn draft_winners(&self, program_id: &Pubkey) -> Result<Vec<DraftWinner>> {
        let (Some(tree), Some(result)) = (self.tree.as_ref(), self.result.as_ref()) else {
            return Err(LotteryError::InvalidTransition {
                from: self.phase.as_str(),
                to: CyclePhase::Settled.as_str(),
            });
        };

        let mut owners: Vec<(Pubkey, u64, Vec<usize>)> = Vec::new();
        for share in &result.shares {
            match owners.iter_mut().find(|(owner, ..)| *owner == share.address) {
                Some((_, amount, indices)) => {
                    *amount += share.amount;
                    indices.push(share.ticket_index);
                }
                None => owners.push((share.address, share.amount, vec![share.ticket_index])),
            }
        }

        owners
            .into_iter()
            .filter(|(_, amount, _)| *amount > 0)
            .map(|(owner, amount, indices)| -> Result<DraftWinner> {
                let proof = tree.prove(&indices)?;
                let tickets = proof
                    .leaf_indices
                    .iter()
                    .map(|i| tree.leaves()[*i as usize])
                    .collect();
                let (token_account, _) = find_player_token_pda_account(program_id, &owner)?;
                Ok(DraftWinner::new(amount, tickets, proof, owner, token_account))
            })
            .collect()
    }

    /// Build the payout instruction and close the cycle. Returns `None` when
    /// nobody is owed anything.
    pub fn settle(
        &mut self,
        program_id: &Pubkey,
        pool_authority: &Pubkey,
    ) -> Result<Option<Instruction>> {
        self.expect_phase(CyclePhase::Drawn, CyclePhase::Settled)?;
        let winners = self.draft_winners(program_id)?;
        let payout = if winners.is_empty() {
            None
        } else {
            Some(select_winners_and_airdrop(program_id, pool_authority, winners)?)
        };

        self.payout = payout.clone();
        self.phase = CyclePhase::Settled;
        log::info!(
            "round {} settled, payout instruction: {}",
            self.round,
            payout.is_some()
        );
        Ok(payout)
    }

    /// Return an unsettled cycle to collecting with fresh pending tickets.
    pub fn abort(&mut self) -> Result<()> {
        if self.phase == CyclePhase::Settled {
            return Err(LotteryError::InvalidTransition {
                from: self.phase.as_str(),
                to: CyclePhase::Collecting.as_str(),
            });
        }
        log::warn!(
            "round {} aborted in phase {}, {} tickets back to collecting",
            self.round,
            self.phase.as_str(),
            self.tickets.len()
        );
        self.tickets = self.tickets.iter().map(Ticket::resubmit).collect();
        self.tree = None;
        self.result = None;
        self.payout = None;
        self.phase = CyclePhase::Collecting;
        Ok(())
    }

    /// The empty cycle following a settled one.
    pub fn next_round(&self) -> Result<DrawCycle> {
        self.expect_phase(CyclePhase::Settled, CyclePhase::Collecting)?;
        Ok(DrawCycle::new(self.round + 1))
    }
}
