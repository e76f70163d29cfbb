//! Draw service: a single task owns the current cycle, appends incoming
//! tickets to it and closes it on every interval tick.

use anyhow::{anyhow, bail, Context, Result};
use async_channel::Receiver;
use lottery_core::{
    merkle::Hash,
    ticket::{NumberGroup, Ticket},
    CyclePhase, DrawCycle, DrawEngine,
};
use rand::rngs::StdRng;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Signature};
use std::{collections::BTreeSet, str::FromStr, time::Duration};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::Ledger;

/// A ticket purchase waiting to join the current cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketRequest {
    pub owner: Pubkey,
    pub numbers: Vec<NumberGroup>,
}

/// Parses `<owner> <group> [<group> ...]`, each group a comma-separated list
/// of numbers, e.g. `9xQe...k2 1,2,3,4,5,6,7 10,20`.
impl FromStr for TicketRequest {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let owner = parts.next().ok_or_else(|| anyhow!("empty ticket line"))?;
        let owner = Pubkey::from_str(owner).map_err(|e| anyhow!("Invalid owner {}: {}", owner, e))?;

        let numbers = parts
            .map(|group| {
                group
                    .split(',')
                    .map(|n| {
                        n.trim()
                            .parse::<u8>()
                            .with_context(|| format!("Invalid number {:?}", n))
                    })
                    .collect::<Result<NumberGroup>>()
            })
            .collect::<Result<Vec<NumberGroup>>>()?;
        if numbers.is_empty() {
            bail!("ticket for {} has no number groups", owner);
        }
        Ok(Self { owner, numbers })
    }
}

/// Summary of one closed round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: u64,
    pub root: Hash,
    pub tickets: usize,
    pub winning_numbers: BTreeSet<u8>,
    pub distributed: u64,
    pub commit_signature: Signature,
    pub payout_signature: Option<Signature>,
}

pub struct DrawService {
    engine: DrawEngine,
    draw_interval: Duration,
    rng: StdRng,
    cycle: DrawCycle,
    /// Payouts of settled rounds whose submission failed, oldest first.
    pending_payouts: Vec<(u64, Instruction)>,
}

impl DrawService {
    pub fn new(engine: DrawEngine, draw_interval: Duration, rng: StdRng) -> Self {
        Self {
            engine,
            draw_interval,
            rng,
            cycle: DrawCycle::new(1),
            pending_payouts: Vec::new(),
        }
    }

    pub fn cycle(&self) -> &DrawCycle {
        &self.cycle
    }

    pub fn pending_payouts(&self) -> impl Iterator<Item = &Instruction> {
        self.pending_payouts.iter().map(|(_, payout)| payout)
    }

    /// Resubmit payouts left over from earlier rounds, oldest first. Stops at
    /// the first failure and keeps it and everything after it queued.
    pub async fn retry_payouts<L: Ledger>(&mut self, ledger: &L) -> Result<()> {
        while let Some((round, payout)) = self.pending_payouts.first() {
            let signature = ledger
                .submit(std::slice::from_ref(payout))
                .await
                .with_context(|| format!("Failed to resubmit payout of round {}", round))?;
            log::info!("round {} payout submitted in {}", round, signature);
            self.pending_payouts.remove(0);
        }
        Ok(())
    }

    /// Add a requested ticket to the collecting cycle; returns its index.
    pub fn accept(&mut self, request: TicketRequest) -> Result<usize> {
        let ticket = Ticket::new(request.owner, request.numbers)?;
        let index = self.cycle.add_ticket(ticket)?;
        log::debug!(
            "round {} accepted ticket {} from {}",
            self.cycle.round(),
            index,
            request.owner
        );
        Ok(index)
    }

    /// Commit, draw and settle the current cycle, publishing the root before the
    /// draw and the payout after it. Returns `None` when there was nothing to draw.
    ///
    /// Queued payouts of earlier rounds are resubmitted first. On failure
    /// before settlement the tickets go back to a fresh collecting cycle. Once
    /// settled the result is final; a payout that fails to submit is queued for
    /// the next call and the service moves on to the next round.
    pub async fn close_round<L: Ledger>(&mut self, ledger: &L) -> Result<Option<RoundOutcome>> {
        if let Err(e) = self.retry_payouts(ledger).await {
            log::warn!("{:#}, {} payouts still queued", e, self.pending_payouts.len());
        }

        if self.cycle.tickets().is_empty() {
            log::debug!("round {} has no tickets, skipping draw", self.cycle.round());
            return Ok(None);
        }

        match self.try_close_round(ledger).await {
            Ok(outcome) => {
                self.cycle = self.cycle.next_round()?;
                Ok(Some(outcome))
            }
            Err(err) if self.cycle.phase() == CyclePhase::Settled => {
                log::error!(
                    "round {} settled but payout was not submitted, queued for retry: {}",
                    self.cycle.round(),
                    err
                );
                if let Some(payout) = self.cycle.payout() {
                    self.pending_payouts.push((self.cycle.round(), payout.clone()));
                }
                self.cycle = self.cycle.next_round()?;
                Err(err)
            }
            Err(err) => {
                self.cycle.abort()?;
                Err(err)
            }
        }
    }

    async fn try_close_round<L: Ledger>(&mut self, ledger: &L) -> Result<RoundOutcome> {
        let program_id = ledger.program_id();
        let authority = ledger.authority();

        let pool_total = ledger.pool_prize().await?;
        if pool_total == 0 {
            bail!("pool has nothing to pay out");
        }

        let root = self.cycle.commit()?;
        let commit_ix = self
            .cycle
            .commit_instruction(&program_id, &authority, &authority)?;
        let commit_signature = ledger.submit(&[commit_ix]).await?;
        log::info!(
            "round {} root {} published in {}",
            self.cycle.round(),
            solana_sdk::hash::Hash::new_from_array(root),
            commit_signature
        );

        let result = self
            .cycle
            .draw(&self.engine, &mut self.rng, pool_total)?
            .clone();

        let payout_signature = match self.cycle.settle(&program_id, &authority)? {
            Some(payout) => Some(ledger.submit(&[payout]).await?),
            None => {
                log::info!("round {} has no winners", self.cycle.round());
                None
            }
        };

        Ok(RoundOutcome {
            round: self.cycle.round(),
            root,
            tickets: self.cycle.tickets().len(),
            winning_numbers: result.winning_numbers.clone(),
            distributed: result.distributed(),
            commit_signature,
            payout_signature,
        })
    }

    /// Serve until `shutdown` is cancelled. Ticket intake stops when the
    /// sending side closes; draws continue on schedule.
    pub async fn run<L: Ledger>(
        mut self,
        ledger: &L,
        tickets: Receiver<TicketRequest>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut draw_interval = interval(self.draw_interval);
        draw_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        draw_interval.tick().await;
        let mut intake_open = true;
        log::info!("draw service starting ({:?} draw interval)", self.draw_interval);

        loop {
            tokio::select! {
                request = tickets.recv(), if intake_open => match request {
                    Ok(request) => {
                        if let Err(e) = self.accept(request) {
                            log::warn!("rejected ticket: {}", e);
                        }
                    }
                    Err(_) => {
                        log::info!("ticket intake closed");
                        intake_open = false;
                    }
                },
                _ = draw_interval.tick() => {
                    match self.close_round(ledger).await {
                        Ok(Some(outcome)) => log::info!(
                            "round {} closed: {} tickets, numbers {:?}, {} lamports paid",
                            outcome.round,
                            outcome.tickets,
                            outcome.winning_numbers,
                            outcome.distributed
                        ),
                        Ok(None) => {}
                        Err(e) => log::error!("draw failed: {}", e),
                    }
                }
                _ = shutdown.cancelled() => {
                    log::info!("draw service received shutdown signal");
                    break;
                }
            }
        }

        if !self.pending_payouts.is_empty() {
            log::warn!(
                "{} payouts were never submitted: rounds {:?}",
                self.pending_payouts.len(),
                self.pending_payouts.iter().map(|(round, _)| *round).collect::<Vec<_>>()
            );
        }
        log::info!("draw service stopped in round {}", self.cycle.round());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lottery_core::{codec::Schematic, constants::PROGRAM_ID, LotteryInstruction, TicketStatus};
    use rand::SeedableRng;
    use std::sync::Mutex;

    struct MockLedger {
        authority: Pubkey,
        prize: u64,
        fail_submit: bool,
        /// 1-based submit calls that fail.
        failing_calls: Vec<usize>,
        calls: Mutex<usize>,
        submitted: Mutex<Vec<Instruction>>,
    }

    impl MockLedger {
        fn new(prize: u64) -> Self {
            Self {
                authority: Pubkey::new_unique(),
                prize,
                fail_submit: false,
                failing_calls: Vec::new(),
                calls: Mutex::new(0),
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    impl Ledger for MockLedger {
        fn program_id(&self) -> Pubkey {
            PROGRAM_ID
        }

        fn authority(&self) -> Pubkey {
            self.authority
        }

        async fn pool_prize(&self) -> Result<u64> {
            Ok(self.prize)
        }

        async fn submit(&self, instructions: &[Instruction]) -> Result<Signature> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.fail_submit || self.failing_calls.contains(&call) {
                bail!("rpc unavailable");
            }
            self.submitted.lock().unwrap().extend_from_slice(instructions);
            Ok(Signature::new_unique())
        }
    }

    fn service() -> DrawService {
        DrawService::new(
            DrawEngine::default(),
            Duration::from_millis(10),
            StdRng::seed_from_u64(11),
        )
    }

    fn request(groups: Vec<Vec<u8>>) -> TicketRequest {
        TicketRequest {
            owner: Pubkey::new_unique(),
            numbers: groups,
        }
    }

    #[test]
    fn test_parse_ticket_line() {
        let owner = Pubkey::new_unique();
        let parsed: TicketRequest = format!("{} 1,2,3 40, 41", owner).parse().unwrap();
        assert_eq!(parsed.owner, owner);
        assert_eq!(parsed.numbers, vec![vec![1, 2, 3], vec![40], vec![41]]);

        assert!("".parse::<TicketRequest>().is_err());
        assert!(owner.to_string().parse::<TicketRequest>().is_err());
        assert!(format!("{} 1,x", owner).parse::<TicketRequest>().is_err());
        assert!("nope 1,2".parse::<TicketRequest>().is_err());
    }

    #[test]
    fn test_accept_validates_tickets() {
        let mut service = service();
        assert_eq!(service.accept(request(vec![vec![1, 2, 3]])).unwrap(), 0);
        assert!(service.accept(request(vec![vec![60]])).is_err());
        assert_eq!(service.cycle().tickets().len(), 1);
    }

    #[tokio::test]
    async fn test_close_round_publishes_root_then_moves_on() {
        let ledger = MockLedger::new(1_000_000);
        let mut service = service();
        for _ in 0..5 {
            service.accept(request(vec![vec![0, 1, 2, 3, 4, 5, 6]])).unwrap();
        }

        let outcome = service.close_round(&ledger).await.unwrap().unwrap();
        assert_eq!(outcome.round, 1);
        assert_eq!(outcome.tickets, 5);
        assert_eq!(service.cycle().round(), 2);
        assert_eq!(service.cycle().phase(), CyclePhase::Collecting);

        let submitted = ledger.submitted.lock().unwrap();
        match LotteryInstruction::unpack(&submitted[0].data).unwrap() {
            LotteryInstruction::PurchaseTicket(data) => {
                assert_eq!(data.merkle_root, outcome.root);
                assert_eq!(data.total_tickets, 5);
                assert_eq!(data.address, ledger.authority);
            }
            other => panic!("unexpected instruction {:?}", other),
        }
        assert_eq!(submitted.len(), 1 + outcome.payout_signature.iter().count());
    }

    #[tokio::test]
    async fn test_empty_round_is_skipped() {
        let ledger = MockLedger::new(1_000);
        let mut service = service();
        assert_eq!(service.close_round(&ledger).await.unwrap(), None);
        assert!(ledger.submitted.lock().unwrap().is_empty());
        assert_eq!(service.cycle().round(), 1);
    }

    #[tokio::test]
    async fn test_failed_round_returns_tickets_to_collecting() {
        let mut ledger = MockLedger::new(0);
        let mut service = service();
        service.accept(request(vec![vec![1, 2]])).unwrap();
        assert!(service.close_round(&ledger).await.is_err());
        assert_eq!(service.cycle().phase(), CyclePhase::Collecting);
        assert_eq!(service.cycle().tickets().len(), 1);

        ledger.prize = 500;
        ledger.fail_submit = true;
        assert!(service.close_round(&ledger).await.is_err());
        assert_eq!(service.cycle().round(), 1);
        assert_eq!(service.cycle().phase(), CyclePhase::Collecting);
        assert!(service
            .cycle()
            .tickets()
            .iter()
            .all(|t| t.status() == TicketStatus::Pending));

        ledger.fail_submit = false;
        assert!(service.close_round(&ledger).await.unwrap().is_some());
        assert_eq!(service.cycle().round(), 2);
    }

    #[tokio::test]
    async fn test_failed_payout_is_retried_next_round() {
        let mut ledger = MockLedger::new(1_000_000);
        ledger.failing_calls = vec![2];
        let mut service = service();
        let winning: Vec<u8> = DrawEngine::default()
            .draw(&mut StdRng::seed_from_u64(11))
            .into_iter()
            .collect();
        service.accept(request(vec![winning])).unwrap();

        // commit goes through, the payout does not
        assert!(service.close_round(&ledger).await.is_err());
        assert_eq!(service.cycle().round(), 2);
        assert_eq!(service.cycle().phase(), CyclePhase::Collecting);
        let queued: Vec<Instruction> = service.pending_payouts().cloned().collect();
        assert_eq!(queued.len(), 1);
        match LotteryInstruction::unpack(&queued[0].data).unwrap() {
            LotteryInstruction::SelectWinnersAndAirdrop(winners) => {
                assert_eq!(winners.len(), 1);
                assert!(winners[0].amount > 0);
            }
            other => panic!("unexpected instruction {:?}", other),
        }
        assert_eq!(ledger.submitted.lock().unwrap().len(), 1);

        // the next tick pays it even with no tickets in the new round
        assert_eq!(service.close_round(&ledger).await.unwrap(), None);
        assert_eq!(service.pending_payouts().count(), 0);
        let submitted = ledger.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[1], queued[0]);
    }

    #[tokio::test]
    async fn test_queued_payout_survives_another_failure() {
        let mut ledger = MockLedger::new(1_000_000);
        ledger.failing_calls = vec![2, 3];
        let mut service = service();
        let winning: Vec<u8> = DrawEngine::default()
            .draw(&mut StdRng::seed_from_u64(11))
            .into_iter()
            .collect();
        service.accept(request(vec![winning])).unwrap();
        assert!(service.close_round(&ledger).await.is_err());

        assert!(service.retry_payouts(&ledger).await.is_err());
        assert_eq!(service.pending_payouts().count(), 1);
        service.retry_payouts(&ledger).await.unwrap();
        assert_eq!(service.pending_payouts().count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let ledger = MockLedger::new(1_000);
        let (sender, receiver) = async_channel::unbounded();
        let shutdown = CancellationToken::new();

        sender.send(request(vec![vec![5, 6, 7]])).await.unwrap();
        drop(sender);

        let token = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        service().run(&ledger, receiver, shutdown).await.unwrap();

        let submitted = ledger.submitted.lock().unwrap();
        assert!(!submitted.is_empty());
    }
}
