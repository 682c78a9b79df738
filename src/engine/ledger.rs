//! Trade ledger
//!
//! Per-strategy mutable state: bankroll, the single pending position, the
//! append-only trade history, streak counters and the traded-window set.
//! Mutated only by `execute` and `settle`; everything else reads.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::catalog::StrategyDescriptor;
use crate::engine::decision::EntrySignal;
use crate::engine::fees::fee_cents;
use crate::types::{now_millis, Direction, Position, SettledTrade, Tick, TradeOutcome};

/// Live state for a single strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyState {
    pub strategy_id: String,
    pub bankroll: f64,
    pub initial_bankroll: f64,
    pub wins: u32,
    pub losses: u32,
    pub total_wagered: f64,
    pub total_fees: f64,
    /// Signed run length: positive while winning, negative while losing.
    pub current_streak: i32,
    pub max_win_streak: u32,
    pub max_loss_streak: u32,
    pub pending: Option<Position>,
    pub trades: Vec<SettledTrade>,
    pub traded_windows: HashSet<String>,
    /// Advisory only, overwritten every tick; never read by engine logic.
    #[serde(default)]
    pub last_skip_reason: Option<String>,
}

impl StrategyState {
    pub fn new(descriptor: &StrategyDescriptor) -> Self {
        Self {
            strategy_id: descriptor.id.clone(),
            bankroll: descriptor.starting_bankroll,
            initial_bankroll: descriptor.starting_bankroll,
            wins: 0,
            losses: 0,
            total_wagered: 0.0,
            total_fees: 0.0,
            current_streak: 0,
            max_win_streak: 0,
            max_loss_streak: 0,
            pending: None,
            trades: Vec::new(),
            traded_windows: HashSet::new(),
            last_skip_reason: None,
        }
    }

    pub fn total_trades(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn profit(&self) -> f64 {
        self.bankroll - self.initial_bankroll
    }

    /// Open a pending position from an accepted entry signal.
    ///
    /// Must be called with the same tick the signal was evaluated against;
    /// the per-tick strategy loop makes the evaluate/execute pair atomic.
    pub fn execute(
        &mut self,
        descriptor: &StrategyDescriptor,
        tick: &Tick,
        signal: &EntrySignal,
        fee_rate: f64,
    ) -> &Position {
        let bet_size = descriptor.sizing.bet_for_edge(signal.edge);
        let per_contract_fee = fee_cents(signal.price, fee_rate);
        let contracts = (bet_size / (f64::from(signal.price) / 100.0)) as u64;
        let fee = per_contract_fee * contracts as f64 / 100.0;

        let position = Position {
            id: Uuid::new_v4().to_string(),
            entered_at: now_millis(),
            window_id: tick.window_id.clone(),
            market_id: tick.market_id.clone(),
            strike: tick.strike_price,
            asset_price: tick.asset_price,
            mins_left: tick.mins_left,
            direction: signal.direction,
            entry_price: signal.price,
            contracts,
            bet_size,
            fee,
            edge: signal.edge,
        };
        self.total_wagered += bet_size;
        self.traded_windows.insert(tick.window_id.clone());
        self.last_skip_reason = None;

        self.pending.insert(position)
    }

    /// Settle the pending position against a window outcome. Defensive
    /// no-op when nothing is pending.
    pub fn settle(&mut self, outcome: Direction) -> Option<SettledTrade> {
        let position = self.pending.take()?;
        let won = position.direction == outcome;

        let profit = if won {
            // Each contract pays out $1.
            position.contracts as f64 - position.bet_size - position.fee
        } else {
            -position.bet_size - position.fee
        };

        if won {
            self.wins += 1;
            self.current_streak = self.current_streak.max(0) + 1;
            self.max_win_streak = self.max_win_streak.max(self.current_streak as u32);
        } else {
            self.losses += 1;
            self.current_streak = self.current_streak.min(0) - 1;
            self.max_loss_streak = self
                .max_loss_streak
                .max(self.current_streak.unsigned_abs());
        }

        self.bankroll += profit;
        self.total_fees += position.fee;

        let settled = SettledTrade {
            position,
            outcome: if won {
                TradeOutcome::Win
            } else {
                TradeOutcome::Loss
            },
            profit,
            bankroll_after: self.bankroll,
            settled_at: now_millis(),
        };
        self.trades.push(settled.clone());
        Some(settled)
    }
}
