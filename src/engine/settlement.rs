//! Settlement resolver
//!
//! Detects window close (countdown under 30 seconds), derives the binary
//! outcome from spot vs strike, and settles every strategy pending on that
//! window exactly once. The settled-window set is the single check-and-set
//! guard shared across all strategies.

use std::collections::HashSet;

use tracing::info;

use crate::engine::ledger::StrategyState;
use crate::types::{Direction, SettledTrade, Tick};

/// Countdown threshold below which a window is considered closed.
pub const CLOSE_THRESHOLD_MINS: f64 = 0.5;

#[derive(Debug, Default)]
pub struct SettlementResolver {
    settled_windows: HashSet<String>,
}

impl SettlementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome for a closing tick, or `None` while the window is still live.
    /// Equality with the strike settles DOWN.
    pub fn resolve(&self, tick: &Tick) -> Option<Direction> {
        if tick.mins_left >= CLOSE_THRESHOLD_MINS {
            return None;
        }
        Some(Direction::from_settlement(
            tick.asset_price,
            tick.strike_price,
        ))
    }

    pub fn is_settled(&self, window_id: &str) -> bool {
        self.settled_windows.contains(window_id)
    }

    pub fn settled_count(&self) -> usize {
        self.settled_windows.len()
    }

    /// Settle all pending positions for a window, exactly once. Replays for
    /// an already-settled window are silent no-ops regardless of how many
    /// closing ticks arrive.
    pub fn settle_window<'a, I>(
        &mut self,
        window_id: &str,
        outcome: Direction,
        strategies: I,
    ) -> Vec<(String, SettledTrade)>
    where
        I: IntoIterator<Item = &'a mut StrategyState>,
    {
        if !self.settled_windows.insert(window_id.to_string()) {
            return Vec::new();
        }

        let mut settled = Vec::new();
        for state in strategies {
            let has_pending_here = state
                .pending
                .as_ref()
                .is_some_and(|p| p.window_id == window_id);
            if !has_pending_here {
                continue;
            }
            if let Some(trade) = state.settle(outcome) {
                settled.push((state.strategy_id.clone(), trade));
            }
        }

        if !settled.is_empty() {
            info!(
                window = %window_id,
                outcome = %outcome,
                trades = settled.len(),
                "🏁 Window settled"
            );
        }

        settled
    }

    /// Restore the settled set from persisted state.
    pub fn restore(&mut self, window_ids: impl IntoIterator<Item = String>) {
        self.settled_windows.extend(window_ids);
    }

    pub fn settled_windows(&self) -> impl Iterator<Item = &String> {
        self.settled_windows.iter()
    }
}
