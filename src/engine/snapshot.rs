//! Snapshot builder
//!
//! Read-only aggregate view of the whole fleet, derived on demand and
//! published as a value through a watch channel. Consumers (dashboard,
//! state file) only ever see a complete, versioned snapshot - never the
//! engine's live state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::{EntryPolicy, StrategyDescriptor};
use crate::engine::ledger::StrategyState;
use crate::types::{Position, SettledTrade, Tick};

/// Descriptor fields relevant for display, flattened out of the policy enum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_minute: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_wait_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_edge: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odds_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_probability: Option<f64>,
    pub bet_size: f64,
    pub scale_with_edge: bool,
}

impl DescriptorView {
    pub fn from_descriptor(descriptor: &StrategyDescriptor) -> Self {
        let mut view = DescriptorView {
            bet_size: descriptor.sizing.bet_for_edge(None),
            scale_with_edge: matches!(
                descriptor.sizing,
                crate::catalog::BetSizing::EdgeScaled { .. }
            ),
            ..Default::default()
        };
        match descriptor.policy {
            EntryPolicy::FixedMinute {
                target_minute,
                true_probability,
                min_edge,
                ..
            } => {
                view.target_minute = Some(target_minute);
                view.true_probability = Some(true_probability);
                view.min_edge = Some(min_edge);
            }
            EntryPolicy::DynamicEdge {
                min_wait_minutes,
                min_edge,
            } => {
                view.min_wait_minutes = Some(min_wait_minutes);
                view.min_edge = Some(min_edge);
            }
            EntryPolicy::Sentiment {
                odds_threshold,
                min_wait_minutes,
            } => {
                view.odds_threshold = Some(odds_threshold);
                view.min_wait_minutes = Some(min_wait_minutes);
            }
        }
        view
    }
}

/// Per-strategy stats and histories for external consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub series: String,
    pub name: String,
    pub description: String,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    /// Percentage, 0 when no trades yet
    pub win_rate: f64,
    pub bankroll: f64,
    pub profit: f64,
    /// Percentage of the initial bankroll
    pub roi: f64,
    pub total_wagered: f64,
    pub total_fees: f64,
    pub current_streak: i32,
    pub max_win_streak: u32,
    pub max_loss_streak: u32,
    pub pending: bool,
    pub trade_history: Vec<SettledTrade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_trade: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_skip_reason: Option<String>,
    pub config: DescriptorView,
}

impl StrategySnapshot {
    pub fn build(descriptor: &StrategyDescriptor, state: &StrategyState) -> Self {
        let trades = state.total_trades();
        let win_rate = if trades > 0 {
            f64::from(state.wins) / f64::from(trades) * 100.0
        } else {
            0.0
        };
        Self {
            series: descriptor.policy.series().to_string(),
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            trades,
            wins: state.wins,
            losses: state.losses,
            win_rate,
            bankroll: state.bankroll,
            profit: state.profit(),
            roi: state.profit() / state.initial_bankroll * 100.0,
            total_wagered: state.total_wagered,
            total_fees: state.total_fees,
            current_streak: state.current_streak,
            max_win_streak: state.max_win_streak,
            max_loss_streak: state.max_loss_streak,
            pending: state.pending.is_some(),
            trade_history: state.trades.clone(),
            pending_trade: state.pending.clone(),
            last_skip_reason: state.last_skip_reason.clone(),
            config: DescriptorView::from_descriptor(descriptor),
        }
    }
}

/// Aggregate run metadata plus every strategy's snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Monotonic snapshot version, bumped on every publish
    pub version: u64,
    pub platform: String,
    /// Millis of the snapshot
    pub last_update: i64,
    pub windows_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_window: Option<String>,
    pub runtime_seconds: f64,
    pub tick_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<Tick>,
    pub strategies: HashMap<String, StrategySnapshot>,
}

impl EngineSnapshot {
    /// Fleet-wide totals for the status log line.
    pub fn totals(&self) -> FleetTotals {
        let mut totals = FleetTotals::default();
        for snapshot in self.strategies.values() {
            totals.trades += snapshot.trades;
            totals.wins += snapshot.wins;
            totals.profit += snapshot.profit;
            if snapshot.pending {
                totals.pending += 1;
            }
        }
        totals
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FleetTotals {
    pub trades: u32,
    pub wins: u32,
    pub profit: f64,
    pub pending: usize,
}

impl FleetTotals {
    pub fn win_rate(&self) -> f64 {
        if self.trades > 0 {
            f64::from(self.wins) / f64::from(self.trades) * 100.0
        } else {
            0.0
        }
    }
}
