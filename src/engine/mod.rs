//! Tick-driven evaluation and settlement engine
//!
//! One tick is ingested at a time. For that tick, every strategy in catalog
//! order is evaluated and (if accepted) executed, then the settlement
//! resolver runs - all before the next tick. Strategies own their state
//! exclusively; the strike map and settled set are the only shared records.

pub mod decision;
pub mod fees;
pub mod ledger;
pub mod settlement;
pub mod snapshot;
pub mod window;

pub use decision::{evaluate, EntrySignal, Evaluation};
pub use ledger::StrategyState;
pub use settlement::SettlementResolver;
pub use snapshot::{EngineSnapshot, StrategySnapshot};
pub use window::WindowTracker;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::StrategyDescriptor;
use crate::types::{now_millis, Direction, SettledTrade, Tick};

/// Tick-level failures. Nothing here is fatal to the run; an invalid tick
/// is discarded without advancing any strategy state.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("invalid tick: minutes-remaining is not a finite number")]
    InvalidTick,
    #[error("unknown strategy id {0} in persisted state")]
    UnknownStrategy(String),
}

/// What one tick did to the fleet.
#[derive(Debug, Default)]
pub struct TickReport {
    pub new_window: bool,
    /// Strategy ids that opened a position on this tick
    pub entered: Vec<String>,
    /// Settlements triggered by this tick
    pub settled: Vec<(String, SettledTrade)>,
    /// Window outcome when this tick closed one
    pub outcome: Option<Direction>,
}

/// Serializable engine state for restart recovery. Pending positions are
/// carried over un-settled; they resume waiting for their window to close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub saved_at: i64,
    pub tick_count: u64,
    pub window_strikes: HashMap<String, f64>,
    pub settled_windows: Vec<String>,
    pub strategies: HashMap<String, StrategyState>,
}

pub struct Engine {
    descriptors: Vec<StrategyDescriptor>,
    states: HashMap<String, StrategyState>,
    tracker: WindowTracker,
    resolver: SettlementResolver,
    fee_rate: f64,
    tick_count: u64,
    last_tick: Option<Tick>,
    started: Instant,
}

impl Engine {
    pub fn new(descriptors: Vec<StrategyDescriptor>, fee_rate: f64) -> Self {
        let states = descriptors
            .iter()
            .map(|d| (d.id.clone(), StrategyState::new(d)))
            .collect();
        Self {
            descriptors,
            states,
            tracker: WindowTracker::new(),
            resolver: SettlementResolver::new(),
            fee_rate,
            tick_count: 0,
            last_tick: None,
            started: Instant::now(),
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn state(&self, strategy_id: &str) -> Option<&StrategyState> {
        self.states.get(strategy_id)
    }

    /// Ingest one tick: stamp the strike, run every strategy's entry
    /// policy, execute accepted entries, then check for settlement.
    pub fn process_tick(&mut self, mut tick: Tick) -> Result<TickReport, TickError> {
        if !tick.is_valid() {
            return Err(TickError::InvalidTick);
        }

        let mut report = TickReport {
            new_window: self.tracker.stamp(&mut tick),
            ..Default::default()
        };
        self.tick_count += 1;

        for descriptor in &self.descriptors {
            let state = self
                .states
                .get_mut(&descriptor.id)
                .expect("state exists for every descriptor");

            match evaluate(state, descriptor, &tick) {
                Evaluation::Enter(signal) => {
                    // Execute immediately: nothing else touches this
                    // strategy between the decision and the fill.
                    let position = state.execute(descriptor, &tick, &signal, self.fee_rate);
                    info!(
                        strategy = %descriptor.id,
                        direction = %position.direction,
                        price = position.entry_price,
                        contracts = position.contracts,
                        bet = %format!("${:.2}", position.bet_size),
                        "📈 TRADE"
                    );
                    report.entered.push(descriptor.id.clone());
                }
                Evaluation::Skip(reason) => {
                    debug!(strategy = %descriptor.id, %reason, "skip");
                    state.last_skip_reason = Some(reason);
                }
            }
        }

        if let Some(outcome) = self.resolver.resolve(&tick) {
            if !self.resolver.is_settled(&tick.window_id) {
                report.settled =
                    self.resolver
                        .settle_window(&tick.window_id, outcome, self.states.values_mut());
                report.outcome = Some(outcome);
            }
        }

        self.last_tick = Some(tick);
        Ok(report)
    }

    /// Derive the full read-only snapshot. Pure: engine state is untouched;
    /// the caller supplies the publish version.
    pub fn snapshot(&self, version: u64) -> EngineSnapshot {
        let strategies = self
            .descriptors
            .iter()
            .map(|d| {
                let state = &self.states[&d.id];
                (d.id.clone(), StrategySnapshot::build(d, state))
            })
            .collect();

        EngineSnapshot {
            version,
            platform: "polymarket".to_string(),
            last_update: now_millis(),
            windows_processed: self.resolver.settled_count(),
            current_window: self.tracker.current_window().map(str::to_string),
            runtime_seconds: self.started.elapsed().as_secs_f64(),
            tick_count: self.tick_count,
            market: self.last_tick.clone(),
            strategies,
        }
    }

    /// Export state for the restart-recovery file.
    pub fn export_state(&self) -> PersistedState {
        PersistedState {
            saved_at: now_millis(),
            tick_count: self.tick_count,
            window_strikes: self
                .tracker
                .strikes()
                .map(|(id, strike)| (id.clone(), strike))
                .collect(),
            settled_windows: self.resolver.settled_windows().cloned().collect(),
            strategies: self.states.clone(),
        }
    }

    /// Restore from a previously exported state. Strategies present in the
    /// file but absent from the catalog are rejected - a changed catalog
    /// must fail fast rather than silently drop history.
    pub fn restore(&mut self, persisted: PersistedState) -> Result<(), TickError> {
        for id in persisted.strategies.keys() {
            if !self.states.contains_key(id) {
                return Err(TickError::UnknownStrategy(id.clone()));
            }
        }

        self.tick_count = persisted.tick_count;
        for (window_id, strike) in persisted.window_strikes {
            self.tracker.restore(window_id, strike);
        }
        self.resolver.restore(persisted.settled_windows);
        for (id, state) in persisted.strategies {
            self.states.insert(id, state);
        }
        info!(
            strategies = self.states.len(),
            ticks = self.tick_count,
            "💾 Engine state restored"
        );
        Ok(())
    }
}
