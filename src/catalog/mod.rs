//! Strategy catalog
//!
//! All paper-trading strategy descriptors, generated by combinatorial
//! expansion of a small set of knobs at startup:
//!
//! - Series 1: fixed-minute (13) - each bets at exactly one elapsed minute
//! - Series 2: dynamic-edge (34) - wait X minutes, enter when edge >= threshold,
//!   plus two edge-scaled bet-size variants
//! - Series 3: sentiment (64) - bet with the crowd once a side's ask clears a
//!   threshold
//!
//! Descriptors are parameters only, no behavior, and are never mutated after
//! `build_catalog` returns.

pub mod persistence;

pub use persistence::{edge_at, mins_left_at, persistence_rate};

use anyhow::{bail, Result};
use serde::Serialize;

/// Default starting bankroll for every strategy, in dollars.
pub const STARTING_BANKROLL: f64 = 1000.0;

/// Default flat bet, in dollars.
pub const FLAT_BET: f64 = 10.0;

/// Entry-decision policy variant. Closed set: one case per series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryPolicy {
    /// Bets only inside a one-minute window around a single target minute,
    /// against a fixed true probability for that minute.
    FixedMinute {
        target_minute: u32,
        true_probability: f64,
        min_edge: f64,
        /// Price cap in cents, precomputed at build time as 95% of the
        /// true probability expressed in cents.
        max_price_cents: u32,
    },
    /// Waits a minimum number of minutes, then enters whenever the live
    /// edge against the persistence table clears the threshold.
    DynamicEdge { min_wait_minutes: u32, min_edge: f64 },
    /// Follows the market: backs whichever side's ask has reached the
    /// odds threshold. Never computes an edge.
    Sentiment {
        odds_threshold: u32,
        min_wait_minutes: u32,
    },
}

impl EntryPolicy {
    /// Series label used in ids, logs and the snapshot.
    pub fn series(&self) -> &'static str {
        match self {
            EntryPolicy::FixedMinute { .. } => "fixed_minute",
            EntryPolicy::DynamicEdge { .. } => "dynamic_edge",
            EntryPolicy::Sentiment { .. } => "sentiment",
        }
    }
}

/// How a strategy sizes its bets at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetSizing {
    /// Always the same dollar amount.
    Flat { bet_size: f64 },
    /// Linear ramp on edge: base at 10% edge, max at 30%+, clamped.
    EdgeScaled { base: f64, max: f64 },
}

impl BetSizing {
    /// Dollar bet for a given entry edge. Flat sizing and edge-less entries
    /// ignore the edge entirely.
    pub fn bet_for_edge(&self, edge: Option<f64>) -> f64 {
        match (*self, edge) {
            (BetSizing::Flat { bet_size }, _) => bet_size,
            (BetSizing::EdgeScaled { base, .. }, None) => base,
            (BetSizing::EdgeScaled { base, max }, Some(edge)) => {
                let scale = ((edge - 0.10) / 0.20).clamp(0.0, 1.0);
                base + scale * (max - base)
            }
        }
    }
}

/// Immutable strategy configuration. Created once at startup.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub policy: EntryPolicy,
    pub sizing: BetSizing,
    pub starting_bankroll: f64,
}

/// Build the full strategy catalog. Fails fast if the generated set is
/// internally inconsistent (duplicate ids), since a bad catalog must never
/// reach the tick loop.
pub fn build_catalog() -> Result<Vec<StrategyDescriptor>> {
    let mut catalog = Vec::with_capacity(128);

    catalog.extend(fixed_minute_series());
    catalog.extend(dynamic_edge_series());
    catalog.extend(sentiment_series());

    let mut seen = std::collections::HashSet::new();
    for descriptor in &catalog {
        if !seen.insert(descriptor.id.as_str()) {
            bail!("duplicate strategy id in catalog: {}", descriptor.id);
        }
    }

    Ok(catalog)
}

/// Series 1: one bot per elapsed minute 1-13, each armed with that minute's
/// persistence rate as its true probability.
fn fixed_minute_series() -> Vec<StrategyDescriptor> {
    (1..=13)
        .filter_map(|minute| {
            let rate = persistence_rate(minute)?;
            let left = mins_left_at(minute)?;
            Some(StrategyDescriptor {
                id: format!("s1_fixed_min_{minute}"),
                name: format!("Fixed Minute {minute}"),
                description: format!(
                    "Only bets at minute {minute} ({left} min left). Persistence: {:.1}%",
                    rate * 100.0
                ),
                policy: EntryPolicy::FixedMinute {
                    target_minute: minute,
                    true_probability: rate,
                    min_edge: 0.03,
                    max_price_cents: (rate * 100.0 * 0.95) as u32,
                },
                sizing: BetSizing::Flat { bet_size: FLAT_BET },
                starting_bankroll: STARTING_BANKROLL,
            })
        })
        .collect()
}

/// Series 2: wait-time x edge-threshold grid, plus two edge-scaled variants.
fn dynamic_edge_series() -> Vec<StrategyDescriptor> {
    let mut series = Vec::new();

    for wait in [2u32, 3, 4, 5] {
        for edge_pct in [5u32, 10, 12, 15, 20, 25, 30, 40] {
            series.push(StrategyDescriptor {
                id: format!("s2_dynamic_wait{wait}_edge{edge_pct}"),
                name: format!("Dynamic Wait {wait}m, Edge {edge_pct}%"),
                description: format!("Waits {wait} min, then enters when edge >= {edge_pct}%"),
                policy: EntryPolicy::DynamicEdge {
                    min_wait_minutes: wait,
                    min_edge: f64::from(edge_pct) / 100.0,
                },
                sizing: BetSizing::Flat { bet_size: FLAT_BET },
                starting_bankroll: STARTING_BANKROLL,
            });
        }
    }

    series.push(StrategyDescriptor {
        id: "s2_dynamic_scaled_wait3".to_string(),
        name: "Dynamic Scaled (Wait 3m)".to_string(),
        description: "Waits 3 min, scales bet size with edge (more edge = bigger bet)".to_string(),
        policy: EntryPolicy::DynamicEdge {
            min_wait_minutes: 3,
            min_edge: 0.05,
        },
        sizing: BetSizing::EdgeScaled {
            base: 10.0,
            max: 50.0,
        },
        starting_bankroll: STARTING_BANKROLL,
    });
    series.push(StrategyDescriptor {
        id: "s2_dynamic_scaled_wait5".to_string(),
        name: "Dynamic Scaled (Wait 5m)".to_string(),
        description: "Waits 5 min, scales bet size with edge".to_string(),
        policy: EntryPolicy::DynamicEdge {
            min_wait_minutes: 5,
            min_edge: 0.10,
        },
        sizing: BetSizing::EdgeScaled {
            base: 10.0,
            max: 50.0,
        },
        starting_bankroll: STARTING_BANKROLL,
    });

    series
}

/// Series 3: odds-threshold x wait-time grid, plus the always-favorite bot.
fn sentiment_series() -> Vec<StrategyDescriptor> {
    let mut series = Vec::new();

    for threshold in [55u32, 60, 65, 70, 75, 80, 85, 90, 95] {
        for wait in [0u32, 1, 2, 3, 5, 7, 10] {
            series.push(StrategyDescriptor {
                id: format!("s3_sentiment_odds{threshold}_wait{wait}"),
                name: format!("Sentiment {threshold}c (Wait {wait}m)"),
                description: format!(
                    "Bets WITH the favorite when UP/DOWN hits {threshold}c, after {wait} min"
                ),
                policy: EntryPolicy::Sentiment {
                    odds_threshold: threshold,
                    min_wait_minutes: wait,
                },
                sizing: BetSizing::Flat { bet_size: FLAT_BET },
                starting_bankroll: STARTING_BANKROLL,
            });
        }
    }

    series.push(StrategyDescriptor {
        id: "s3_sentiment_always_favorite".to_string(),
        name: "Always Favorite".to_string(),
        description: "Always bets the favored side regardless of time or odds".to_string(),
        policy: EntryPolicy::Sentiment {
            odds_threshold: 51,
            min_wait_minutes: 0,
        },
        sizing: BetSizing::Flat { bet_size: FLAT_BET },
        starting_bankroll: STARTING_BANKROLL,
    });

    series
}
