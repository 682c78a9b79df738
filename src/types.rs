//! Core types used throughout PolyFleet
//!
//! Defines common data structures for market ticks, positions and settled trades.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading direction - which side of the strike a position backs.
///
/// Also serves as the settlement outcome of a window: `Up` means the asset
/// finished above its strike, `Down` means at or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Settlement rule: `Up` only on a strictly higher close.
    /// Exact equality with the strike settles `Down` - this matches the
    /// reference settlement behavior and must not be "corrected".
    pub fn from_settlement(final_price: f64, strike: f64) -> Self {
        if final_price > strike {
            Direction::Up
        } else {
            Direction::Down
        }
    }

}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// One observation of the live market.
///
/// Produced by the tick source with `strike_price = 0.0`; the engine's
/// window tracker stamps the real strike before any strategy sees it.
/// Ask/bid quotes are integer price-cents (0-100), 0 meaning unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    /// Local receive timestamp in milliseconds
    pub ts: i64,
    /// Opaque window identifier (market slug, e.g. "btc-updown-15m-1733155200")
    pub window_id: String,
    /// Gamma market id, if known
    #[serde(default)]
    pub market_id: Option<String>,
    /// Current BTC spot price
    pub asset_price: f64,
    /// Opening price of the window; 0.0 until the tracker establishes it
    pub strike_price: f64,
    /// Minutes remaining in the window (fractional, decreasing)
    pub mins_left: f64,
    /// Best ask for the UP side in cents
    pub up_ask: u32,
    /// Best bid for the UP side in cents
    pub up_bid: u32,
    /// Best ask for the DOWN side in cents
    pub down_ask: u32,
    /// Best bid for the DOWN side in cents
    pub down_bid: u32,
}

impl Tick {
    /// The side currently favored by spot vs strike, with its ask.
    /// Equality with the strike favors DOWN, mirroring the settlement rule.
    pub fn favored_side(&self) -> (Direction, u32) {
        if self.asset_price > self.strike_price {
            (Direction::Up, self.up_ask)
        } else {
            (Direction::Down, self.down_ask)
        }
    }

    /// A tick is usable only if its countdown parsed to a finite value.
    pub fn is_valid(&self) -> bool {
        self.mins_left.is_finite()
    }
}

/// An open, unsettled simulated bet awaiting window close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    /// Entry timestamp in milliseconds
    pub entered_at: i64,
    pub window_id: String,
    #[serde(default)]
    pub market_id: Option<String>,
    /// Window strike at entry
    pub strike: f64,
    /// Spot price at entry
    pub asset_price: f64,
    /// Minutes remaining at entry
    pub mins_left: f64,
    pub direction: Direction,
    /// Entry price in cents
    pub entry_price: u32,
    /// Number of contracts bought (each pays $1 on a win)
    pub contracts: u64,
    /// Dollars wagered
    pub bet_size: f64,
    /// Entry fee in dollars
    pub fee: f64,
    /// Edge at entry, when the policy computed one
    #[serde(default)]
    pub edge: Option<f64>,
}

/// Win/loss classification of a settled trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "WIN"),
            TradeOutcome::Loss => write!(f, "LOSS"),
        }
    }
}

/// A settled position, immutable once appended to a strategy's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledTrade {
    #[serde(flatten)]
    pub position: Position,
    pub outcome: TradeOutcome,
    /// Realized profit in dollars (negative on a loss)
    pub profit: f64,
    /// Bankroll after this trade settled
    pub bankroll_after: f64,
    /// Settlement timestamp in milliseconds
    pub settled_at: i64,
}

impl SettledTrade {
    pub fn won(&self) -> bool {
        self.outcome == TradeOutcome::Win
    }
}

/// Current wall-clock in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
