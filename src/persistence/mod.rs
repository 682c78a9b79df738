//! Persistence
//!
//! Three concerns, all best-effort except the state file read:
//! - newline-delimited JSON tick log, one record per ingested tick
//! - CSV log of settled trades for offline analysis
//! - engine state file for restart recovery
//!
//! Tick-log and CSV write failures are logged and ignored; they must never
//! stall or kill the tick loop.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::engine::PersistedState;
use crate::types::{SettledTrade, Tick};

// ─────────────────────────────────────────────────────────────────
// Tick log (JSONL)
// ─────────────────────────────────────────────────────────────────

/// Appends every ingested tick to a JSONL file for later analysis.
pub struct TickLogger {
    path: PathBuf,
    tick_count: u64,
}

impl TickLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tick_count: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Append one tick. Failures are swallowed after a warning.
    pub fn log(&mut self, tick: &Tick) {
        self.tick_count += 1;
        if let Err(e) = self.try_append(tick) {
            warn!(path = %self.path.display(), error = %e, "tick log write failed");
        }
    }

    fn try_append(&self, tick: &Tick) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(tick)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Settled-trade CSV
// ─────────────────────────────────────────────────────────────────

/// One CSV row per settled trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCsvRecord {
    pub settled_at: i64,
    pub strategy_id: String,
    pub window_id: String,
    pub direction: String,
    pub entry_price_cents: u32,
    pub contracts: u64,
    pub bet_size: f64,
    pub fee: f64,
    pub edge: Option<f64>,
    pub outcome: String,
    pub profit: f64,
    pub bankroll_after: f64,
}

impl TradeCsvRecord {
    pub fn from_settled(strategy_id: &str, trade: &SettledTrade) -> Self {
        Self {
            settled_at: trade.settled_at,
            strategy_id: strategy_id.to_string(),
            window_id: trade.position.window_id.clone(),
            direction: trade.position.direction.to_string(),
            entry_price_cents: trade.position.entry_price,
            contracts: trade.position.contracts,
            bet_size: trade.position.bet_size,
            fee: trade.position.fee,
            edge: trade.position.edge,
            outcome: trade.outcome.to_string(),
            profit: trade.profit,
            bankroll_after: trade.bankroll_after,
        }
    }
}

/// Append-only CSV writer for settled trades.
pub struct TradeLog {
    path: PathBuf,
}

impl TradeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append settled trades. Best-effort: errors are warned and dropped.
    pub fn append(&self, rows: &[TradeCsvRecord]) {
        if rows.is_empty() {
            return;
        }
        if let Err(e) = self.try_append(rows) {
            warn!(path = %self.path.display(), error = %e, "trade CSV write failed");
        }
    }

    fn try_append(&self, rows: &[TradeCsvRecord]) -> Result<()> {
        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(write_header).from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// State file
// ─────────────────────────────────────────────────────────────────

/// JSON state file for restart recovery.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist engine state. Unlike the logs this reports failure - the
    /// caller decides whether a missed save matters.
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, json)
            .with_context(|| format!("write state file {}", self.path.display()))?;
        info!(path = %self.path.display(), "💾 State saved");
        Ok(())
    }

    /// Load persisted state, `None` when starting fresh.
    pub fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "💾 No state file found, starting fresh");
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("read state file {}", self.path.display()))?;
        let state: PersistedState = serde_json::from_str(&json)
            .with_context(|| format!("parse state file {}", self.path.display()))?;
        Ok(Some(state))
    }
}
