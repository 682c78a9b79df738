//! Window tracker
//!
//! The Gamma API does not expose a window's opening price, so the first
//! spot price we observe for a new window id becomes its strike and stays
//! fixed for the window's lifetime. Strike records are never evicted -
//! bounded by the number of distinct windows seen in a run.

use std::collections::HashMap;

use tracing::info;

use crate::types::Tick;

#[derive(Debug, Default)]
pub struct WindowTracker {
    strikes: HashMap<String, f64>,
    current_window: Option<String>,
}

impl WindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the tick with its window's strike, establishing it from the
    /// tick's own spot price if this window id is new. Returns `true` when
    /// a new window was opened by this tick.
    pub fn stamp(&mut self, tick: &mut Tick) -> bool {
        let is_new = !self.strikes.contains_key(&tick.window_id);
        if is_new {
            self.strikes.insert(tick.window_id.clone(), tick.asset_price);
            self.current_window = Some(tick.window_id.clone());
            info!(
                window = %tick.window_id,
                strike = %format!("${:.2}", tick.asset_price),
                "🪟 New window opened"
            );
        }

        // The stored strike always wins over whatever the feed embedded.
        tick.strike_price = self.strikes[&tick.window_id];
        is_new
    }

    pub fn strike(&self, window_id: &str) -> Option<f64> {
        self.strikes.get(window_id).copied()
    }

    pub fn current_window(&self) -> Option<&str> {
        self.current_window.as_deref()
    }

    pub fn windows_seen(&self) -> usize {
        self.strikes.len()
    }

    /// All known (window id, strike) records.
    pub fn strikes(&self) -> impl Iterator<Item = (&String, f64)> {
        self.strikes.iter().map(|(id, strike)| (id, *strike))
    }

    /// Restore a strike record from persisted state.
    pub fn restore(&mut self, window_id: String, strike: f64) {
        self.strikes.insert(window_id, strike);
    }
}
