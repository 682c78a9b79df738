//! Decision engine
//!
//! One evaluation capability shared by the three policy families: given a
//! stamped tick and a strategy's current state, either produce entry terms
//! or a skip reason. Evaluation never mutates ledger state; the engine
//! records the skip reason and hands accepted entries to the ledger.
//!
//! The 15-minute window runs on a 14-minute countdown convention: elapsed
//! minute = 14 - mins_left.

use crate::catalog::{persistence_rate, EntryPolicy, StrategyDescriptor};
use crate::engine::ledger::StrategyState;
use crate::types::{Direction, Tick};

/// Countdown value at window open.
pub const WINDOW_MINUTES: f64 = 14.0;

/// Result of evaluating one strategy against one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Enter(EntrySignal),
    Skip(String),
}

/// Accepted entry terms, consumed by `StrategyState::execute`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub direction: Direction,
    /// Entry ask in cents
    pub price: u32,
    /// Edge vs true probability; `None` for policies that do not compute one
    pub edge: Option<f64>,
}

/// Evaluate a strategy's entry policy against a tick.
///
/// Shared preconditions run first, in order, short-circuiting: an existing
/// pending position, then the one-trade-per-window guard. Everything after
/// that is per-policy.
pub fn evaluate(state: &StrategyState, descriptor: &StrategyDescriptor, tick: &Tick) -> Evaluation {
    if state.pending.is_some() {
        return Evaluation::Skip("Already has pending trade".to_string());
    }
    if state.traded_windows.contains(&tick.window_id) {
        return Evaluation::Skip("Already traded this window".to_string());
    }

    match descriptor.policy {
        EntryPolicy::FixedMinute {
            target_minute,
            true_probability,
            min_edge,
            max_price_cents,
        } => evaluate_fixed_minute(tick, target_minute, true_probability, min_edge, max_price_cents),
        EntryPolicy::DynamicEdge {
            min_wait_minutes,
            min_edge,
        } => evaluate_dynamic_edge(tick, min_wait_minutes, min_edge),
        EntryPolicy::Sentiment {
            odds_threshold,
            min_wait_minutes,
        } => evaluate_sentiment(tick, odds_threshold, min_wait_minutes),
    }
}

/// Elapsed whole minutes under the 14-minute countdown convention.
fn current_minute(mins_left: f64) -> i64 {
    (WINDOW_MINUTES - mins_left) as i64
}

/// Direction/price selection shared by the strike-side policies, with the
/// no-liquidity and fully-resolved guards.
fn favored_entry(tick: &Tick) -> Result<(Direction, u32), String> {
    let (direction, price) = tick.favored_side();
    if price == 0 {
        return Err(format!("No market price available ({direction} ask = 0)"));
    }
    if price >= 100 {
        return Err(format!("Price too high ({direction} @ {price}c = 100%)"));
    }
    Ok((direction, price))
}

fn evaluate_fixed_minute(
    tick: &Tick,
    target_minute: u32,
    true_probability: f64,
    min_edge: f64,
    max_price_cents: u32,
) -> Evaluation {
    let target_mins_left = WINDOW_MINUTES - f64::from(target_minute);
    if !(target_mins_left - 0.5..=target_mins_left + 0.5).contains(&tick.mins_left) {
        return Evaluation::Skip(format!(
            "Waiting for minute {target_minute} (currently min {})",
            current_minute(tick.mins_left)
        ));
    }

    let (direction, price) = match favored_entry(tick) {
        Ok(entry) => entry,
        Err(reason) => return Evaluation::Skip(reason),
    };

    let edge = true_probability - f64::from(price) / 100.0;
    if edge < min_edge {
        return Evaluation::Skip(format!(
            "Edge too low ({:.1}% < {:.1}% min)",
            edge * 100.0,
            min_edge * 100.0
        ));
    }
    if price > max_price_cents {
        return Evaluation::Skip(format!(
            "Price exceeds max ({price}c > {max_price_cents}c)"
        ));
    }

    Evaluation::Enter(EntrySignal {
        direction,
        price,
        edge: Some(edge),
    })
}

fn evaluate_dynamic_edge(tick: &Tick, min_wait_minutes: u32, min_edge: f64) -> Evaluation {
    let minute = current_minute(tick.mins_left);

    if tick.mins_left > WINDOW_MINUTES - f64::from(min_wait_minutes) {
        return Evaluation::Skip(format!(
            "Waiting {min_wait_minutes} min before entry (currently min {minute})"
        ));
    }
    if tick.mins_left < 1.0 {
        return Evaluation::Skip("Window ending (<1 min left)".to_string());
    }
    if !(1..=13).contains(&minute) {
        return Evaluation::Skip(format!("Invalid minute ({minute})"));
    }

    let true_probability = match persistence_rate(minute as u32) {
        Some(rate) => rate,
        None => {
            return Evaluation::Skip(format!("No persistence data for minute {minute}"));
        }
    };

    let (direction, price) = match favored_entry(tick) {
        Ok(entry) => entry,
        Err(reason) => return Evaluation::Skip(reason),
    };

    let edge = true_probability - f64::from(price) / 100.0;
    if edge < min_edge {
        return Evaluation::Skip(format!(
            "Edge {:.1}% < {:.1}% threshold",
            edge * 100.0,
            min_edge * 100.0
        ));
    }

    Evaluation::Enter(EntrySignal {
        direction,
        price,
        edge: Some(edge),
    })
}

fn evaluate_sentiment(tick: &Tick, odds_threshold: u32, min_wait_minutes: u32) -> Evaluation {
    let minute = current_minute(tick.mins_left);

    if tick.mins_left > WINDOW_MINUTES - f64::from(min_wait_minutes) {
        return Evaluation::Skip(format!(
            "Waiting {min_wait_minutes} min (currently min {minute})"
        ));
    }
    if tick.mins_left < 0.5 {
        return Evaluation::Skip("Window ending (<30 sec left)".to_string());
    }

    let (up, down) = (tick.up_ask, tick.down_ask);
    if up == 0 || down == 0 {
        return Evaluation::Skip(format!("No market prices (UP={up}c, DOWN={down}c)"));
    }

    // Checks UP first, then DOWN; the favorite is whichever clears the bar.
    let (direction, price) = if up >= odds_threshold {
        (Direction::Up, up)
    } else if down >= odds_threshold {
        (Direction::Down, down)
    } else {
        return Evaluation::Skip(format!(
            "No strong sentiment (UP={up}c, DOWN={down}c < {odds_threshold}c threshold)"
        ));
    };

    if price >= 100 {
        return Evaluation::Skip(format!("Price at 100% ({direction} @ {price}c)"));
    }

    Evaluation::Enter(EntrySignal {
        direction,
        price,
        edge: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BetSizing, StrategyDescriptor, STARTING_BANKROLL};
    use crate::types::Position;

    fn tick(price: f64, strike: f64, mins_left: f64, up_ask: u32, down_ask: u32) -> Tick {
        Tick {
            ts: 0,
            window_id: "btc-updown-15m-1733155200".to_string(),
            market_id: None,
            asset_price: price,
            strike_price: strike,
            mins_left,
            up_ask,
            up_bid: up_ask.saturating_sub(2),
            down_ask,
            down_bid: down_ask.saturating_sub(2),
        }
    }

    fn descriptor(policy: EntryPolicy) -> StrategyDescriptor {
        StrategyDescriptor {
            id: "test".to_string(),
            name: "test".to_string(),
            description: String::new(),
            policy,
            sizing: BetSizing::Flat { bet_size: 10.0 },
            starting_bankroll: STARTING_BANKROLL,
        }
    }

    fn fixed_minute_5() -> StrategyDescriptor {
        descriptor(EntryPolicy::FixedMinute {
            target_minute: 5,
            true_probability: 0.804,
            min_edge: 0.03,
            max_price_cents: 76,
        })
    }

    fn state(descriptor: &StrategyDescriptor) -> StrategyState {
        StrategyState::new(descriptor)
    }

    fn dummy_position(window_id: &str) -> Position {
        Position {
            id: "p".to_string(),
            entered_at: 0,
            window_id: window_id.to_string(),
            market_id: None,
            strike: 0.0,
            asset_price: 0.0,
            mins_left: 9.0,
            direction: Direction::Up,
            entry_price: 60,
            contracts: 16,
            bet_size: 10.0,
            fee: 0.1,
            edge: None,
        }
    }

    #[test]
    fn pending_position_blocks_all_policies() {
        let d = fixed_minute_5();
        let mut s = state(&d);
        s.pending = Some(dummy_position("other-window"));

        let t = tick(95_100.0, 95_000.0, 9.0, 60, 40);
        assert_eq!(
            evaluate(&s, &d, &t),
            Evaluation::Skip("Already has pending trade".to_string())
        );
    }

    #[test]
    fn traded_window_blocks_reentry() {
        let d = fixed_minute_5();
        let mut s = state(&d);
        let t = tick(95_100.0, 95_000.0, 9.0, 60, 40);
        s.traded_windows.insert(t.window_id.clone());

        assert_eq!(
            evaluate(&s, &d, &t),
            Evaluation::Skip("Already traded this window".to_string())
        );
    }

    #[test]
    fn fixed_minute_reference_entry() {
        // Minute-5 bot, tick at 9.0 mins left, UP @ 60c, spot above strike:
        // edge = 0.804 - 0.60 = 0.204 >= 0.03 -> enter.
        let d = fixed_minute_5();
        let s = state(&d);
        let t = tick(95_100.0, 95_000.0, 9.0, 60, 40);

        match evaluate(&s, &d, &t) {
            Evaluation::Enter(signal) => {
                assert_eq!(signal.direction, Direction::Up);
                assert_eq!(signal.price, 60);
                let edge = signal.edge.unwrap();
                assert!((edge - 0.204).abs() < 1e-9);
            }
            Evaluation::Skip(reason) => panic!("expected entry, skipped: {reason}"),
        }
    }

    #[test]
    fn fixed_minute_outside_entry_window_waits() {
        let d = fixed_minute_5();
        let s = state(&d);
        // mins_left 11.0 -> minute 3, outside [8.5, 9.5]
        let t = tick(95_100.0, 95_000.0, 11.0, 60, 40);
        match evaluate(&s, &d, &t) {
            Evaluation::Skip(reason) => assert!(reason.starts_with("Waiting for minute 5")),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn fixed_minute_entry_window_is_half_minute_inclusive() {
        let d = fixed_minute_5();
        let s = state(&d);
        for mins_left in [8.5, 9.0, 9.5] {
            let t = tick(95_100.0, 95_000.0, mins_left, 60, 40);
            assert!(
                matches!(evaluate(&s, &d, &t), Evaluation::Enter(_)),
                "should enter at mins_left={mins_left}"
            );
        }
        for mins_left in [8.49, 9.51] {
            let t = tick(95_100.0, 95_000.0, mins_left, 60, 40);
            assert!(
                matches!(evaluate(&s, &d, &t), Evaluation::Skip(_)),
                "should skip at mins_left={mins_left}"
            );
        }
    }

    #[test]
    fn fixed_minute_rejects_thin_edge_and_capped_price() {
        let d = fixed_minute_5();
        let s = state(&d);

        // 79c -> edge 0.014 < 0.03
        let t = tick(95_100.0, 95_000.0, 9.0, 79, 20);
        match evaluate(&s, &d, &t) {
            Evaluation::Skip(reason) => assert!(reason.starts_with("Edge too low")),
            other => panic!("expected skip, got {other:?}"),
        }

        // 77c -> edge 0.034 passes, but price cap is 76c
        let t = tick(95_100.0, 95_000.0, 9.0, 77, 20);
        match evaluate(&s, &d, &t) {
            Evaluation::Skip(reason) => assert!(reason.starts_with("Price exceeds max")),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn fixed_minute_rejects_empty_and_resolved_books() {
        let d = fixed_minute_5();
        let s = state(&d);

        let t = tick(95_100.0, 95_000.0, 9.0, 0, 40);
        assert!(matches!(evaluate(&s, &d, &t), Evaluation::Skip(r) if r.contains("ask = 0")));

        let t = tick(95_100.0, 95_000.0, 9.0, 100, 40);
        assert!(matches!(evaluate(&s, &d, &t), Evaluation::Skip(r) if r.contains("Price too high")));
    }

    #[test]
    fn dynamic_edge_waits_out_min_wait() {
        // min_wait=3: at 12.0 mins left only 2 whole minutes have elapsed.
        let d = descriptor(EntryPolicy::DynamicEdge {
            min_wait_minutes: 3,
            min_edge: 0.05,
        });
        let s = state(&d);
        let t = tick(95_100.0, 95_000.0, 12.0, 40, 60);
        match evaluate(&s, &d, &t) {
            Evaluation::Skip(reason) => {
                assert!(reason.starts_with("Waiting 3 min"), "got: {reason}")
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn dynamic_edge_enters_on_table_edge() {
        let d = descriptor(EntryPolicy::DynamicEdge {
            min_wait_minutes: 3,
            min_edge: 0.05,
        });
        let s = state(&d);
        // mins_left 9.0 -> minute 5, rate 0.804; DOWN side @ 55c -> edge 0.254
        let t = tick(94_900.0, 95_000.0, 9.0, 45, 55);
        match evaluate(&s, &d, &t) {
            Evaluation::Enter(signal) => {
                assert_eq!(signal.direction, Direction::Down);
                assert_eq!(signal.price, 55);
                assert!((signal.edge.unwrap() - 0.254).abs() < 1e-9);
            }
            Evaluation::Skip(reason) => panic!("expected entry, skipped: {reason}"),
        }
    }

    #[test]
    fn dynamic_edge_refuses_closing_minute() {
        let d = descriptor(EntryPolicy::DynamicEdge {
            min_wait_minutes: 2,
            min_edge: 0.05,
        });
        let s = state(&d);
        let t = tick(95_100.0, 95_000.0, 0.8, 95, 5);
        assert_eq!(
            evaluate(&s, &d, &t),
            Evaluation::Skip("Window ending (<1 min left)".to_string())
        );
    }

    #[test]
    fn dynamic_edge_rejects_below_threshold() {
        let d = descriptor(EntryPolicy::DynamicEdge {
            min_wait_minutes: 3,
            min_edge: 0.40,
        });
        let s = state(&d);
        // minute 5 @ 60c -> edge 0.204 < 0.40
        let t = tick(95_100.0, 95_000.0, 9.0, 60, 40);
        assert!(matches!(evaluate(&s, &d, &t), Evaluation::Skip(r) if r.contains("threshold")));
    }

    #[test]
    fn sentiment_backs_the_favorite() {
        // Threshold 70c, UP ask 72c, DOWN ask 30c -> enter UP @ 72, no edge.
        let d = descriptor(EntryPolicy::Sentiment {
            odds_threshold: 70,
            min_wait_minutes: 0,
        });
        let s = state(&d);
        let t = tick(95_100.0, 95_000.0, 7.0, 72, 30);
        assert_eq!(
            evaluate(&s, &d, &t),
            Evaluation::Enter(EntrySignal {
                direction: Direction::Up,
                price: 72,
                edge: None,
            })
        );
    }

    #[test]
    fn sentiment_falls_through_to_down_side() {
        let d = descriptor(EntryPolicy::Sentiment {
            odds_threshold: 70,
            min_wait_minutes: 0,
        });
        let s = state(&d);
        let t = tick(94_900.0, 95_000.0, 7.0, 25, 78);
        assert_eq!(
            evaluate(&s, &d, &t),
            Evaluation::Enter(EntrySignal {
                direction: Direction::Down,
                price: 78,
                edge: None,
            })
        );
    }

    #[test]
    fn sentiment_needs_both_quotes_and_conviction() {
        let d = descriptor(EntryPolicy::Sentiment {
            odds_threshold: 70,
            min_wait_minutes: 0,
        });
        let s = state(&d);

        let t = tick(95_100.0, 95_000.0, 7.0, 72, 0);
        assert!(matches!(evaluate(&s, &d, &t), Evaluation::Skip(r) if r.contains("No market prices")));

        let t = tick(95_100.0, 95_000.0, 7.0, 55, 45);
        assert!(matches!(evaluate(&s, &d, &t), Evaluation::Skip(r) if r.contains("No strong sentiment")));

        // Last 30 seconds are off limits.
        let t = tick(95_100.0, 95_000.0, 0.4, 90, 10);
        assert_eq!(
            evaluate(&s, &d, &t),
            Evaluation::Skip("Window ending (<30 sec left)".to_string())
        );
    }

    #[test]
    fn sentiment_rejects_fully_resolved_price() {
        let d = descriptor(EntryPolicy::Sentiment {
            odds_threshold: 70,
            min_wait_minutes: 0,
        });
        let s = state(&d);
        let t = tick(95_100.0, 95_000.0, 7.0, 100, 1);
        assert!(matches!(evaluate(&s, &d, &t), Evaluation::Skip(r) if r.contains("100%")));
    }
}
