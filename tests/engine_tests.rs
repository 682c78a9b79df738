//! Integration tests: full window lifecycles through the engine, from the
//! first strike-setting tick to settlement, across the whole catalog.

use polyfleet::catalog::{build_catalog, BetSizing, EntryPolicy, StrategyDescriptor};
use polyfleet::engine::fees::DEFAULT_FEE_RATE;
use polyfleet::engine::{Engine, TickError};
use polyfleet::market::{MarketError, TickSource};
use polyfleet::types::{Direction, Tick};

fn tick(window_id: &str, price: f64, mins_left: f64, up_ask: u32, down_ask: u32) -> Tick {
    Tick {
        ts: 0,
        window_id: window_id.to_string(),
        market_id: Some("mkt".to_string()),
        asset_price: price,
        strike_price: 0.0,
        mins_left,
        up_ask,
        up_bid: up_ask.saturating_sub(2),
        down_ask,
        down_bid: down_ask.saturating_sub(2),
    }
}

fn descriptor(id: &str, policy: EntryPolicy) -> StrategyDescriptor {
    StrategyDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        policy,
        sizing: BetSizing::Flat { bet_size: 10.0 },
        starting_bankroll: 1000.0,
    }
}

#[test]
fn fixed_minute_scenario_enters_and_wins() {
    // Minute-5 bot (true probability 0.804, min edge 0.03). Tick at 9.0
    // minutes left with UP @ 60c and spot above strike: edge 0.204, enter.
    let minute5 = descriptor(
        "s1_fixed_min_5",
        EntryPolicy::FixedMinute {
            target_minute: 5,
            true_probability: 0.804,
            min_edge: 0.03,
            max_price_cents: 76,
        },
    );
    let mut engine = Engine::new(vec![minute5], DEFAULT_FEE_RATE);

    // Opening tick fixes the strike at 95,000; minute-5 bot is not due yet.
    let opened = engine
        .process_tick(tick("w1", 95_000.0, 14.0, 52, 48))
        .unwrap();
    assert!(opened.new_window);
    assert!(opened.entered.is_empty());

    // Minute 5: spot above strike, UP ask 60c.
    let entered = engine
        .process_tick(tick("w1", 95_150.0, 9.0, 60, 40))
        .unwrap();
    assert_eq!(entered.entered, vec!["s1_fixed_min_5".to_string()]);

    let pending = engine
        .state("s1_fixed_min_5")
        .unwrap()
        .pending
        .clone()
        .unwrap();
    assert_eq!(pending.direction, Direction::Up);
    assert_eq!(pending.entry_price, 60);
    assert_eq!(pending.contracts, 16); // floor(10 / 0.60)
    assert!((pending.edge.unwrap() - 0.204).abs() < 1e-9);

    // Window closes above the strike: win pays contracts - bet - fee.
    let closed = engine
        .process_tick(tick("w1", 95_400.0, 0.2, 99, 1))
        .unwrap();
    assert_eq!(closed.outcome, Some(Direction::Up));
    let (id, trade) = &closed.settled[0];
    assert_eq!(id, "s1_fixed_min_5");
    assert!(trade.won());
    let expected_profit = 16.0 - 10.0 - trade.position.fee;
    assert!((trade.profit - expected_profit).abs() < 1e-9);

    let state = engine.state("s1_fixed_min_5").unwrap();
    assert!((state.bankroll - (1000.0 + expected_profit)).abs() < 1e-9);
}

#[test]
fn dynamic_edge_waits_then_enters() {
    let d = descriptor(
        "s2_dynamic_wait3_edge5",
        EntryPolicy::DynamicEdge {
            min_wait_minutes: 3,
            min_edge: 0.05,
        },
    );
    let mut engine = Engine::new(vec![d], DEFAULT_FEE_RATE);

    engine
        .process_tick(tick("w1", 95_000.0, 14.0, 52, 48))
        .unwrap();

    // 12.0 minutes left -> elapsed minute 2, still inside the wait.
    let waiting = engine
        .process_tick(tick("w1", 95_100.0, 12.0, 60, 40))
        .unwrap();
    assert!(waiting.entered.is_empty());
    let reason = engine
        .state("s2_dynamic_wait3_edge5")
        .unwrap()
        .last_skip_reason
        .clone()
        .unwrap();
    assert!(reason.starts_with("Waiting 3 min"), "got: {reason}");

    // 10.5 minutes left -> minute 3 cleared, table edge 0.732 - 0.60.
    let entered = engine
        .process_tick(tick("w1", 95_100.0, 10.5, 60, 40))
        .unwrap();
    assert_eq!(entered.entered.len(), 1);
}

#[test]
fn tie_at_strike_settles_down() {
    let up_backer = descriptor(
        "s3_sentiment_odds55_wait0",
        EntryPolicy::Sentiment {
            odds_threshold: 55,
            min_wait_minutes: 0,
        },
    );
    let mut engine = Engine::new(vec![up_backer], DEFAULT_FEE_RATE);

    // Strike set at 95,000; sentiment backs UP at 60c.
    engine
        .process_tick(tick("w1", 95_000.0, 14.0, 60, 40))
        .unwrap();
    assert!(engine
        .state("s3_sentiment_odds55_wait0")
        .unwrap()
        .pending
        .is_some());

    // Window closes exactly at the strike: outcome is DOWN, UP loses.
    let closed = engine
        .process_tick(tick("w1", 95_000.0, 0.1, 50, 50))
        .unwrap();
    assert_eq!(closed.outcome, Some(Direction::Down));
    assert!(!closed.settled[0].1.won());
}

#[test]
fn invalid_tick_mid_window_changes_nothing() {
    let d = descriptor(
        "s3_sentiment_odds55_wait0",
        EntryPolicy::Sentiment {
            odds_threshold: 55,
            min_wait_minutes: 0,
        },
    );
    let mut engine = Engine::new(vec![d], DEFAULT_FEE_RATE);
    engine
        .process_tick(tick("w1", 95_000.0, 14.0, 60, 40))
        .unwrap();
    let before = engine.snapshot(1);

    let mut bad = tick("w1", 95_200.0, 7.0, 70, 30);
    bad.mins_left = f64::INFINITY;
    assert!(matches!(
        engine.process_tick(bad),
        Err(TickError::InvalidTick)
    ));

    let after = engine.snapshot(2);
    assert_eq!(before.tick_count, after.tick_count);
    assert_eq!(
        before.strategies["s3_sentiment_odds55_wait0"].trades,
        after.strategies["s3_sentiment_odds55_wait0"].trades
    );
}

#[test]
fn full_catalog_survives_a_trading_day_of_windows() {
    let mut engine = Engine::new(build_catalog().unwrap(), DEFAULT_FEE_RATE);

    // 8 windows, alternating drift direction so both sides win sometimes.
    for w in 0..8u32 {
        let id = format!("btc-updown-15m-{}", 1_733_155_200 + w * 900);
        let strike = 95_000.0;
        let drift = if w % 2 == 0 { 25.0 } else { -25.0 };

        for step in 0..=28 {
            let mins_left = (14.0 - f64::from(step) * 0.5).max(0.1);
            let price = strike + drift * f64::from(step);
            let (up_ask, down_ask) = if drift > 0.0 { (72, 30) } else { (30, 72) };
            engine
                .process_tick(tick(&id, price, mins_left, up_ask, down_ask))
                .unwrap();
        }
    }

    let snapshot = engine.snapshot(1);
    assert_eq!(snapshot.windows_processed, 8);

    let mut fleet_trades = 0;
    for (id, strategy) in &snapshot.strategies {
        let state = engine.state(id).unwrap();

        // Core invariants: bankroll reconciliation and count consistency.
        let realized: f64 = state.trades.iter().map(|t| t.profit).sum();
        assert!(
            (state.bankroll - (state.initial_bankroll + realized)).abs() < 1e-6,
            "bankroll drift for {id}"
        );
        assert_eq!(strategy.wins + strategy.losses, strategy.trades);

        // At most one trade per window.
        let mut windows: Vec<&str> = state
            .trades
            .iter()
            .map(|t| t.position.window_id.as_str())
            .collect();
        windows.sort_unstable();
        let before = windows.len();
        windows.dedup();
        assert_eq!(before, windows.len(), "{id} traded a window twice");

        // Nothing should still be pending after every window settled.
        assert!(!strategy.pending, "{id} left pending after settlement");
        fleet_trades += strategy.trades;
    }

    // A steadily drifting market must produce entries across the fleet.
    assert!(fleet_trades > 0);
}

// ─────────────────────────────────────────────────────────────────
// Scripted tick source: exercises the async seam the worker drives
// ─────────────────────────────────────────────────────────────────

struct ScriptedSource {
    ticks: std::sync::Mutex<std::collections::VecDeque<Tick>>,
}

#[async_trait::async_trait]
impl TickSource for ScriptedSource {
    async fn next_tick(&self) -> Result<Tick, MarketError> {
        self.ticks
            .lock()
            .expect("scripted source lock")
            .pop_front()
            .ok_or(MarketError::NoActiveWindow)
    }
}

#[tokio::test]
async fn scripted_source_drives_engine_to_settlement() {
    let ticks = vec![
        tick("w1", 95_000.0, 14.0, 60, 40),
        tick("w1", 95_200.0, 7.0, 75, 25),
        tick("w1", 95_300.0, 0.2, 99, 1),
    ];
    let source = ScriptedSource {
        ticks: std::sync::Mutex::new(ticks.into()),
    };

    let d = descriptor(
        "s3_sentiment_odds70_wait0",
        EntryPolicy::Sentiment {
            odds_threshold: 70,
            min_wait_minutes: 0,
        },
    );
    let mut engine = Engine::new(vec![d], DEFAULT_FEE_RATE);

    loop {
        match source.next_tick().await {
            Ok(t) => {
                engine.process_tick(t).unwrap();
            }
            Err(MarketError::NoActiveWindow) => break,
            Err(e) => panic!("unexpected source error: {e}"),
        }
    }

    let state = engine.state("s3_sentiment_odds70_wait0").unwrap();
    assert_eq!(state.total_trades(), 1);
    assert_eq!(state.wins, 1);
    assert!(state.pending.is_none());
}
