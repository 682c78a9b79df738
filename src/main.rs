//! PolyFleet worker
//!
//! Runs the whole strategy fleet against live Polymarket data: fetch tick,
//! evaluate every strategy, settle closing windows, publish a snapshot.
//! Polling cadence tightens as the window nears its close; the engine
//! itself makes no scheduling decisions.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polyfleet::catalog::build_catalog;
use polyfleet::config::AppConfig;
use polyfleet::engine::{Engine, EngineSnapshot, TickError};
use polyfleet::market::{GammaClient, MarketError, TickSource};
use polyfleet::persistence::{StateStore, TickLogger, TradeCsvRecord, TradeLog};
use polyfleet::types::Tick;

struct Worker {
    config: AppConfig,
    engine: Engine,
    tick_logger: TickLogger,
    trade_log: TradeLog,
    state_store: StateStore,
    snapshot_tx: watch::Sender<EngineSnapshot>,
    snapshot_version: u64,
    last_status: Instant,
}

impl Worker {
    fn new(config: AppConfig, engine: Engine, snapshot_tx: watch::Sender<EngineSnapshot>) -> Self {
        let tick_logger = TickLogger::new(config.tick_log_path());
        let trade_log = TradeLog::new(config.trade_csv_path());
        let state_store = StateStore::new(config.state_file_path());
        Self {
            config,
            engine,
            tick_logger,
            trade_log,
            state_store,
            snapshot_tx,
            snapshot_version: 0,
            last_status: Instant::now(),
        }
    }

    /// Process one tick and choose the next poll delay.
    fn handle_tick(&mut self, tick: Tick) -> Duration {
        let mins_left = tick.mins_left;
        self.tick_logger.log(&tick);

        match self.engine.process_tick(tick) {
            Ok(report) => {
                if let Some(outcome) = report.outcome {
                    let rows: Vec<TradeCsvRecord> = report
                        .settled
                        .iter()
                        .map(|(id, trade)| TradeCsvRecord::from_settled(id, trade))
                        .collect();
                    self.trade_log.append(&rows);
                    info!(
                        outcome = %outcome,
                        settled = report.settled.len(),
                        "window closed"
                    );
                    self.publish_snapshot();
                    self.save_state();
                }
            }
            Err(TickError::InvalidTick) => {
                warn!("invalid tick discarded");
                return Duration::from_secs(self.config.worker.invalid_tick_backoff_secs);
            }
            Err(e) => warn!(error = %e, "tick rejected"),
        }

        self.maybe_log_status();
        adaptive_delay(mins_left)
    }

    /// Periodic fleet status line + snapshot publish.
    fn maybe_log_status(&mut self) {
        let interval = Duration::from_secs(self.config.worker.status_log_interval_secs);
        if self.last_status.elapsed() < interval {
            return;
        }
        self.last_status = Instant::now();

        let snapshot = self.publish_snapshot();
        let totals = snapshot.totals();
        info!(
            trades = totals.trades,
            win_rate = %format!("{:.1}%", totals.win_rate()),
            profit = %format!("${:.2}", totals.profit),
            pending = totals.pending,
            ticks = snapshot.tick_count,
            "📊 STATUS"
        );
    }

    fn publish_snapshot(&mut self) -> EngineSnapshot {
        self.snapshot_version += 1;
        let snapshot = self.engine.snapshot(self.snapshot_version);
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }

    fn save_state(&self) {
        if let Err(e) = self.state_store.save(&self.engine.export_state()) {
            warn!(error = %e, "state save failed");
        }
    }

    /// Final snapshot + flush. Pending positions stay pending in the state
    /// file and resume on the next run.
    fn shutdown(&mut self) {
        info!("shutting down");
        let snapshot = self.publish_snapshot();
        self.save_state();
        let totals = snapshot.totals();
        info!(
            ticks = self.tick_logger.tick_count(),
            windows = snapshot.windows_processed,
            trades = totals.trades,
            profit = %format!("${:.2}", totals.profit),
            "👋 Run finished"
        );
    }
}

/// Poll faster as the window approaches its close, second-by-second at the
/// end where settlement happens.
fn adaptive_delay(mins_left: f64) -> Duration {
    if mins_left > 10.0 {
        Duration::from_secs(5)
    } else if mins_left > 5.0 {
        Duration::from_secs(3)
    } else if mins_left > 1.0 {
        Duration::from_secs(2)
    } else {
        Duration::from_secs(1)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("polyfleet=info")),
        )
        .init();

    let config = AppConfig::load().context("configuration is invalid")?;
    info!(config = %config.digest(), "⚙️ Configuration loaded");

    std::fs::create_dir_all(&config.persistence.data_dir)
        .with_context(|| format!("create data dir {}", config.persistence.data_dir))?;

    // A bad catalog must never reach the tick loop.
    let catalog = build_catalog().context("strategy catalog is invalid")?;
    info!(strategies = catalog.len(), "🤖 Catalog built");

    let mut engine = Engine::new(catalog, config.fees.fee_rate);
    let state_store = StateStore::new(config.state_file_path());
    if let Some(persisted) = state_store.load()? {
        engine
            .restore(persisted)
            .context("persisted state does not match the catalog")?;
    }

    let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot(0));

    #[cfg(feature = "dashboard")]
    if config.dashboard.enabled {
        let rx = snapshot_rx.clone();
        let bind_addr = config.dashboard.bind_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = polyfleet::dashboard::start_server(rx, &bind_addr).await {
                warn!(error = %e, "dashboard server stopped");
            }
        });
    }
    #[cfg(not(feature = "dashboard"))]
    drop(snapshot_rx);

    let source = GammaClient::new(
        &config.market.gamma_url,
        &config.market.clob_url,
        &config.market.kraken_url,
    );

    let no_window_backoff = Duration::from_secs(config.worker.no_window_backoff_secs);
    let error_backoff = Duration::from_secs(config.worker.error_backoff_secs);
    let mut worker = Worker::new(config, engine, snapshot_tx);

    info!("🚀 PolyFleet live paper trading started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let delay = tokio::select! {
            _ = &mut shutdown => break,
            result = source.next_tick() => match result {
                Ok(tick) => worker.handle_tick(tick),
                Err(MarketError::NoActiveWindow) => {
                    info!("no active window, waiting");
                    no_window_backoff
                }
                Err(e) => {
                    // Fetch failures skip the cycle; engine state is untouched.
                    warn!(error = %e, "tick fetch failed");
                    error_backoff
                }
            },
        };

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    worker.shutdown();
    Ok(())
}
