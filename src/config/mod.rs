//! Configuration management for PolyFleet
//!
//! Loads from optional config files + environment variables via .env.
//! A malformed configuration fails fast here, before any tick is processed.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    pub market: MarketConfig,
    pub fees: FeeConfig,
    pub persistence: PersistenceConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between fleet status log lines
    pub status_log_interval_secs: u64,
    /// Backoff when no active window exists
    pub no_window_backoff_secs: u64,
    /// Backoff after an invalid tick
    pub invalid_tick_backoff_secs: u64,
    /// Backoff after a fetch failure
    pub error_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Gamma API endpoint
    pub gamma_url: String,
    /// CLOB API endpoint (orderbooks)
    pub clob_url: String,
    /// Kraken public ticker endpoint (BTC spot)
    pub kraken_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Fee rate applied on the variance curve (~2% on crypto markets)
    pub fee_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory for all output files
    pub data_dir: String,
    /// Tick log file name (JSONL)
    pub tick_log: String,
    /// Settled-trade CSV file name
    pub trade_csv: String,
    /// Engine state file name (restart recovery)
    pub state_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Serve the read-only snapshot API (requires the `dashboard` feature)
    pub enabled: bool,
    /// Bind address for the API
    pub bind_addr: String,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Worker defaults
            .set_default("worker.status_log_interval_secs", 30)?
            .set_default("worker.no_window_backoff_secs", 30)?
            .set_default("worker.invalid_tick_backoff_secs", 5)?
            .set_default("worker.error_backoff_secs", 30)?
            // Market defaults
            .set_default("market.gamma_url", "https://gamma-api.polymarket.com")?
            .set_default("market.clob_url", "https://clob.polymarket.com")?
            .set_default("market.kraken_url", "https://api.kraken.com/0/public/Ticker")?
            // Fee defaults
            .set_default("fees.fee_rate", 0.02)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.tick_log", "tick_log.jsonl")?
            .set_default("persistence.trade_csv", "settled_trades.csv")?
            .set_default("persistence.state_file", "fleet_state.json")?
            // Dashboard defaults
            .set_default("dashboard.enabled", true)?
            .set_default("dashboard.bind_addr", "127.0.0.1:8080")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (POLYFLEET_*)
            .add_source(Environment::with_prefix("POLYFLEET").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.fees.fee_rate) {
            bail!("fees.fee_rate must be in [0, 1), got {}", self.fees.fee_rate);
        }
        if self.worker.status_log_interval_secs == 0 {
            bail!("worker.status_log_interval_secs must be positive");
        }
        if self.persistence.data_dir.trim().is_empty() {
            bail!("persistence.data_dir must not be empty");
        }
        Ok(())
    }

    /// Generate a digest of the config for startup logging
    pub fn digest(&self) -> String {
        format!(
            "fee_rate={:.3} data_dir={} dashboard={} status_interval={}s",
            self.fees.fee_rate,
            self.persistence.data_dir,
            self.dashboard.enabled,
            self.worker.status_log_interval_secs
        )
    }

    pub fn tick_log_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.persistence.data_dir).join(&self.persistence.tick_log)
    }

    pub fn trade_csv_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.persistence.data_dir).join(&self.persistence.trade_csv)
    }

    pub fn state_file_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.persistence.data_dir).join(&self.persistence.state_file)
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
