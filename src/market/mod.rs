//! Market data client
//!
//! Read-only tick source for Polymarket BTC 15-minute up/down markets.
//! Market metadata and fallback prices come from the Gamma API, best
//! bid/ask from the CLOB orderbook, and BTC spot from Kraken's public
//! ticker. No authentication - this crate never places orders.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{now_millis, Tick};

/// Failures while acquiring a tick. All of them mean "no tick this cycle";
/// none corrupt engine state.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("no active 15-minute window found")]
    NoActiveWindow,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed market data: {0}")]
    Malformed(String),
}

/// Anything that can produce the next market tick. The engine's driver
/// polls this; tests substitute scripted sources.
#[async_trait]
pub trait TickSource: Send + Sync {
    async fn next_tick(&self) -> Result<Tick, MarketError>;
}

/// Raw Gamma market row - only the fields this client reads.
#[derive(Debug, Clone, Deserialize)]
struct GammaMarket {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, rename = "endDate")]
    end_date: Option<String>,
    /// Either a JSON array or a JSON-encoded string of one
    #[serde(default, rename = "outcomePrices")]
    outcome_prices: Option<serde_json::Value>,
    /// Same double-encoding quirk as outcomePrices
    #[serde(default, rename = "clobTokenIds")]
    clob_token_ids: Option<serde_json::Value>,
}

/// Parsed market data, normalized for tick assembly.
#[derive(Debug, Clone)]
struct ParsedMarket {
    market_id: Option<String>,
    slug: String,
    mins_left: f64,
    /// Gamma mid prices in cents, [up, down] - fallback when the book is empty
    up_price: u32,
    down_price: u32,
    up_token: Option<String>,
    down_token: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct BookQuote {
    bid: u32,
    ask: u32,
}

pub struct GammaClient {
    client: Client,
    gamma_url: String,
    clob_url: String,
    kraken_url: String,
}

impl GammaClient {
    pub fn new(gamma_url: &str, clob_url: &str, kraken_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            gamma_url: gamma_url.trim_end_matches('/').to_string(),
            clob_url: clob_url.trim_end_matches('/').to_string(),
            kraken_url: kraken_url.to_string(),
        }
    }

    /// Current BTC spot from Kraken.
    async fn btc_price(&self) -> Result<f64, MarketError> {
        #[derive(Deserialize)]
        struct KrakenTicker {
            result: std::collections::HashMap<String, KrakenPair>,
        }
        #[derive(Deserialize)]
        struct KrakenPair {
            /// Last trade: [price, lot volume]
            c: Vec<String>,
        }

        let ticker: KrakenTicker = self
            .client
            .get(&self.kraken_url)
            .query(&[("pair", "XBTUSD")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        ticker
            .result
            .values()
            .next()
            .and_then(|pair| pair.c.first())
            .and_then(|price| price.parse::<f64>().ok())
            .ok_or_else(|| MarketError::Malformed("kraken ticker missing last price".to_string()))
    }

    async fn market_by_slug(&self, slug: &str) -> Result<Option<GammaMarket>, MarketError> {
        let markets: Vec<GammaMarket> = self
            .client
            .get(format!("{}/markets", self.gamma_url))
            .query(&[("slug", slug)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(markets.into_iter().next())
    }

    /// Active BTC 15-minute markets, soonest-ending first.
    async fn active_btc_markets(&self) -> Result<Vec<GammaMarket>, MarketError> {
        let markets: Vec<GammaMarket> = self
            .client
            .get(format!("{}/markets", self.gamma_url))
            .query(&[
                ("active", "true"),
                ("closed", "false"),
                ("tag", "crypto"),
                ("limit", "50"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut btc_15m: Vec<GammaMarket> = markets
            .into_iter()
            .filter(|m| {
                m.slug
                    .as_deref()
                    .map(|s| s.contains("btc") && s.contains("15m"))
                    .unwrap_or(false)
            })
            .collect();
        btc_15m.sort_by(|a, b| a.end_date.cmp(&b.end_date));
        Ok(btc_15m)
    }

    /// Find the live window: current slug first, then the next window (in
    /// case the current one just rolled over), then a search of active
    /// markets.
    async fn current_market(&self) -> Result<GammaMarket, MarketError> {
        let now = Utc::now();
        for ts in [window_start_ts(now), window_start_ts(now) + 15 * 60] {
            let slug = market_slug(ts);
            debug!(%slug, "trying window slug");
            if let Some(market) = self.market_by_slug(&slug).await? {
                return Ok(market);
            }
        }

        self.active_btc_markets()
            .await?
            .into_iter()
            .next()
            .ok_or(MarketError::NoActiveWindow)
    }

    /// Best bid/ask for a token from the CLOB book. `None` when the book
    /// is unavailable - callers fall back to Gamma prices.
    async fn book_quote(&self, token_id: &str) -> Option<BookQuote> {
        #[derive(Deserialize)]
        struct Book {
            #[serde(default)]
            bids: Vec<BookLevel>,
            #[serde(default)]
            asks: Vec<BookLevel>,
        }
        #[derive(Deserialize)]
        struct BookLevel {
            price: String,
        }

        let book: Book = self
            .client
            .get(format!("{}/book", self.clob_url))
            .query(&[("token_id", token_id)])
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .await
            .ok()?;

        let to_cents = |level: &BookLevel| {
            level
                .price
                .parse::<f64>()
                .ok()
                .map(|p| (p * 100.0) as u32)
        };
        Some(BookQuote {
            bid: book.bids.first().and_then(to_cents).unwrap_or(0),
            ask: book.asks.first().and_then(to_cents).unwrap_or(100),
        })
    }
}

#[async_trait]
impl TickSource for GammaClient {
    async fn next_tick(&self) -> Result<Tick, MarketError> {
        let market = self.current_market().await?;
        let parsed = parse_market(&market)?;

        let asset_price = self.btc_price().await?;

        let up_book = match &parsed.up_token {
            Some(token) => self.book_quote(token).await,
            None => None,
        };
        let down_book = match &parsed.down_token {
            Some(token) => self.book_quote(token).await,
            None => None,
        };
        if up_book.is_none() || down_book.is_none() {
            warn!(window = %parsed.slug, "orderbook unavailable, using Gamma prices");
        }

        // Gamma fallback: ask at the quoted price, bid two cents behind.
        let (up_ask, up_bid) = match up_book {
            Some(quote) => (quote.ask, quote.bid),
            None => (parsed.up_price, parsed.up_price.saturating_sub(2)),
        };
        let (down_ask, down_bid) = match down_book {
            Some(quote) => (quote.ask, quote.bid),
            None => (parsed.down_price, parsed.down_price.saturating_sub(2)),
        };

        Ok(Tick {
            ts: now_millis(),
            window_id: parsed.slug,
            market_id: parsed.market_id,
            asset_price,
            // The API does not expose the opening price; the engine's
            // window tracker establishes it from the first tick.
            strike_price: 0.0,
            mins_left: parsed.mins_left,
            up_ask,
            up_bid,
            down_ask,
            down_bid,
        })
    }
}

/// Unix timestamp of the 15-minute window containing `now`.
fn window_start_ts(now: DateTime<Utc>) -> i64 {
    let aligned = now
        .with_minute(now.minute() / 15 * 15)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("15-minute alignment is always a valid time");
    aligned.timestamp()
}

/// Polymarket slug for a BTC 15-minute window.
fn market_slug(window_ts: i64) -> String {
    format!("btc-updown-15m-{window_ts}")
}

/// Values that Gamma sometimes sends as a JSON array and sometimes as a
/// JSON-encoded string of one.
fn string_array(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        serde_json::Value::String(raw) => serde_json::from_str::<Vec<String>>(raw)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn parse_market(market: &GammaMarket) -> Result<ParsedMarket, MarketError> {
    let slug = market
        .slug
        .clone()
        .ok_or_else(|| MarketError::Malformed("market missing slug".to_string()))?;

    let end_date = market
        .end_date
        .as_deref()
        .ok_or_else(|| MarketError::Malformed(format!("market {slug} missing endDate")))?;
    let end = DateTime::parse_from_rfc3339(end_date)
        .map_err(|e| MarketError::Malformed(format!("bad endDate for {slug}: {e}")))?
        .with_timezone(&Utc);
    let mins_left = (end - Utc::now()).num_milliseconds() as f64 / 60_000.0;

    // Gamma returns [up, down] outcome prices as probability strings.
    let (mut up_price, mut down_price) = (50, 50);
    if let Some(raw) = &market.outcome_prices {
        let prices = string_array(raw);
        if prices.len() >= 2 {
            if let (Ok(up), Ok(down)) = (prices[0].parse::<f64>(), prices[1].parse::<f64>()) {
                up_price = (up * 100.0) as u32;
                down_price = (down * 100.0) as u32;
            }
        }
    }

    let tokens = market
        .clob_token_ids
        .as_ref()
        .map(string_array)
        .unwrap_or_default();

    Ok(ParsedMarket {
        market_id: market.id.clone(),
        slug,
        mins_left,
        up_price,
        down_price,
        up_token: tokens.first().cloned(),
        down_token: tokens.get(1).cloned(),
    })
}
