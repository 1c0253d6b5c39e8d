// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : mm_quoter - async single-instrument market-making engine in Rust
Module  : config.rs
Version : 0.1.0
License : MIT

Summary : Polls best bid/ask from a market data source (mock/HTTP), keeps a
          two-sided quote around mid with min-lifetime and cancel-threshold
          churn limits, simulates fills, tracks inventory/PnL, enforces a
          stop-loss flatten, and reports PnL from a separate loop.
=============================================================================
*/
use std::env;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

/// Sumber market data
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMode {
    Mock,
    Http,
}

impl FeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Mock => "mock",
            FeedMode::Http => "http",
        }
    }
}

impl FromStr for FeedMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(FeedMode::Mock),
            "http" | "rest" => Ok(FeedMode::Http),
            other => Err(ConfigError::BadFeedMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("spread must be positive, got {0}")]
    NonPositiveSpread(Decimal),
    #[error("{0} must not be negative, got {1}")]
    NegativeThreshold(&'static str, Decimal),
    #[error("{0} must be a positive duration")]
    ZeroDuration(&'static str),
    #[error("order size range invalid: min={min} max={max}")]
    BadSizeRange { min: i64, max: i64 },
    #[error("unknown feed mode {0:?} (expected mock|http)")]
    BadFeedMode(String),
    #[error("cannot parse {key}={value:?}")]
    BadValue { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    // quoting policy
    pub spread: Decimal,
    pub stop_loss_threshold: Decimal,
    pub min_order_lifetime: Duration,
    pub cancel_threshold: Decimal,

    // loop timing
    pub quote_period: Duration,
    pub idle_poll: Duration,
    pub fetch_retry: Duration,
    pub report_period: Duration,

    // order sizing: fixed kalau di-set, selain itu uniform [min, max]
    pub size_min: i64,
    pub size_max: i64,
    pub size_fixed: Option<i64>,

    // market data
    pub feed_mode: FeedMode,
    pub market_data_url: String,
    pub http_timeout: Duration,

    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spread: dec!(0.05),
            stop_loss_threshold: dec!(1),
            min_order_lifetime: Duration::from_secs(5),
            cancel_threshold: dec!(0.02),
            quote_period: Duration::from_secs(1),
            idle_poll: Duration::from_millis(500),
            fetch_retry: Duration::from_millis(100),
            report_period: Duration::from_secs(1),
            size_min: 1,
            size_max: 5,
            size_fixed: None,
            feed_mode: FeedMode::Mock,
            market_data_url: "http://127.0.0.1:5000/market_data".to_string(),
            http_timeout: Duration::from_secs(2),
            metrics_port: None,
        }
    }
}

/// Command-line overrides; anything left out keeps the env/default value.
#[derive(Parser, Debug, Default)]
#[command(name = "mm_quoter", about = "Single-instrument market-making quoter")]
pub struct Cli {
    #[arg(long)]
    pub spread: Option<Decimal>,
    #[arg(long)]
    pub stop_loss_threshold: Option<Decimal>,
    #[arg(long)]
    pub min_order_lifetime_ms: Option<u64>,
    #[arg(long)]
    pub cancel_threshold: Option<Decimal>,
    #[arg(long)]
    pub quote_period_ms: Option<u64>,
    #[arg(long)]
    pub idle_poll_ms: Option<u64>,
    #[arg(long)]
    pub fetch_retry_ms: Option<u64>,
    #[arg(long)]
    pub report_period_ms: Option<u64>,
    #[arg(long)]
    pub order_size_min: Option<i64>,
    #[arg(long)]
    pub order_size_max: Option<i64>,
    #[arg(long)]
    pub order_size_fixed: Option<i64>,
    #[arg(long)]
    pub feed_mode: Option<FeedMode>,
    #[arg(long)]
    pub market_data_url: Option<String>,
    #[arg(long)]
    pub http_timeout_ms: Option<u64>,
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

fn parse_key<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::BadValue { key, value: raw }),
    }
}

fn millis(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_key::<u64>(get, key)?.map(Duration::from_millis))
}

impl Config {
    /// Layer environment values (via `get`) over the current settings.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = parse_key(&get, "SPREAD")? { self.spread = v; }
        if let Some(v) = parse_key(&get, "STOP_LOSS_THRESHOLD")? { self.stop_loss_threshold = v; }
        if let Some(v) = millis(&get, "MIN_ORDER_LIFETIME_MS")? { self.min_order_lifetime = v; }
        if let Some(v) = parse_key(&get, "CANCEL_THRESHOLD")? { self.cancel_threshold = v; }
        if let Some(v) = millis(&get, "QUOTE_PERIOD_MS")? { self.quote_period = v; }
        if let Some(v) = millis(&get, "IDLE_POLL_MS")? { self.idle_poll = v; }
        if let Some(v) = millis(&get, "FETCH_RETRY_MS")? { self.fetch_retry = v; }
        if let Some(v) = millis(&get, "REPORT_PERIOD_MS")? { self.report_period = v; }
        if let Some(v) = parse_key(&get, "ORDER_SIZE_MIN")? { self.size_min = v; }
        if let Some(v) = parse_key(&get, "ORDER_SIZE_MAX")? { self.size_max = v; }
        if let Some(v) = parse_key(&get, "ORDER_SIZE_FIXED")? { self.size_fixed = Some(v); }
        if let Some(v) = get("FEED_MODE") { self.feed_mode = v.parse()?; }
        if let Some(v) = get("MARKET_DATA_URL") { self.market_data_url = v; }
        if let Some(v) = millis(&get, "HTTP_TIMEOUT_MS")? { self.http_timeout = v; }
        if let Some(v) = parse_key(&get, "METRICS_PORT")? { self.metrics_port = Some(v); }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: Cli) {
        let ms = Duration::from_millis;
        if let Some(v) = cli.spread { self.spread = v; }
        if let Some(v) = cli.stop_loss_threshold { self.stop_loss_threshold = v; }
        if let Some(v) = cli.min_order_lifetime_ms { self.min_order_lifetime = ms(v); }
        if let Some(v) = cli.cancel_threshold { self.cancel_threshold = v; }
        if let Some(v) = cli.quote_period_ms { self.quote_period = ms(v); }
        if let Some(v) = cli.idle_poll_ms { self.idle_poll = ms(v); }
        if let Some(v) = cli.fetch_retry_ms { self.fetch_retry = ms(v); }
        if let Some(v) = cli.report_period_ms { self.report_period = ms(v); }
        if let Some(v) = cli.order_size_min { self.size_min = v; }
        if let Some(v) = cli.order_size_max { self.size_max = v; }
        if cli.order_size_fixed.is_some() { self.size_fixed = cli.order_size_fixed; }
        if let Some(v) = cli.feed_mode { self.feed_mode = v; }
        if let Some(v) = cli.market_data_url { self.market_data_url = v; }
        if let Some(v) = cli.http_timeout_ms { self.http_timeout = ms(v); }
        if cli.metrics_port.is_some() { self.metrics_port = cli.metrics_port; }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spread <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveSpread(self.spread));
        }
        if self.stop_loss_threshold < Decimal::ZERO {
            return Err(ConfigError::NegativeThreshold("stop_loss_threshold", self.stop_loss_threshold));
        }
        if self.cancel_threshold < Decimal::ZERO {
            return Err(ConfigError::NegativeThreshold("cancel_threshold", self.cancel_threshold));
        }
        for (name, d) in [
            ("quote_period", self.quote_period),
            ("idle_poll", self.idle_poll),
            ("fetch_retry", self.fetch_retry),
            ("report_period", self.report_period),
            ("http_timeout", self.http_timeout),
        ] {
            if d.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if self.size_min < 1 || self.size_max < self.size_min {
            return Err(ConfigError::BadSizeRange { min: self.size_min, max: self.size_max });
        }
        if let Some(fixed) = self.size_fixed {
            if fixed < 1 {
                return Err(ConfigError::BadSizeRange { min: fixed, max: fixed });
            }
        }
        Ok(())
    }
}

/// Defaults <- .env/environment <- CLI flags, then validate.
pub fn load() -> Result<Config, ConfigError> {
    // Pastikan .env dibaca sebelum env::var
    let _ = dotenv();

    let mut cfg = Config::default();
    cfg.apply_env(|k: &str| env::var(k).ok())?;
    cfg.apply_cli(Cli::parse());
    cfg.validate()?;
    Ok(cfg)
}
