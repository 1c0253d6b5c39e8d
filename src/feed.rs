// ===============================
// src/feed.rs
// ===============================
//
// Market data adapters (poll-based, satu quote per panggilan):
// - HttpFeed : GET JSON {"best_bid","best_ask","bid_size","ask_size"} via reqwest
// - MockFeed : generator lokal, mid = 100 ± 1 dengan spread 0.05..0.20
//
// Setiap kegagalan dikembalikan sebagai FetchError; loop pemanggil yang
// memutuskan log + delay + retry.
//

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{Config, FeedMode};
use crate::domain::Quote;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("market data request timed out")]
    Timeout,
    #[error("market data endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("market data endpoint returned HTTP {0}")]
    Status(u16),
    #[error("malformed market data payload: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Unreachable(_) => "unreachable",
            FetchError::Status(_) => "status",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn fetch_quote(&self) -> Result<Quote, FetchError>;
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    best_bid: Option<f64>,
    best_ask: Option<f64>,
    bid_size: Option<f64>,
    ask_size: Option<f64>,
}

/// Upper bound for an accepted price; mid/target/PnL arithmetic stays far from Decimal overflow.
pub const MAX_PRICE: f64 = 1e12;

fn to_price(field: &str, v: Option<f64>) -> Result<Decimal, FetchError> {
    let v = v.ok_or_else(|| FetchError::Malformed(format!("missing {field}")))?;
    if !v.is_finite() || v <= 0.0 || v > MAX_PRICE {
        return Err(FetchError::Malformed(format!("{field}={v}")));
    }
    Decimal::from_f64(v)
        .map(|d| d.round_dp(8).normalize())
        .ok_or_else(|| FetchError::Malformed(format!("{field}={v}")))
}

fn to_size(v: Option<f64>) -> Option<Decimal> {
    v.filter(|x| x.is_finite() && *x >= 0.0)
        .and_then(Decimal::from_f64)
        .map(|d| d.round_dp(8).normalize())
}

/// Decode one market data document.
pub fn parse_quote(body: &str) -> Result<Quote, FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::Malformed("empty body".into()));
    }
    let p: QuotePayload =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let mut q = Quote::new(to_price("best_bid", p.best_bid)?, to_price("best_ask", p.best_ask)?);
    q.bid_size = to_size(p.bid_size);
    q.ask_size = to_size(p.ask_size);
    Ok(q)
}

/// REST poller against an external quote service.
pub struct HttpFeed {
    http: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into() })
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = e.status() {
        FetchError::Status(status.as_u16())
    } else if e.is_decode() || e.is_body() {
        FetchError::Malformed(e.to_string())
    } else {
        FetchError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl MarketDataClient for HttpFeed {
    async fn fetch_quote(&self) -> Result<Quote, FetchError> {
        let resp = self.http.get(&self.url).send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.text().await.map_err(classify)?;
        parse_quote(&body)
    }
}

/// In-process quote generator: every poll draws a fresh book around 100.
#[derive(Debug, Clone)]
pub struct MockFeed {
    pub center: f64,
    pub mid_jitter: f64,
    pub spread_lo: f64,
    pub spread_hi: f64,
}

impl Default for MockFeed {
    fn default() -> Self {
        Self { center: 100.0, mid_jitter: 1.0, spread_lo: 0.05, spread_hi: 0.2 }
    }
}

fn round2(x: f64) -> Decimal {
    Decimal::from_f64(x).map(|d| d.round_dp(2)).unwrap_or_default()
}

impl MockFeed {
    pub fn sample(&self) -> Quote {
        // jangan simpan ThreadRng melewati .await
        let mut rng = rand::thread_rng();
        let mid = self.center + rng.gen_range(-self.mid_jitter..=self.mid_jitter);
        let spread = rng.gen_range(self.spread_lo..=self.spread_hi);
        Quote {
            best_bid: round2(mid - spread / 2.0),
            best_ask: round2(mid + spread / 2.0),
            bid_size: Some(round2(rng.gen_range(1.0..=10.0))),
            ask_size: Some(round2(rng.gen_range(1.0..=10.0))),
        }
    }
}

#[async_trait]
impl MarketDataClient for MockFeed {
    async fn fetch_quote(&self) -> Result<Quote, FetchError> {
        Ok(self.sample())
    }
}

/// Builds the configured source. Each loop gets its own instance.
pub fn from_config(cfg: &Config) -> Result<Arc<dyn MarketDataClient>, reqwest::Error> {
    let client: Arc<dyn MarketDataClient> = match cfg.feed_mode {
        FeedMode::Mock => Arc::new(MockFeed::default()),
        FeedMode::Http => Arc::new(HttpFeed::new(cfg.market_data_url.clone(), cfg.http_timeout)?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_market_data_document() {
        let q = parse_quote(r#"{"best_bid": 100.0, "bid_size": 5, "best_ask": 100.1, "ask_size": 4.25}"#).unwrap();
        assert_eq!(q.best_bid, dec!(100.00));
        assert_eq!(q.best_ask, dec!(100.10));
        assert_eq!(q.bid_size, Some(dec!(5)));
        assert_eq!(q.ask_size, Some(dec!(4.25)));
    }

    #[test]
    fn sizes_are_optional() {
        let q = parse_quote(r#"{"best_bid": 99.9, "best_ask": 99.95}"#).unwrap();
        assert_eq!(q.best_ask, dec!(99.95));
        assert!(q.bid_size.is_none() && q.ask_size.is_none());
    }

    #[test]
    fn bad_payloads_are_malformed() {
        for body in ["", "   ", "not json", r#"{"best_bid": 100.0}"#, r#"{"best_bid": -1, "best_ask": 1}"#, r#"{"best_bid": 0, "best_ask": 1}"#] {
            assert!(matches!(parse_quote(body), Err(FetchError::Malformed(_))), "body={body:?}");
        }
    }

    #[test]
    fn out_of_range_prices_are_malformed() {
        for body in [
            r#"{"best_bid": 5e28, "best_ask": 5e28}"#,
            r#"{"best_bid": 100.0, "best_ask": 1e13}"#,
        ] {
            assert!(matches!(parse_quote(body), Err(FetchError::Malformed(_))), "body={body:?}");
        }
        let q = parse_quote(r#"{"best_bid": 1e12, "best_ask": 1e12}"#).unwrap();
        assert!(q.mid() > Decimal::ZERO);
    }

    #[test]
    fn crossed_quote_is_still_accepted() {
        let q = parse_quote(r#"{"best_bid": 100.2, "best_ask": 100.0}"#).unwrap();
        assert!(q.best_ask < q.best_bid);
    }

    #[tokio::test]
    async fn mock_feed_stays_in_band() {
        let feed = MockFeed::default();
        for _ in 0..200 {
            let q = feed.fetch_quote().await.unwrap();
            assert!(q.best_bid < q.best_ask, "{q:?}");
            assert!(q.best_bid >= dec!(98.8) && q.best_ask <= dec!(101.2), "{q:?}");
            assert_eq!(q.best_bid.round_dp(2), q.best_bid);
        }
    }

    // satu koneksi: baca request, tunggu `stall`, lalu kirim `reply` apa adanya
    async fn serve_once(reply: &'static str, stall: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            tokio::time::sleep(stall).await;
            let _ = sock.write_all(reply.as_bytes()).await;
            let _ = sock.shutdown().await;
        });
        format!("http://{addr}/market_data")
    }

    #[tokio::test]
    async fn non_2xx_reply_is_status() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            Duration::ZERO,
        )
        .await;
        let feed = HttpFeed::new(url, Duration::from_secs(2)).unwrap();
        assert_eq!(feed.fetch_quote().await, Err(FetchError::Status(503)));
    }

    #[tokio::test]
    async fn stalled_server_is_timeout() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
            Duration::from_secs(3),
        )
        .await;
        let feed = HttpFeed::new(url, Duration::from_millis(300)).unwrap();
        assert_eq!(feed.fetch_quote().await, Err(FetchError::Timeout));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 8\r\nConnection: close\r\n\r\nnot json",
            Duration::ZERO,
        )
        .await;
        let feed = HttpFeed::new(url, Duration::from_secs(2)).unwrap();
        let err = feed.fetch_quote().await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_classified() {
        // port 9 (discard) di loopback: koneksi ditolak
        let feed = HttpFeed::new("http://127.0.0.1:9/market_data", Duration::from_millis(500)).unwrap();
        let err = feed.fetch_quote().await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable(_) | FetchError::Timeout), "{err:?}");
    }
}
