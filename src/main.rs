// ===============================
// src/main.rs
// ===============================
/*
 # jalankan dengan mock feed + metrics
 METRICS_PORT=9898 RUST_LOG=info cargo run

 # pakai HTTP quote service eksternal
 cargo run -- --feed-mode http --market-data-url http://127.0.0.1:5000/market_data

 curl -s localhost:9898/metrics | egrep '^(position|pnl_|fills_total)'
*/
/*
=============================================================================
Project : mm_quoter - async single-instrument market-making engine in Rust
Module  : main.rs
Version : 0.1.0
License : MIT

Summary : Polls best bid/ask from a market data source (mock/HTTP), keeps a
          two-sided quote around mid with min-lifetime and cancel-threshold
          churn limits, simulates fills, tracks inventory/PnL, enforces a
          stop-loss flatten, and reports PnL from a separate loop.
=============================================================================
*/
mod domain;
mod config;
mod metrics;
mod journal;
mod feed;
mod state;
mod quoting;
mod risk;
mod pnl;
mod orchestrator;

use std::process::ExitCode;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::orchestrator::Orchestrator;
use crate::quoting::QuotingEngine;
use crate::state::TradingState;

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Config (fatal sebelum task apa pun jalan) ----
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        feed_mode = cfg.feed_mode.as_str(),
        market_data_url = %cfg.market_data_url,
        spread = %cfg.spread,
        stop_loss_threshold = %cfg.stop_loss_threshold,
        cancel_threshold = %cfg.cancel_threshold,
        min_order_lifetime_ms = cfg.min_order_lifetime.as_millis() as u64,
        quote_period_ms = cfg.quote_period.as_millis() as u64,
        report_period_ms = cfg.report_period.as_millis() as u64,
        size_fixed = ?cfg.size_fixed,
        size_range = ?(cfg.size_min, cfg.size_max),
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = cfg.metrics_port {
        if let Err(e) = metrics::serve_metrics(port) {
            error!(?e, port, "metrics endpoint unavailable");
        }
    }

    // ---- Market data: satu client per loop ----
    let (quote_client, report_client) = match (feed::from_config(&cfg), feed::from_config(&cfg)) {
        (Ok(q), Ok(r)) => (q, r),
        (Err(e), _) | (_, Err(e)) => {
            error!(?e, "market data client init failed");
            return ExitCode::FAILURE;
        }
    };

    // ---- Engine + shared state ----
    let engine = QuotingEngine::new(&cfg, quoting::size_policy(&cfg));
    let state = TradingState::shared();
    let orchestrator = Orchestrator::new(&cfg, engine, quote_client, report_client, state);

    // ---- Shutdown on Ctrl-C ----
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                // tanpa handler sinyal, biarkan jalan sampai proses di-kill
                error!(?e, "ctrl-c handler failed");
                std::future::pending::<()>().await;
            }
        }
    });

    orchestrator.run(stop_rx).await;
    ExitCode::SUCCESS
}
