// ===============================
// src/orchestrator.rs
// ===============================
//
// Menjalankan dua loop konkuren (quoting & PnL reporter) di atas satu
// SharedState, dengan satu sinyal shutdown (watch<bool>) untuk keduanya.
//

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::feed::MarketDataClient;
use crate::pnl;
use crate::quoting::{self, LoopTiming, QuotingEngine};
use crate::state::SharedState;

/// Resolves once shutdown is requested (or the sender is gone).
pub async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // Err = sender sudah drop, perlakukan sebagai shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub struct Orchestrator {
    pub engine: QuotingEngine,
    pub quote_client: Arc<dyn MarketDataClient>,
    pub report_client: Arc<dyn MarketDataClient>,
    pub state: SharedState,
    pub timing: LoopTiming,
    pub report_period: Duration,
}

impl Orchestrator {
    pub fn new(
        cfg: &Config,
        engine: QuotingEngine,
        quote_client: Arc<dyn MarketDataClient>,
        report_client: Arc<dyn MarketDataClient>,
        state: SharedState,
    ) -> Self {
        Self {
            engine,
            quote_client,
            report_client,
            state,
            timing: LoopTiming::from_config(cfg),
            report_period: cfg.report_period,
        }
    }

    /// Spawns both loops and returns when both have stopped. The first loop
    /// to end (external shutdown, or a panic) stops the other one.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut quoting = tokio::spawn(quoting::run(
            self.engine,
            self.quote_client,
            self.state.clone(),
            self.timing,
            stop_rx.clone(),
        ));
        let mut reporting = tokio::spawn(pnl::run(
            self.report_client,
            self.state,
            self.report_period,
            stop_rx,
        ));
        info!("quoting and pnl loops started");

        let (mut q, mut r) = (None, None);
        tokio::select! {
            _ = stopped(&mut shutdown) => info!("shutdown signal received"),
            res = &mut quoting => {
                warn!("quoting loop ended early, stopping pnl loop");
                q = Some(res);
            }
            res = &mut reporting => {
                warn!("pnl loop ended early, stopping quoting loop");
                r = Some(res);
            }
        }
        let _ = stop_tx.send(true);

        let q = match q {
            Some(res) => res,
            None => quoting.await,
        };
        let r = match r {
            Some(res) => res,
            None => reporting.await,
        };
        if let Err(e) = q {
            error!(?e, "quoting loop aborted");
        }
        if let Err(e) = r {
            error!(?e, "pnl loop aborted");
        }
        info!("orchestrator stopped");
    }
}
