// ===============================
// src/pnl.rs (PnL reporter)
// ===============================
//
// Loop terpisah dari quoting: fetch quote sendiri, baca TradingState
// (read-only), hitung unrealized/total, lalu emit satu record per periode.
//

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::warn;

use crate::domain::{EngineEvent, Marks, PnlRecord, Quote};
use crate::feed::MarketDataClient;
use crate::journal;
use crate::metrics;
use crate::orchestrator::stopped;
use crate::state::{SharedState, TradingState};

/// Mark-to-market at `mark_px`; flat or short inventory carries no unrealized PnL.
pub fn marks(st: &TradingState, mark_px: Decimal) -> Marks {
    let unrealized = if st.position > 0 {
        (mark_px - st.avg_cost) * Decimal::from(st.position)
    } else {
        Decimal::ZERO
    };
    Marks {
        position: st.position,
        avg_cost: st.avg_cost,
        realized: st.realized_pnl,
        unrealized,
        total: st.realized_pnl + unrealized,
    }
}

pub fn snapshot(st: &TradingState, q: &Quote) -> PnlRecord {
    let m = marks(st, q.best_bid);
    let long = st.position > 0;
    PnlRecord {
        ts: Utc::now(),
        position: m.position,
        avg_cost: m.avg_cost,
        realized: m.realized,
        unrealized: long.then_some(m.unrealized),
        total: long.then_some(m.total),
    }
}

pub async fn run(
    client: Arc<dyn MarketDataClient>,
    state: SharedState,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let fetched = tokio::select! {
            _ = stopped(&mut shutdown) => break,
            r = client.fetch_quote() => r,
        };
        match fetched {
            Ok(q) => {
                let rec = {
                    let st = state.lock().await;
                    snapshot(&st, &q)
                };
                metrics::observe_pnl(&rec);
                metrics::QUOTE_FETCH.with_label_values(&["report", "ok"]).inc();
                journal::record(&EngineEvent::Pnl(rec));
            }
            Err(e) => {
                metrics::QUOTE_FETCH.with_label_values(&["report", e.kind()]).inc();
                warn!(error = %e, "pnl reporter: quote fetch failed");
            }
        }
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = sleep(period) => {}
        }
    }
}
