// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{info, warn};

use crate::domain::{EngineEvent, OrderSide, PnlRecord};
use crate::state::TradingState;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Loop activity --------
pub static QUOTE_FETCH: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("quote_fetch_total", "market data polls (labels: loop, outcome)"),
        &["loop", "outcome"],
    )
    .unwrap()
});

pub static CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("cycles_total", "quoting cycles by outcome"), &["outcome"]).unwrap()
});

// -------- Order lifecycle --------
pub static ORDERS_PLACED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("orders_placed_total", "quotes placed"), &["side"]).unwrap()
});

pub static ORDERS_CANCELED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("orders_canceled_total", "quotes canceled"), &["side"]).unwrap()
});

pub static FILLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("fills_total", "simulated fills"), &["side"]).unwrap()
});

pub static OPEN_ORDERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("open_orders", "resting quotes per side (0/1)"), &["side"]).unwrap()
});

pub static RISK_FLATTEN: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("risk_flatten_total", "stop-loss flattens").unwrap());

// -------- Inventory & PnL --------
pub static POSITION: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("position", "net position (units)").unwrap());

pub static AVG_COST: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("avg_cost", "average cost of long inventory").unwrap());

pub static PNL_REALIZED: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_realized", "realized PnL").unwrap());

pub static PNL_UNREALIZED: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_unrealized", "unrealized PnL marked at best bid").unwrap());

pub static PNL_TOTAL: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_total", "realized + unrealized PnL").unwrap());

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(QUOTE_FETCH.clone())),
        REGISTRY.register(Box::new(CYCLES.clone())),
        REGISTRY.register(Box::new(ORDERS_PLACED.clone())),
        REGISTRY.register(Box::new(ORDERS_CANCELED.clone())),
        REGISTRY.register(Box::new(FILLS.clone())),
        REGISTRY.register(Box::new(OPEN_ORDERS.clone())),
        REGISTRY.register(Box::new(RISK_FLATTEN.clone())),
        REGISTRY.register(Box::new(POSITION.clone())),
        REGISTRY.register(Box::new(AVG_COST.clone())),
        REGISTRY.register(Box::new(PNL_REALIZED.clone())),
        REGISTRY.register(Box::new(PNL_UNREALIZED.clone())),
        REGISTRY.register(Box::new(PNL_TOTAL.clone())),
    ] {
        if let Err(e) = m {
            warn!(?e, "metric registration failed");
        }
    }
}

fn f(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

pub fn observe_state(st: &TradingState) {
    POSITION.set(st.position);
    AVG_COST.set(f(st.avg_cost));
    PNL_REALIZED.set(f(st.realized_pnl));
    for side in OrderSide::BOTH {
        OPEN_ORDERS.with_label_values(&[side.as_str()]).set(0);
    }
    for o in st.open_orders() {
        OPEN_ORDERS.with_label_values(&[o.side.as_str()]).set(1);
    }
}

pub fn observe_pnl(rec: &PnlRecord) {
    POSITION.set(rec.position);
    PNL_REALIZED.set(f(rec.realized));
    let u = rec.unrealized.unwrap_or_default();
    PNL_UNREALIZED.set(f(u));
    PNL_TOTAL.set(f(rec.realized + u));
}

pub fn observe_event(ev: &EngineEvent) {
    match ev {
        EngineEvent::Placed { side, .. } => ORDERS_PLACED.with_label_values(&[side.as_str()]).inc(),
        EngineEvent::Canceled { side, .. } => ORDERS_CANCELED.with_label_values(&[side.as_str()]).inc(),
        EngineEvent::Filled { fill, .. } => FILLS.with_label_values(&[fill.side.as_str()]).inc(),
        EngineEvent::Flattened { fill, .. } => {
            FILLS.with_label_values(&[fill.side.as_str()]).inc();
            RISK_FLATTEN.inc();
        }
        EngineEvent::Pnl(_) => {}
    }
}

// Prometheus text exposition of REGISTRY
fn encode_metrics() -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buf) {
        warn!(?e, "metrics encode failed");
        buf.clear();
    }
    if buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Any request path gets the full exposition; headers are drained, not parsed.
fn handle_client(mut stream: TcpStream) -> std::io::Result<()> {
    let mut req = [0u8; 1024];
    if stream.read(&mut req)? == 0 {
        return Ok(()); // peer closed before sending a request
    }

    let body = encode_metrics();
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(&body)?;
    stream.flush()
}

/// Serve the registry on its own OS thread so the Tokio runtime stays clean.
pub fn serve_metrics(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    info!(%addr, "metrics listening on /metrics");
    thread::spawn(move || serve_loop(listener));
    Ok(())
}

fn serve_loop(listener: TcpListener) {
    for conn in listener.incoming() {
        if let Err(e) = conn.and_then(handle_client) {
            warn!(?e, "metrics scrape failed");
        }
    }
}
