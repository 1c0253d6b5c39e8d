// ===============================
// src/quoting.rs (requoting state machine + fill simulation)
// ===============================
//
// Urutan per siklus (tidak boleh ditukar):
//   1) target bid/ask = mid ∓ spread/2, dibulatkan 2 desimal
//   2) min-lifetime gate (global, kedua sisi)
//   3) churn suppression: kedua sisi resting & drift < cancel_threshold
//   4) cancel -> place per sisi yang harganya berubah
//   5) fill simulation terhadap semua order resting (snapshot quote yang sama)
//   6) risk check (stop-loss flatten, menembus gate 2 & 3)
//

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{EngineEvent, OrderSide, Quote};
use crate::feed::MarketDataClient;
use crate::journal;
use crate::metrics;
use crate::orchestrator::stopped;
use crate::pnl::marks;
use crate::risk::{RiskAction, RiskManager};
use crate::state::{SharedState, TradingState};

/// Instrument price precision.
pub const PRICE_DP: u32 = 2;

/// Chooses the size of each newly placed quote.
pub trait SizePolicy: Send + Sync {
    fn next_size(&self, side: OrderSide) -> i64;
}

/// Uniform integer size in `[min, max]`.
#[derive(Debug, Clone)]
pub struct UniformSize {
    pub min: i64,
    pub max: i64,
}

impl SizePolicy for UniformSize {
    fn next_size(&self, _side: OrderSide) -> i64 {
        rand::thread_rng().gen_range(self.min..=self.max).max(1)
    }
}

#[derive(Debug, Clone)]
pub struct FixedSize(pub i64);

impl SizePolicy for FixedSize {
    fn next_size(&self, _side: OrderSide) -> i64 {
        self.0.max(1)
    }
}

pub fn size_policy(cfg: &Config) -> Box<dyn SizePolicy> {
    match cfg.size_fixed {
        Some(n) => Box::new(FixedSize(n)),
        None => Box::new(UniformSize { min: cfg.size_min, max: cfg.size_max }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Inside the min-lifetime window: no cancel/place.
    Gated,
    /// Both quotes within cancel threshold of target (or already on target).
    Held,
    /// At least one side was canceled and/or placed.
    Requoted,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Gated => "gated",
            CycleOutcome::Held => "held",
            CycleOutcome::Requoted => "requoted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub target_bid: Decimal,
    pub target_ask: Decimal,
    pub events: Vec<EngineEvent>,
}

pub struct QuotingEngine {
    spread: Decimal,
    min_order_lifetime: Duration,
    cancel_threshold: Decimal,
    sizes: Box<dyn SizePolicy>,
    risk: RiskManager,
}

impl QuotingEngine {
    pub fn new(cfg: &Config, sizes: Box<dyn SizePolicy>) -> Self {
        Self {
            spread: cfg.spread,
            min_order_lifetime: cfg.min_order_lifetime,
            cancel_threshold: cfg.cancel_threshold,
            sizes,
            risk: RiskManager::new(cfg.stop_loss_threshold),
        }
    }

    pub fn targets(&self, q: &Quote) -> (Decimal, Decimal) {
        let mid = q.mid();
        let half = self.spread / Decimal::TWO;
        ((mid - half).round_dp(PRICE_DP), (mid + half).round_dp(PRICE_DP))
    }

    fn gated(&self, st: &TradingState, now: Instant) -> bool {
        st.last_order_at
            .map(|t| now.saturating_duration_since(t) < self.min_order_lifetime)
            .unwrap_or(false)
    }

    fn within_threshold(&self, st: &TradingState, side: OrderSide, target: Decimal) -> bool {
        st.order(side)
            .map(|o| (o.price - target).abs() < self.cancel_threshold)
            .unwrap_or(false)
    }

    /// Runs one full quoting cycle against `q`. Caller holds the state lock.
    pub fn on_quote(&self, st: &mut TradingState, q: &Quote, now: Instant) -> CycleReport {
        let (target_bid, target_ask) = self.targets(q);
        let mut events = Vec::new();

        let outcome = if self.gated(st, now) {
            CycleOutcome::Gated
        } else if self.within_threshold(st, OrderSide::Bid, target_bid)
            && self.within_threshold(st, OrderSide::Ask, target_ask)
        {
            CycleOutcome::Held
        } else {
            let mut touched = false;
            for (side, target) in [(OrderSide::Bid, target_bid), (OrderSide::Ask, target_ask)] {
                touched |= self.requote_side(st, q, side, target, now, &mut events);
            }
            if touched { CycleOutcome::Requoted } else { CycleOutcome::Held }
        };

        self.simulate_fills(st, q, &mut events);

        if let Some(RiskAction::Flatten { size, price }) = self.risk.check(st, q) {
            if let Some(old) = st.cancel(OrderSide::Ask) {
                events.push(EngineEvent::Canceled {
                    side: OrderSide::Ask,
                    price: old.price,
                    size: old.size,
                    marks: marks(st, q.best_bid),
                });
            }
            let fill = st.apply_fill(OrderSide::Ask, price, size);
            st.position = 0;
            events.push(EngineEvent::Flattened { fill, marks: marks(st, q.best_bid) });
        }

        debug_assert!(st.position != 0 || st.avg_cost.is_zero());
        CycleReport { outcome, target_bid, target_ask, events }
    }

    // Cancel-then-place; a side already on target is left alone.
    fn requote_side(
        &self,
        st: &mut TradingState,
        q: &Quote,
        side: OrderSide,
        target: Decimal,
        now: Instant,
        events: &mut Vec<EngineEvent>,
    ) -> bool {
        if st.order(side).map(|o| o.price == target).unwrap_or(false) {
            return false;
        }
        if let Some(old) = st.cancel(side) {
            debug!(
                side = side.as_str(),
                from = %old.price,
                to = %target,
                age_ms = now.saturating_duration_since(old.placed_at).as_millis() as u64,
                "requote"
            );
            events.push(EngineEvent::Canceled {
                side,
                price: old.price,
                size: old.size,
                marks: marks(st, q.best_bid),
            });
        }
        let size = self.sizes.next_size(side);
        st.place(side, target, size, now);
        events.push(EngineEvent::Placed { side, price: target, size, marks: marks(st, q.best_bid) });
        true
    }

    fn simulate_fills(&self, st: &mut TradingState, q: &Quote, events: &mut Vec<EngineEvent>) {
        for side in OrderSide::BOTH {
            let crossed = match (side, st.order(side)) {
                (OrderSide::Bid, Some(o)) => q.best_ask <= o.price,
                (OrderSide::Ask, Some(o)) => q.best_bid >= o.price,
                (_, None) => false,
            };
            if !crossed {
                continue;
            }
            if let Some(o) = st.cancel(side) {
                let fill = st.apply_fill(side, o.price, o.size);
                events.push(EngineEvent::Filled { fill, marks: marks(st, q.best_bid) });
            }
        }
    }
}

/// Delays between quoting cycles.
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub quote_period: Duration,
    pub idle_poll: Duration,
    pub fetch_retry: Duration,
}

impl LoopTiming {
    pub fn from_config(cfg: &Config) -> Self {
        Self { quote_period: cfg.quote_period, idle_poll: cfg.idle_poll, fetch_retry: cfg.fetch_retry }
    }

    fn after(&self, outcome: CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Requoted => self.quote_period,
            CycleOutcome::Gated | CycleOutcome::Held => self.idle_poll,
        }
    }
}

pub async fn run(
    engine: QuotingEngine,
    client: Arc<dyn MarketDataClient>,
    state: SharedState,
    timing: LoopTiming,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let fetched = tokio::select! {
            _ = stopped(&mut shutdown) => break,
            r = client.fetch_quote() => r,
        };

        let delay = match fetched {
            Err(e) => {
                metrics::QUOTE_FETCH.with_label_values(&["quote", e.kind()]).inc();
                warn!(error = %e, "quote fetch failed, skipping cycle");
                timing.fetch_retry
            }
            Ok(q) => {
                metrics::QUOTE_FETCH.with_label_values(&["quote", "ok"]).inc();
                // satu critical section per siklus; tidak ada .await di dalamnya
                let report = {
                    let mut st = state.lock().await;
                    let report = engine.on_quote(&mut st, &q, Instant::now());
                    metrics::observe_state(&st);
                    report
                };
                metrics::CYCLES.with_label_values(&[report.outcome.as_str()]).inc();
                debug!(
                    outcome = report.outcome.as_str(),
                    bid = %q.best_bid,
                    ask = %q.best_ask,
                    mkt_spread = %q.spread(),
                    target_bid = %report.target_bid,
                    target_ask = %report.target_ask,
                    "quote cycle"
                );
                for ev in &report.events {
                    metrics::observe_event(ev);
                    journal::record(ev);
                }
                timing.after(report.outcome)
            }
        };

        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine() -> QuotingEngine {
        QuotingEngine::new(&Config::default(), Box::new(FixedSize(2)))
    }

    fn q(bid: Decimal, ask: Decimal) -> Quote {
        Quote::new(bid, ask)
    }

    fn kinds(r: &CycleReport) -> Vec<&'static str> {
        r.events.iter().map(|e| e.kind()).collect()
    }

    #[test]
    fn targets_round_to_instrument_precision() {
        let e = engine();
        assert_eq!(e.targets(&q(dec!(100.00), dec!(100.10))), (dec!(100.02), dec!(100.08)));
        assert_eq!(e.targets(&q(dec!(99.90), dec!(99.96))), (dec!(99.90), dec!(99.96)));
    }

    #[test]
    fn first_cycle_places_both_sides() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        let r = e.on_quote(&mut st, &q(dec!(100.00), dec!(100.10)), t0);
        assert_eq!(r.outcome, CycleOutcome::Requoted);
        assert_eq!(kinds(&r), ["placed", "placed"]);
        assert_eq!(st.order(OrderSide::Bid).map(|o| o.price), Some(dec!(100.02)));
        assert_eq!(st.order(OrderSide::Ask).map(|o| o.price), Some(dec!(100.08)));
        assert_eq!(st.last_order_at, Some(t0));
        assert_eq!(st.position, 0);
    }

    #[test]
    fn min_lifetime_blocks_requote_on_both_sides() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        e.on_quote(&mut st, &q(dec!(100.00), dec!(100.10)), t0);
        let before = st.clone();

        // target pindah ke 100.08/100.12 tanpa menyilang order lama, tapi belum 5 detik
        let r = e.on_quote(&mut st, &q(dec!(100.05), dec!(100.15)), t0 + Duration::from_secs(4));
        assert_eq!(r.outcome, CycleOutcome::Gated);
        assert!(r.events.is_empty());
        assert_eq!(st, before);
    }

    #[test]
    fn small_drift_is_held_after_lifetime() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        e.on_quote(&mut st, &q(dec!(100.00), dec!(100.10)), t0);
        let before = st.clone();

        // targets 100.03/100.08: bid drift 0.01 < 0.02
        let r = e.on_quote(&mut st, &q(dec!(100.00), dec!(100.11)), t0 + Duration::from_secs(6));
        assert_eq!(r.outcome, CycleOutcome::Held);
        assert!(r.events.is_empty());
        assert_eq!(st, before);
    }

    #[test]
    fn large_drift_cancels_then_places() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        e.on_quote(&mut st, &q(dec!(100.00), dec!(100.10)), t0);

        let t1 = t0 + Duration::from_secs(6);
        let r = e.on_quote(&mut st, &q(dec!(100.20), dec!(100.30)), t1);
        assert_eq!(r.outcome, CycleOutcome::Requoted);
        assert_eq!(kinds(&r), ["canceled", "placed", "canceled", "placed"]);
        assert_eq!(st.order(OrderSide::Bid).map(|o| o.price), Some(dec!(100.22)));
        assert_eq!(st.order(OrderSide::Ask).map(|o| o.price), Some(dec!(100.28)));
        assert_eq!(st.open_orders().count(), 2);
        assert_eq!(st.last_order_at, Some(t1));
    }

    #[test]
    fn only_missing_side_is_placed() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        st.place(OrderSide::Ask, dec!(100.08), 2, t0);
        st.last_order_at = None;

        let r = e.on_quote(&mut st, &q(dec!(100.00), dec!(100.10)), t0);
        assert_eq!(r.outcome, CycleOutcome::Requoted);
        assert_eq!(kinds(&r), ["placed"]);
        assert_eq!(st.order(OrderSide::Bid).map(|o| o.price), Some(dec!(100.02)));
    }

    #[test]
    fn resting_bid_fills_when_ask_crosses() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        e.on_quote(&mut st, &q(dec!(100.00), dec!(100.10)), t0);

        // masih dalam gate; ask pasar turun ke bawah bid kita (100.02)
        let r = e.on_quote(&mut st, &q(dec!(99.90), dec!(99.95)), t0 + Duration::from_secs(1));
        assert_eq!(r.outcome, CycleOutcome::Gated);
        assert_eq!(kinds(&r), ["filled"]);
        assert_eq!(st.position, 2);
        assert_eq!(st.avg_cost, dec!(100.02));
        assert!(st.order(OrderSide::Bid).is_none());
        assert!(st.order(OrderSide::Ask).is_some());
    }

    #[test]
    fn round_trip_realizes_spread() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        e.on_quote(&mut st, &q(dec!(100.00), dec!(100.10)), t0);
        e.on_quote(&mut st, &q(dec!(99.90), dec!(99.95)), t0 + Duration::from_secs(1));
        assert_eq!(st.position, 2);

        // bid pasar naik menembus ask kita (100.08)
        let r = e.on_quote(&mut st, &q(dec!(100.20), dec!(100.25)), t0 + Duration::from_secs(2));
        assert_eq!(kinds(&r), ["filled"]);
        assert_eq!(st.realized_pnl, (dec!(100.08) - dec!(100.02)) * dec!(2));
        assert_eq!(st.position, 0);
        assert_eq!(st.avg_cost, Decimal::ZERO);
        assert_eq!(st.open_orders().count(), 0);
    }

    #[test]
    fn crossed_market_fills_on_placement() {
        let e = engine();
        let mut st = TradingState::default();
        // bid > ask: mid 100.00, target bid 99.98 >= ask 99.95 -> filled langsung
        let r = e.on_quote(&mut st, &q(dec!(100.05), dec!(99.95)), Instant::now());
        assert_eq!(kinds(&r), ["placed", "placed", "filled", "filled"]);
        assert_eq!(st.position, 0);
        assert_eq!(st.avg_cost, Decimal::ZERO);
        // beli 99.98, jual 100.02 dengan ukuran sama
        assert_eq!(st.realized_pnl, dec!(0.08));
        assert_eq!(st.open_orders().count(), 0);
    }

    #[test]
    fn stop_loss_flattens_inside_lifetime_window() {
        let e = engine();
        let mut st = TradingState::default();
        let t0 = Instant::now();
        st.apply_fill(OrderSide::Bid, dec!(100), 10);
        st.place(OrderSide::Ask, dec!(100.50), 2, t0);

        // gate aktif; bid 95 < mid 96.1 - 1
        let r = e.on_quote(&mut st, &q(dec!(95), dec!(97.2)), t0 + Duration::from_millis(10));
        assert_eq!(r.outcome, CycleOutcome::Gated);
        assert_eq!(kinds(&r), ["canceled", "flattened"]);
        assert_eq!(st.position, 0);
        assert_eq!(st.avg_cost, Decimal::ZERO);
        assert_eq!(st.realized_pnl, (dec!(95) - dec!(100)) * dec!(10));
        assert!(st.order(OrderSide::Ask).is_none());
    }

    #[test]
    fn one_order_per_side_and_flat_basis_over_many_cycles() {
        let e = QuotingEngine::new(
            &Config { min_order_lifetime: Duration::ZERO, ..Config::default() },
            Box::new(UniformSize { min: 1, max: 5 }),
        );
        let mut st = TradingState::default();
        let t0 = Instant::now();
        let book = [
            (dec!(100.00), dec!(100.10)),
            (dec!(99.90), dec!(99.95)),
            (dec!(100.20), dec!(100.25)),
            (dec!(100.05), dec!(99.95)),
            (dec!(98.00), dec!(100.40)),
            (dec!(100.01), dec!(100.11)),
        ];
        for i in 0..120u64 {
            let (b, a) = book[(i as usize) % book.len()];
            e.on_quote(&mut st, &q(b, a), t0 + Duration::from_millis(100 * i));
            assert!(st.open_orders().filter(|o| o.side == OrderSide::Bid).count() <= 1);
            assert!(st.open_orders().filter(|o| o.side == OrderSide::Ask).count() <= 1);
            if st.position == 0 {
                assert_eq!(st.avg_cost, Decimal::ZERO);
            }
        }
    }
}
