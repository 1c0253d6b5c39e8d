// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::Instant;

/// Snapshot best bid/ask dari market data source.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub bid_size: Option<Decimal>,
    pub ask_size: Option<Decimal>,
}

impl Quote {
    pub fn new(best_bid: Decimal, best_ask: Decimal) -> Self {
        Self { best_bid, best_ask, bid_size: None, ask_size: None }
    }

    pub fn mid(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }

    /// Market spread; a crossed or locked book reports zero.
    pub fn spread(&self) -> Decimal {
        (self.best_ask - self.best_bid).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide { Bid, Ask }

impl OrderSide {
    pub const BOTH: [OrderSide; 2] = [OrderSide::Bid, OrderSide::Ask];

    pub fn as_str(&self) -> &'static str {
        match self { OrderSide::Bid => "bid", OrderSide::Ask => "ask" }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestingOrder {
    pub side: OrderSide,
    pub price: Decimal,
    pub size: i64,
    pub placed_at: Instant,
}

/// Simulated execution. `realized_delta` is zero for bid fills.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub side: OrderSide,
    pub price: Decimal,
    pub size: i64,
    pub realized_delta: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PnlRecord {
    pub ts: DateTime<Utc>,
    pub position: i64,
    pub avg_cost: Decimal,
    pub realized: Decimal,
    /// None while flat or short: nothing to mark.
    pub unrealized: Option<Decimal>,
    pub total: Option<Decimal>,
}

/// Inventory and PnL right after a transition, marked at best bid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Marks {
    pub position: i64,
    pub avg_cost: Decimal,
    pub realized: Decimal,
    pub unrealized: Decimal,
    pub total: Decimal,
}

/// One line of output per state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Placed { side: OrderSide, price: Decimal, size: i64, #[serde(flatten)] marks: Marks },
    Canceled { side: OrderSide, price: Decimal, size: i64, #[serde(flatten)] marks: Marks },
    Filled { #[serde(flatten)] fill: Fill, #[serde(flatten)] marks: Marks },
    Flattened { #[serde(flatten)] fill: Fill, #[serde(flatten)] marks: Marks },
    Pnl(PnlRecord),
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Placed { .. } => "placed",
            EngineEvent::Canceled { .. } => "canceled",
            EngineEvent::Filled { .. } => "filled",
            EngineEvent::Flattened { .. } => "flattened",
            EngineEvent::Pnl(_) => "pnl",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mid_and_spread() {
        let q = Quote::new(dec!(100.00), dec!(100.10));
        assert_eq!(q.mid(), dec!(100.05));
        assert_eq!(q.spread(), dec!(0.10));
    }

    #[test]
    fn crossed_market_spread_is_zero() {
        let q = Quote::new(dec!(100.10), dec!(100.00));
        assert_eq!(q.spread(), Decimal::ZERO);
        assert_eq!(q.mid(), dec!(100.05));
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let ev = EngineEvent::Placed { side: OrderSide::Bid, price: dec!(99.97), size: 3, marks: Marks::default() };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "placed");
        assert_eq!(v["side"], "bid");
        assert_eq!(v["position"], 0);
        assert_eq!(ev.kind(), "placed");
    }
}
