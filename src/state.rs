// ===============================
// src/state.rs (inventory, average cost, realized PnL, open quotes)
// ===============================
//
// Semua mutasi lewat method di sini supaya akuntansi konsisten.
// Dibagi antar task sebagai SharedState (Arc<Mutex<_>>); guard tidak boleh
// ditahan melewati .await.
//

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::{Fill, OrderSide, RestingOrder};

pub type SharedState = Arc<Mutex<TradingState>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingState {
    bid: Option<RestingOrder>,
    ask: Option<RestingOrder>,
    pub position: i64,
    pub avg_cost: Decimal,
    pub realized_pnl: Decimal,
    /// Unset until the first placement.
    pub last_order_at: Option<Instant>,
}

impl TradingState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(TradingState::default()))
    }

    pub fn order(&self, side: OrderSide) -> Option<&RestingOrder> {
        match side {
            OrderSide::Bid => self.bid.as_ref(),
            OrderSide::Ask => self.ask.as_ref(),
        }
    }

    fn slot(&mut self, side: OrderSide) -> &mut Option<RestingOrder> {
        match side {
            OrderSide::Bid => &mut self.bid,
            OrderSide::Ask => &mut self.ask,
        }
    }

    /// Removes and returns the order resting on `side`.
    pub fn cancel(&mut self, side: OrderSide) -> Option<RestingOrder> {
        self.slot(side).take()
    }

    /// Rests a new order on an empty side and stamps the requote clock.
    pub fn place(&mut self, side: OrderSide, price: Decimal, size: i64, now: Instant) {
        debug_assert!(size > 0, "order size must be positive");
        let slot = self.slot(side);
        debug_assert!(slot.is_none(), "{side:?} already has a resting order");
        *slot = Some(RestingOrder { side, price, size, placed_at: now });
        self.last_order_at = Some(now);
    }

    /// Books an execution against inventory.
    ///
    /// Bid: weighted average cost, or a fresh basis at the fill price when
    /// coming from flat/short. Ask: realizes `(price - avg_cost) * size` on
    /// the pre-fill basis. Cost basis resets whenever position ends <= 0.
    pub fn apply_fill(&mut self, side: OrderSide, price: Decimal, size: i64) -> Fill {
        let prev = self.position;
        let mut realized_delta = Decimal::ZERO;
        match side {
            OrderSide::Bid => {
                let next = prev + size;
                self.avg_cost = if next <= 0 {
                    Decimal::ZERO
                } else if prev <= 0 {
                    price
                } else {
                    (self.avg_cost * Decimal::from(prev) + price * Decimal::from(size)) / Decimal::from(next)
                };
                self.position = next;
            }
            OrderSide::Ask => {
                realized_delta = (price - self.avg_cost) * Decimal::from(size);
                self.realized_pnl += realized_delta;
                self.position = prev - size;
                if self.position <= 0 {
                    self.avg_cost = Decimal::ZERO;
                }
            }
        }
        debug_assert!(self.position != 0 || self.avg_cost.is_zero());
        Fill { side, price, size, realized_delta }
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.bid.iter().chain(self.ask.iter())
    }
}
