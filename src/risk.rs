// ===============================
// src/risk.rs
// ===============================
use rust_decimal::Decimal;

use crate::domain::Quote;
use crate::state::TradingState;

#[derive(Debug, Clone, PartialEq)]
pub enum RiskAction {
    /// Sell the whole long position at `price` (best bid), bypassing quote gates.
    Flatten { size: i64, price: Decimal },
}

/// Stop-loss guard: tidak menyimpan state, dievaluasi tiap siklus setelah fill.
#[derive(Debug, Clone)]
pub struct RiskManager {
    pub stop_loss_threshold: Decimal,
}

impl RiskManager {
    pub fn new(stop_loss_threshold: Decimal) -> Self {
        Self { stop_loss_threshold }
    }

    pub fn check(&self, st: &TradingState, q: &Quote) -> Option<RiskAction> {
        if st.position <= 0 {
            return None;
        }
        if q.best_bid < q.mid() - self.stop_loss_threshold {
            return Some(RiskAction::Flatten { size: st.position, price: q.best_bid });
        }
        None
    }
}
