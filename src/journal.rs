// ===============================
// src/journal.rs
// ===============================
use tracing::info;

use crate::domain::EngineEvent;

pub fn record(ev: &EngineEvent) {
    match ev {
        EngineEvent::Placed { side, price, size, marks: m }
        | EngineEvent::Canceled { side, price, size, marks: m } => info!(
            event = ev.kind(),
            side = side.as_str(),
            price = %price,
            size = *size,
            position = m.position,
            realized = %m.realized,
            unrealized = %m.unrealized,
            total = %m.total,
            "ORDER"
        ),
        EngineEvent::Filled { fill, marks: m } | EngineEvent::Flattened { fill, marks: m } => info!(
            event = ev.kind(),
            side = fill.side.as_str(),
            price = %fill.price,
            size = fill.size,
            position = m.position,
            avg_cost = %m.avg_cost,
            realized_delta = %fill.realized_delta,
            realized = %m.realized,
            unrealized = %m.unrealized,
            total = %m.total,
            "FILL"
        ),
        EngineEvent::Pnl(rec) => match (rec.unrealized, rec.total) {
            (Some(u), Some(t)) => info!(
                event = "pnl",
                position = rec.position,
                avg_cost = %rec.avg_cost,
                realized = %rec.realized,
                unrealized = %u,
                total = %t,
                "PNL"
            ),
            _ => info!(event = "pnl", position = rec.position, realized = %rec.realized, "PNL"),
        },
    }
}
