use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kitforge_core::{AggregateId, Quantity, UserId};

use crate::item::StockItemId;

/// Classification of a tracking entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockHistoryCode {
    KitAllocation,
    KitComponentInstalled,
}

impl StockHistoryCode {
    pub fn label(self) -> &'static str {
        match self {
            StockHistoryCode::KitAllocation => "Allocated to kit",
            StockHistoryCode::KitComponentInstalled => "Installed into assembly",
        }
    }
}

/// Cross-references recorded alongside a tracking entry, pointing back at the
/// kit and kit component the movement belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingDeltas {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit: Option<AggregateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit_item: Option<AggregateId>,
}

/// One row of a stock item's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTrackingEntry {
    pub id: AggregateId,
    pub stock_item: StockItemId,
    pub code: StockHistoryCode,
    pub user: UserId,
    /// Quantity held by the item when the entry was written.
    pub quantity: Quantity,
    pub deltas: TrackingDeltas,
    pub occurred_at: DateTime<Utc>,
}

impl StockTrackingEntry {
    pub fn new(
        stock_item: StockItemId,
        code: StockHistoryCode,
        user: UserId,
        quantity: Quantity,
        deltas: TrackingDeltas,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AggregateId::new(),
            stock_item,
            code,
            user,
            quantity,
            deltas,
            occurred_at,
        }
    }
}
