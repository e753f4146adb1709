use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kitforge_catalog::PartId;
use kitforge_core::{AggregateId, Quantity};

/// Stock item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Condition of a stock item. Only some states count as usable inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Ok,
    AttentionNeeded,
    Damaged,
    Destroyed,
    Rejected,
    Lost,
    Quarantined,
}

impl StockStatus {
    /// Whether items in this state are eligible for allocation.
    pub fn in_stock(self) -> bool {
        matches!(
            self,
            StockStatus::Ok | StockStatus::AttentionNeeded | StockStatus::Damaged
        )
    }
}

/// A discrete lot of one part sitting in inventory.
///
/// `kit_item` is the allocation claim: while set, the lot is reserved for one
/// kit component and invisible to [`StockLedger::available`]. `belongs_to`
/// points at the assembly item this lot was physically installed into.
///
/// [`StockLedger::available`]: crate::ledger::StockLedger::available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub part: PartId,
    pub quantity: Quantity,
    pub status: StockStatus,
    pub kit_item: Option<AggregateId>,
    pub belongs_to: Option<StockItemId>,
    pub created_at: DateTime<Utc>,
}

impl StockItem {
    pub fn new(
        id: StockItemId,
        part: PartId,
        quantity: Quantity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            part,
            quantity,
            status: StockStatus::Ok,
            kit_item: None,
            belongs_to: None,
            created_at,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.kit_item.is_some()
    }

    pub fn is_installed(&self) -> bool {
        self.belongs_to.is_some()
    }

    /// Free for allocation: usable condition, unclaimed, not installed
    /// anywhere, and holding at least `required` units.
    pub fn can_satisfy(&self, required: Quantity) -> bool {
        self.status.in_stock()
            && !self.is_claimed()
            && !self.is_installed()
            && self.quantity.meets(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: Quantity) -> StockItem {
        StockItem::new(
            StockItemId::new(AggregateId::new()),
            PartId::new(AggregateId::new()),
            quantity,
            Utc::now(),
        )
    }

    #[test]
    fn fresh_item_can_satisfy_smaller_requirement() {
        let item = item(Quantity::new(dec!(5)).unwrap());
        assert!(item.can_satisfy(Quantity::new(dec!(3)).unwrap()));
        assert!(item.can_satisfy(Quantity::new(dec!(5)).unwrap()));
        assert!(!item.can_satisfy(Quantity::new(dec!(6)).unwrap()));
    }

    #[test]
    fn claimed_item_is_not_available() {
        let mut item = item(Quantity::new(dec!(5)).unwrap());
        item.kit_item = Some(AggregateId::new());
        assert!(!item.can_satisfy(Quantity::ONE));
    }

    #[test]
    fn installed_item_is_not_available() {
        let mut item = item(Quantity::new(dec!(5)).unwrap());
        item.belongs_to = Some(StockItemId::new(AggregateId::new()));
        assert!(!item.can_satisfy(Quantity::ONE));
    }

    #[test]
    fn out_of_stock_statuses_are_excluded() {
        let mut item = item(Quantity::new(dec!(5)).unwrap());
        for status in [
            StockStatus::Destroyed,
            StockStatus::Rejected,
            StockStatus::Lost,
            StockStatus::Quarantined,
        ] {
            item.status = status;
            assert!(!item.can_satisfy(Quantity::ONE), "{status:?}");
        }
        item.status = StockStatus::Damaged;
        assert!(item.can_satisfy(Quantity::ONE));
    }
}
