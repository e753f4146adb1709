use std::collections::HashMap;
use std::sync::RwLock;

use kitforge_core::{AggregateId, DomainError, DomainResult, Quantity};

use kitforge_catalog::PartId;

use crate::item::{StockItem, StockItemId};
use crate::tracking::StockTrackingEntry;

/// Persistence seam for stock items and their audit trail. One instance per
/// tenant.
///
/// `claim` is the concurrency gate for allocation: it must atomically check
/// that the item is unclaimed and record the claimant, so two allocators
/// racing for the same lot cannot both win.
pub trait StockLedger: Send + Sync {
    fn insert(&self, item: StockItem) -> DomainResult<()>;

    fn get(&self, id: StockItemId) -> DomainResult<Option<StockItem>>;

    /// Lots of `part` free for allocation and large enough to cover
    /// `required`, oldest first. Ties on age break on id so the ordering is
    /// total.
    fn available(&self, part: PartId, required: Quantity) -> DomainResult<Vec<StockItem>>;

    /// Atomically claim `stock_item` for `kit_item`. Returns `false` when the
    /// item is already claimed by a different component; re-claiming for the
    /// same component succeeds.
    fn claim(&self, stock_item: StockItemId, kit_item: AggregateId) -> DomainResult<bool>;

    /// Drop the allocation claim on `stock_item`, if any.
    fn release(&self, stock_item: StockItemId) -> DomainResult<()>;

    /// Point `stock_item` at the assembly item it was installed into (or
    /// detach it with `None`).
    fn set_belongs_to(&self, stock_item: StockItemId, parent: Option<StockItemId>)
    -> DomainResult<()>;

    fn add_tracking_entry(&self, entry: StockTrackingEntry) -> DomainResult<()>;

    fn entries_for(&self, stock_item: StockItemId) -> DomainResult<Vec<StockTrackingEntry>>;
}

/// In-memory ledger backed by `RwLock`, for tests and wiring without a
/// database.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    items: RwLock<HashMap<StockItemId, StockItem>>,
    entries: RwLock<Vec<StockTrackingEntry>>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StockLedger for InMemoryStockLedger {
    fn insert(&self, item: StockItem) -> DomainResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        if items.contains_key(&item.id) {
            return Err(DomainError::conflict("stock item already exists"));
        }
        items.insert(item.id, item);
        Ok(())
    }

    fn get(&self, id: StockItemId) -> DomainResult<Option<StockItem>> {
        let items = self
            .items
            .read()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        Ok(items.get(&id).cloned())
    }

    fn available(&self, part: PartId, required: Quantity) -> DomainResult<Vec<StockItem>> {
        let items = self
            .items
            .read()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        let mut found: Vec<StockItem> = items
            .values()
            .filter(|i| i.part == part && i.can_satisfy(required))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    fn claim(&self, stock_item: StockItemId, kit_item: AggregateId) -> DomainResult<bool> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        let item = items.get_mut(&stock_item).ok_or(DomainError::NotFound)?;
        match item.kit_item {
            Some(owner) if owner != kit_item => Ok(false),
            _ => {
                item.kit_item = Some(kit_item);
                Ok(true)
            }
        }
    }

    fn release(&self, stock_item: StockItemId) -> DomainResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        let item = items.get_mut(&stock_item).ok_or(DomainError::NotFound)?;
        item.kit_item = None;
        Ok(())
    }

    fn set_belongs_to(
        &self,
        stock_item: StockItemId,
        parent: Option<StockItemId>,
    ) -> DomainResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        let item = items.get_mut(&stock_item).ok_or(DomainError::NotFound)?;
        item.belongs_to = parent;
        Ok(())
    }

    fn add_tracking_entry(&self, entry: StockTrackingEntry) -> DomainResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        entries.push(entry);
        Ok(())
    }

    fn entries_for(&self, stock_item: StockItemId) -> DomainResult<Vec<StockTrackingEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DomainError::invariant("stock ledger lock poisoned"))?;
        Ok(entries
            .iter()
            .filter(|e| e.stock_item == stock_item)
            .cloned()
            .collect())
    }
}
