//! Stock domain module.
//!
//! Stock items, their allocation claims, and the tracking ledger that records
//! every allocation and installation against an item. No IO and no storage;
//! persistence sits behind the [`StockLedger`] trait.

pub mod item;
pub mod ledger;
pub mod tracking;

pub use item::{StockItem, StockItemId, StockStatus};
pub use ledger::{InMemoryStockLedger, StockLedger};
pub use tracking::{StockHistoryCode, StockTrackingEntry, TrackingDeltas};
