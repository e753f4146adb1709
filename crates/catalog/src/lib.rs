//! Part catalog domain module (event-sourced).
//!
//! Parts, their bills of materials, and per-part notification subscriptions,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod bom;
pub mod directory;
pub mod part;

pub use bom::{BomCatalog, BomLine, BomLineId, InMemoryBomCatalog};
pub use directory::{InMemoryPartDirectory, PartDirectory, PartRecord};
pub use part::{
    CreatePart, Part, PartCommand, PartCreated, PartEvent, PartId, PartSubscribed,
    PartUnsubscribed, SubscribeToPart, UnsubscribeFromPart,
};
