//! Build and kit assembly domain module.
//!
//! Kits are assembly jobs raised against a build order: a list of component
//! requirements derived from a bill of materials, each of which gets stock
//! allocated and eventually installed. The [`Kit`] aggregate holds the pure
//! state machine; [`engine::KitEngine`] orchestrates it against the stock
//! ledger.

pub mod build;
pub mod engine;
pub mod kit;
pub mod status;

pub use build::{Build, BuildDirectory, BuildId, InMemoryBuildDirectory};
pub use engine::{AllocationOutcome, AllocationReport, KitEngine, completion_notification_targets};
pub use kit::{
    AddComponent, AssignStock, CancelKit, CompleteKit, ComponentAdded, ComponentInstalled,
    CreateKit, Kit, KitCancelled, KitCommand, KitCompleted, KitCreated, KitEvent, KitId, KitItem,
    KitItemId, RecordInstallation, StockAssigned, components_from_bom,
};
pub use status::KitStatus;
