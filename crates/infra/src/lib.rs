//! Infrastructure layer: event persistence, command dispatch, projections,
//! background workers, and notification delivery.
//!
//! Everything here composes the domain crates through traits; the concrete
//! implementations are in-memory and suitable for tests and embedding. A
//! database-backed event store or read model slots in behind the same traits.

pub mod command_dispatcher;
pub mod event_store;
pub mod notify;
pub mod projections;
pub mod read_model;
pub mod workers;
