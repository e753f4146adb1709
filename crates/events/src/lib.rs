//! `kitforge-events`: event and pub/sub abstractions.
//!
//! Domain modules emit typed events; infrastructure moves them around.
//! Nothing in this crate performs IO.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::InMemoryEventBus;
pub use tenant::TenantScoped;
