//! Background workers driving subscribers off the event bus.

mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
