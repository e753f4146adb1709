//! Read model projections fed from published event envelopes.

mod kit_status;
mod order_book;

pub use kit_status::{KitStatusProjection, KitStatusProjectionError, KitStatusReadModel};
pub use order_book::{
    OrderBookEntry, OrderBookLine, OrderBookProjection, OrderBookProjectionError,
};
