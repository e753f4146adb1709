//! Sales order domain module (event-sourced).
//!
//! Order lines with priced edits: small changes apply immediately, large
//! price swings park as a pending edit until someone approves them. The
//! stock-availability gate for quantity increases lives in
//! [`service::LineEditService`]. Cancelled orders stay on file for the audit
//! trail but stop accepting edits and drop out of demand until reopened.

pub mod order;
pub mod service;

pub use order::{
    ApproveLineEdit, CancelOrder, CreateOrder, EditLine, LineEditApproved, LineEditPolicy,
    LineEditRejected, LineEditRequested, LineEdited, OrderCancelled, OrderCreated, OrderEvent,
    OrderLine, OrderReopened, OrderStatus, PendingEdit, RejectLineEdit, ReopenOrder, SalesOrder,
    SalesOrderCommand, SalesOrderId,
};
pub use service::{EditOutcome, LineEditService};
