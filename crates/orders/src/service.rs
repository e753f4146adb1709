use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;

use kitforge_core::{DomainError, DomainResult, Quantity, UserId};
use kitforge_events::execute;
use kitforge_stock::StockLedger;

use crate::order::{EditLine, LineEditPolicy, OrderEvent, SalesOrder, SalesOrderCommand};

/// Operational result of a line edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit was applied to the line.
    Edited,
    /// The edit is parked awaiting approval.
    PendingApproval,
    /// A quantity increase could not be covered by available stock; nothing
    /// changed.
    InsufficientStock,
}

/// Applies line edits with the stock-availability gate in front of the
/// aggregate: a quantity increase is only dispatched when free stock covers
/// the additional demand.
pub struct LineEditService {
    ledger: Arc<dyn StockLedger>,
    policy: LineEditPolicy,
}

impl LineEditService {
    pub fn new(ledger: Arc<dyn StockLedger>, policy: LineEditPolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn edit_line(
        &self,
        order: &mut SalesOrder,
        line_no: u32,
        quantity: Quantity,
        unit_price: Decimal,
        user: UserId,
    ) -> DomainResult<(EditOutcome, Vec<OrderEvent>)> {
        let tenant_id = order
            .tenant_id()
            .ok_or_else(|| DomainError::invariant("order not created"))?;
        let line = order.line(line_no).ok_or(DomainError::NotFound)?;

        let increase = quantity.saturating_sub(line.quantity);
        if !increase.is_zero() {
            let free: Decimal = self
                .ledger
                .available(line.part, Quantity::ZERO)?
                .iter()
                .map(|i| i.quantity.value())
                .sum();
            if free < increase.value() {
                debug!(
                    order = %order.id_typed(),
                    line_no,
                    required = %increase,
                    available = %free,
                    "line edit blocked by stock shortfall"
                );
                return Ok((EditOutcome::InsufficientStock, vec![]));
            }
        }

        let events = execute(
            order,
            &SalesOrderCommand::EditLine(EditLine {
                tenant_id,
                order_id: order.id_typed(),
                line_no,
                quantity,
                unit_price,
                policy: self.policy,
                user,
                occurred_at: Utc::now(),
            }),
        )?;

        let outcome = match events.first() {
            Some(OrderEvent::LineEditRequested(_)) => EditOutcome::PendingApproval,
            _ => EditOutcome::Edited,
        };
        Ok((outcome, events))
    }
}
