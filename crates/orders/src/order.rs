use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kitforge_catalog::PartId;
use kitforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Quantity, TenantId, UserId};
use kitforge_events::Event;

/// Sales order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderId(pub AggregateId);

impl SalesOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One priced line of a sales order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub part: PartId,
    pub quantity: Quantity,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn subtotal(&self) -> Decimal {
        self.quantity.value() * self.unit_price
    }
}

/// Lifecycle of a sales order. Cancelled orders keep their lines but are
/// excluded from demand calculations until reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Cancelled,
}

impl OrderStatus {
    pub fn is_cancelled(self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }
}

/// An edit awaiting approval. At most one per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub line_no: u32,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
}

/// When a line edit needs a second pair of eyes: any relative price change
/// beyond `approval_threshold` (e.g. `0.10` for 10%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEditPolicy {
    pub approval_threshold: Decimal,
}

impl Default for LineEditPolicy {
    fn default() -> Self {
        Self {
            // 10% relative price delta.
            approval_threshold: Decimal::new(1, 1),
        }
    }
}

impl LineEditPolicy {
    /// Whether moving from `old` to `new` exceeds the threshold. A change
    /// away from a zero price always requires approval (no relative base).
    pub fn requires_approval(&self, old: Decimal, new: Decimal) -> bool {
        if old == new {
            return false;
        }
        if old.is_zero() {
            return true;
        }
        let delta = (new - old).abs() / old.abs();
        delta > self.approval_threshold
    }
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: Option<TenantId>,
    reference: String,
    lines: Vec<OrderLine>,
    pending_edits: Vec<PendingEdit>,
    status: OrderStatus,
    version: u64,
    created: bool,
}

impl SalesOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: String::new(),
            lines: Vec::new(),
            pending_edits: Vec::new(),
            status: OrderStatus::Open,
            version: 0,
            created: false,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn pending_edit(&self, line_no: u32) -> Option<&PendingEdit> {
        self.pending_edits.iter().find(|e| e.line_no == line_no)
    }

    /// Order total, recalculated from the lines on every read.
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(OrderLine::subtotal).sum()
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reference: String,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditLine. The policy is resolved by the caller and travels with
/// the command so the decision is replayable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLine {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub policy: LineEditPolicy,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveLineEdit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveLineEdit {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectLineEdit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectLineEdit {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder. Lines are kept for the audit trail; the order just
/// stops counting towards demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReopenOrder. Undoes a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    CreateOrder(CreateOrder),
    EditLine(EditLine),
    ApproveLineEdit(ApproveLineEdit),
    RejectLineEdit(RejectLineEdit),
    CancelOrder(CancelOrder),
    ReopenOrder(ReopenOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reference: String,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineEdited. The edit took effect immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEdited {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineEditRequested. The edit is parked until approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEditRequested {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub requested_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineEditApproved. Carries the applied values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEditApproved {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineEditRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEditRejected {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub rejected_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReopened {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reopened_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    LineEdited(LineEdited),
    LineEditRequested(LineEditRequested),
    LineEditApproved(LineEditApproved),
    LineEditRejected(LineEditRejected),
    OrderCancelled(OrderCancelled),
    OrderReopened(OrderReopened),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.sales_order.created",
            OrderEvent::LineEdited(_) => "orders.sales_order.line_edited",
            OrderEvent::LineEditRequested(_) => "orders.sales_order.line_edit_requested",
            OrderEvent::LineEditApproved(_) => "orders.sales_order.line_edit_approved",
            OrderEvent::LineEditRejected(_) => "orders.sales_order.line_edit_rejected",
            OrderEvent::OrderCancelled(_) => "orders.sales_order.cancelled",
            OrderEvent::OrderReopened(_) => "orders.sales_order.reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::LineEdited(e) => e.occurred_at,
            OrderEvent::LineEditRequested(e) => e.occurred_at,
            OrderEvent::LineEditApproved(e) => e.occurred_at,
            OrderEvent::LineEditRejected(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderReopened(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.lines = e.lines.clone();
                self.created = true;
            }
            OrderEvent::LineEdited(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.quantity = e.quantity;
                    line.unit_price = e.unit_price;
                }
            }
            OrderEvent::LineEditRequested(e) => {
                self.pending_edits.push(PendingEdit {
                    line_no: e.line_no,
                    quantity: e.quantity,
                    unit_price: e.unit_price,
                    requested_by: e.requested_by,
                    requested_at: e.occurred_at,
                });
            }
            OrderEvent::LineEditApproved(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.quantity = e.quantity;
                    line.unit_price = e.unit_price;
                }
                self.pending_edits.retain(|p| p.line_no != e.line_no);
            }
            OrderEvent::LineEditRejected(e) => {
                self.pending_edits.retain(|p| p.line_no != e.line_no);
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::OrderReopened(_) => {
                self.status = OrderStatus::Open;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            SalesOrderCommand::EditLine(cmd) => self.handle_edit(cmd),
            SalesOrderCommand::ApproveLineEdit(cmd) => self.handle_approve(cmd),
            SalesOrderCommand::RejectLineEdit(cmd) => self.handle_reject(cmd),
            SalesOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            SalesOrderCommand::ReopenOrder(cmd) => self.handle_reopen(cmd),
        }
    }
}

impl SalesOrder {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: SalesOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_cancelled() {
            return Err(DomainError::conflict("order is cancelled"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::field("reference", "reference cannot be empty"));
        }

        let mut seen = Vec::new();
        for line in &cmd.lines {
            if line.quantity.is_zero() {
                return Err(DomainError::field("quantity", "quantity must be positive"));
            }
            if seen.contains(&line.line_no) {
                return Err(DomainError::field("line_no", "duplicate line number"));
            }
            seen.push(line.line_no);
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            reference: cmd.reference.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditLine) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_open()?;

        let line = self.line(cmd.line_no).ok_or(DomainError::NotFound)?;

        if cmd.quantity.is_zero() {
            return Err(DomainError::field("quantity", "quantity must be positive"));
        }
        if self.pending_edit(cmd.line_no).is_some() {
            return Err(DomainError::conflict("line already has a pending edit"));
        }

        if cmd.policy.requires_approval(line.unit_price, cmd.unit_price) {
            return Ok(vec![OrderEvent::LineEditRequested(LineEditRequested {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line_no: cmd.line_no,
                quantity: cmd.quantity,
                unit_price: cmd.unit_price,
                requested_by: cmd.user,
                occurred_at: cmd.occurred_at,
            })]);
        }

        Ok(vec![OrderEvent::LineEdited(LineEdited {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            user: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveLineEdit) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_open()?;

        let pending = self
            .pending_edit(cmd.line_no)
            .ok_or_else(|| DomainError::conflict("no pending edit for this line"))?;

        Ok(vec![OrderEvent::LineEditApproved(LineEditApproved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            quantity: pending.quantity,
            unit_price: pending.unit_price,
            approved_by: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectLineEdit) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_open()?;

        if self.pending_edit(cmd.line_no).is_none() {
            return Err(DomainError::conflict("no pending edit for this line"));
        }

        Ok(vec![OrderEvent::LineEditRejected(LineEditRejected {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            rejected_by: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        if self.status.is_cancelled() {
            return Err(DomainError::conflict("order already cancelled"));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            cancelled_by: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;
        if !self.status.is_cancelled() {
            return Err(DomainError::conflict("order is not cancelled"));
        }

        Ok(vec![OrderEvent::OrderReopened(OrderReopened {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            reopened_by: cmd.user,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitforge_events::execute;
    use rust_decimal_macros::dec;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_order_id() -> SalesOrderId {
        SalesOrderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn qty(d: rust_decimal::Decimal) -> Quantity {
        Quantity::new(d).unwrap()
    }

    fn order_with_line(unit_price: Decimal) -> (SalesOrder, TenantId) {
        let tenant_id = test_tenant_id();
        let order_id = test_order_id();
        let mut order = SalesOrder::empty(order_id);
        execute(
            &mut order,
            &SalesOrderCommand::CreateOrder(CreateOrder {
                tenant_id,
                order_id,
                reference: "SO-0001".to_string(),
                lines: vec![OrderLine {
                    line_no: 1,
                    part: PartId::new(AggregateId::new()),
                    quantity: qty(dec!(4)),
                    unit_price,
                }],
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (order, tenant_id)
    }

    fn edit_cmd(
        order: &SalesOrder,
        tenant_id: TenantId,
        quantity: Quantity,
        unit_price: Decimal,
    ) -> SalesOrderCommand {
        SalesOrderCommand::EditLine(EditLine {
            tenant_id,
            order_id: order.id_typed(),
            line_no: 1,
            quantity,
            unit_price,
            policy: LineEditPolicy::default(),
            user: UserId::new(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn total_is_sum_of_line_subtotals() {
        let tenant_id = test_tenant_id();
        let order_id = test_order_id();
        let mut order = SalesOrder::empty(order_id);
        execute(
            &mut order,
            &SalesOrderCommand::CreateOrder(CreateOrder {
                tenant_id,
                order_id,
                reference: "SO-0002".to_string(),
                lines: vec![
                    OrderLine {
                        line_no: 1,
                        part: PartId::new(AggregateId::new()),
                        quantity: qty(dec!(2)),
                        unit_price: dec!(10.00),
                    },
                    OrderLine {
                        line_no: 2,
                        part: PartId::new(AggregateId::new()),
                        quantity: qty(dec!(3)),
                        unit_price: dec!(5.50),
                    },
                ],
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(order.total(), dec!(36.50));
    }

    #[test]
    fn small_price_change_applies_immediately() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = edit_cmd(&order, tenant_id, qty(dec!(4)), dec!(105));
        let events = execute(
            &mut order,
            &cmd,
        )
        .unwrap();

        assert!(matches!(events[0], OrderEvent::LineEdited(_)));
        assert_eq!(order.line(1).unwrap().unit_price, dec!(105));
        assert_eq!(order.total(), dec!(420));
    }

    #[test]
    fn edit_recalculates_total_for_quantity_change() {
        let (mut order, tenant_id) = order_with_line(dec!(10));
        let cmd = edit_cmd(&order, tenant_id, qty(dec!(7)), dec!(10));
        execute(
            &mut order,
            &cmd,
        )
        .unwrap();
        assert_eq!(order.total(), dec!(70));
    }

    #[test]
    fn large_price_change_parks_as_pending() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = edit_cmd(&order, tenant_id, qty(dec!(4)), dec!(150));
        let events = execute(
            &mut order,
            &cmd,
        )
        .unwrap();

        assert!(matches!(events[0], OrderEvent::LineEditRequested(_)));
        // Not applied yet.
        assert_eq!(order.line(1).unwrap().unit_price, dec!(100));
        assert!(order.pending_edit(1).is_some());
    }

    #[test]
    fn price_drop_beyond_threshold_also_needs_approval() {
        let (order, tenant_id) = order_with_line(dec!(100));
        let events = order
            .handle(&edit_cmd(&order, tenant_id, qty(dec!(4)), dec!(80)))
            .unwrap();
        assert!(matches!(events[0], OrderEvent::LineEditRequested(_)));
    }

    #[test]
    fn change_from_zero_price_needs_approval() {
        let (order, tenant_id) = order_with_line(dec!(0));
        let events = order
            .handle(&edit_cmd(&order, tenant_id, qty(dec!(4)), dec!(1)))
            .unwrap();
        assert!(matches!(events[0], OrderEvent::LineEditRequested(_)));
    }

    #[test]
    fn only_one_pending_edit_per_line() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = edit_cmd(&order, tenant_id, qty(dec!(4)), dec!(150));
        execute(
            &mut order,
            &cmd,
        )
        .unwrap();

        let err = order
            .handle(&edit_cmd(&order, tenant_id, qty(dec!(4)), dec!(160)))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict on second pending edit"),
        }
    }

    #[test]
    fn approval_applies_pending_values() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = edit_cmd(&order, tenant_id, qty(dec!(6)), dec!(150));
        execute(
            &mut order,
            &cmd,
        )
        .unwrap();

        let order_id = order.id_typed();
        execute(
            &mut order,
            &SalesOrderCommand::ApproveLineEdit(ApproveLineEdit {
                tenant_id,
                order_id,
                line_no: 1,
                user: UserId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let line = order.line(1).unwrap();
        assert_eq!(line.unit_price, dec!(150));
        assert_eq!(line.quantity, qty(dec!(6)));
        assert!(order.pending_edit(1).is_none());
        assert_eq!(order.total(), dec!(900));
    }

    #[test]
    fn rejection_discards_pending_edit() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = edit_cmd(&order, tenant_id, qty(dec!(6)), dec!(150));
        execute(
            &mut order,
            &cmd,
        )
        .unwrap();

        let order_id = order.id_typed();
        execute(
            &mut order,
            &SalesOrderCommand::RejectLineEdit(RejectLineEdit {
                tenant_id,
                order_id,
                line_no: 1,
                user: UserId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let line = order.line(1).unwrap();
        assert_eq!(line.unit_price, dec!(100));
        assert_eq!(line.quantity, qty(dec!(4)));
        assert!(order.pending_edit(1).is_none());
    }

    #[test]
    fn approve_without_pending_is_conflict() {
        let (order, tenant_id) = order_with_line(dec!(100));
        let err = order
            .handle(&SalesOrderCommand::ApproveLineEdit(ApproveLineEdit {
                tenant_id,
                order_id: order.id_typed(),
                line_no: 1,
                user: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict without a pending edit"),
        }
    }

    #[test]
    fn edit_rejects_zero_quantity() {
        let (order, tenant_id) = order_with_line(dec!(100));
        let err = order
            .handle(&edit_cmd(&order, tenant_id, Quantity::ZERO, dec!(100)))
            .unwrap_err();
        match err {
            DomainError::FieldValidation { field, .. } => assert_eq!(field, "quantity"),
            _ => panic!("Expected FieldValidation on quantity"),
        }
    }

    #[test]
    fn edit_unknown_line_is_not_found() {
        let (order, tenant_id) = order_with_line(dec!(100));
        let err = order
            .handle(&SalesOrderCommand::EditLine(EditLine {
                tenant_id,
                order_id: order.id_typed(),
                line_no: 99,
                quantity: qty(dec!(1)),
                unit_price: dec!(100),
                policy: LineEditPolicy::default(),
                user: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    fn cancel_cmd(order: &SalesOrder, tenant_id: TenantId) -> SalesOrderCommand {
        SalesOrderCommand::CancelOrder(CancelOrder {
            tenant_id,
            order_id: order.id_typed(),
            user: UserId::new(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn cancellation_flips_status_and_keeps_lines() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = cancel_cmd(&order, tenant_id);
        let events = execute(&mut order, &cmd).unwrap();

        assert!(matches!(events[0], OrderEvent::OrderCancelled(_)));
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.lines().len(), 1);
        assert_eq!(order.total(), dec!(400));
    }

    #[test]
    fn cancelling_twice_is_conflict() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = cancel_cmd(&order, tenant_id);
        execute(&mut order, &cmd).unwrap();

        let err = order.handle(&cancel_cmd(&order, tenant_id)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn edits_are_rejected_on_a_cancelled_order() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = cancel_cmd(&order, tenant_id);
        execute(&mut order, &cmd).unwrap();

        let err = order
            .handle(&edit_cmd(&order, tenant_id, qty(dec!(5)), dec!(100)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(order.line(1).unwrap().quantity, qty(dec!(4)));
    }

    #[test]
    fn reopening_restores_editability() {
        let (mut order, tenant_id) = order_with_line(dec!(100));
        let cmd = cancel_cmd(&order, tenant_id);
        execute(&mut order, &cmd).unwrap();
        let order_id = order.id_typed();
        execute(
            &mut order,
            &SalesOrderCommand::ReopenOrder(ReopenOrder {
                tenant_id,
                order_id,
                user: UserId::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(order.status(), OrderStatus::Open);
        let cmd = edit_cmd(&order, tenant_id, qty(dec!(5)), dec!(100));
        execute(
            &mut order,
            &cmd,
        )
        .unwrap();
        assert_eq!(order.line(1).unwrap().quantity, qty(dec!(5)));
    }

    #[test]
    fn reopening_an_open_order_is_conflict() {
        let (order, tenant_id) = order_with_line(dec!(100));
        let err = order
            .handle(&SalesOrderCommand::ReopenOrder(ReopenOrder {
                tenant_id,
                order_id: order.id_typed(),
                user: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let policy = LineEditPolicy::default();
        // Exactly 10% does not require approval; just over does.
        assert!(!policy.requires_approval(dec!(100), dec!(110)));
        assert!(policy.requires_approval(dec!(100), dec!(110.01)));
        assert!(!policy.requires_approval(dec!(100), dec!(100)));
    }
}
