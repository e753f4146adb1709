use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use kitforge_catalog::PartId;
use kitforge_core::{AggregateId, DomainError, Quantity, TenantId};
use kitforge_events::EventEnvelope;
use kitforge_orders::{OrderEvent, OrderStatus};

use crate::read_model::TenantStore;

const ORDER_AGGREGATE_TYPE: &str = "orders.sales_order";

/// One order as the demand book sees it: its current lines and whether it
/// still counts. Cancelled orders are kept so reconciliation reports can show
/// them alongside active demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookEntry {
    pub order_id: AggregateId,
    pub reference: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderBookLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookLine {
    pub line_no: u32,
    pub part: PartId,
    pub quantity: Quantity,
}

impl OrderBookEntry {
    /// Cancelled entries stay listed but contribute nothing to on-order
    /// quantities.
    pub fn excluded_from_demand(&self) -> bool {
        self.status.is_cancelled()
    }
}

#[derive(Debug, Error)]
pub enum OrderBookProjectionError {
    #[error("payload deserialization failed: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence (last {last}, found {found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("no order book entry for order {0}")]
    MissingEntry(AggregateId),

    #[error("read model store error: {0}")]
    Store(#[from] DomainError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Builds [`OrderBookEntry`] records from sales order event envelopes and
/// answers on-order demand queries over them.
///
/// Same delivery contract as the kit status projection: at-least-once with
/// idempotent application, and a sequence gap means rebuild.
pub struct OrderBookProjection<S> {
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> OrderBookProjection<S>
where
    S: TenantStore<AggregateId, OrderBookEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        order_id: AggregateId,
    ) -> Result<Option<OrderBookEntry>, OrderBookProjectionError> {
        Ok(self.store.get(tenant_id, &order_id)?)
    }

    /// Total quantity on order for one part, counting open orders only.
    pub fn on_order(
        &self,
        tenant_id: TenantId,
        part: PartId,
    ) -> Result<Quantity, OrderBookProjectionError> {
        let mut total = Decimal::ZERO;
        for (_, entry) in self.store.list(tenant_id)? {
            if entry.excluded_from_demand() {
                continue;
            }
            for line in &entry.lines {
                if line.part == part {
                    total += line.quantity.value();
                }
            }
        }
        Ok(Quantity::new(total)?)
    }

    /// Every order on the book, cancelled ones included, for reconciliation
    /// views that have to explain where demand went.
    pub fn reconciliation(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<OrderBookEntry>, OrderBookProjectionError> {
        let mut entries: Vec<OrderBookEntry> = self
            .store
            .list(tenant_id)?
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        entries.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(entries)
    }

    /// Apply one published envelope.
    ///
    /// Returns `Ok(())` for envelopes of other aggregate types and for
    /// already-applied sequence numbers.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderBookProjectionError> {
        if envelope.aggregate_type() != ORDER_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if seq == 0 {
            return Err(OrderBookProjectionError::NonMonotonicSequence { last: 0, found: 0 });
        }

        let key = CursorKey {
            tenant_id,
            aggregate_id,
        };
        let last = {
            let cursors = self
                .cursors
                .read()
                .map_err(|_| DomainError::invariant("projection cursor lock poisoned"))?;
            cursors.get(&key).copied().unwrap_or(0)
        };
        if seq <= last {
            // Redelivery; already applied.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(OrderBookProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OrderBookProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, event_order) = event_identity(&event);
        if event_tenant != tenant_id {
            return Err(OrderBookProjectionError::TenantIsolation(format!(
                "envelope tenant {tenant_id} carries event for tenant {event_tenant}"
            )));
        }
        if event_order != aggregate_id {
            return Err(OrderBookProjectionError::TenantIsolation(format!(
                "envelope aggregate {aggregate_id} carries event for order {event_order}"
            )));
        }

        self.apply_event(tenant_id, aggregate_id, &event)?;

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| DomainError::invariant("projection cursor lock poisoned"))?;
        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_event(
        &self,
        tenant_id: TenantId,
        order_id: AggregateId,
        event: &OrderEvent,
    ) -> Result<(), OrderBookProjectionError> {
        let entry = match event {
            OrderEvent::OrderCreated(created) => OrderBookEntry {
                order_id,
                reference: created.reference.clone(),
                status: OrderStatus::Open,
                lines: created
                    .lines
                    .iter()
                    .map(|l| OrderBookLine {
                        line_no: l.line_no,
                        part: l.part,
                        quantity: l.quantity,
                    })
                    .collect(),
            },
            other => {
                let mut entry = self
                    .store
                    .get(tenant_id, &order_id)?
                    .ok_or(OrderBookProjectionError::MissingEntry(order_id))?;
                match other {
                    OrderEvent::OrderCreated(_) => {}
                    OrderEvent::LineEdited(e) => {
                        set_line_quantity(&mut entry, e.line_no, e.quantity);
                    }
                    OrderEvent::LineEditApproved(e) => {
                        set_line_quantity(&mut entry, e.line_no, e.quantity);
                    }
                    // A requested edit has not taken effect yet; a rejected
                    // one never does.
                    OrderEvent::LineEditRequested(_) => {}
                    OrderEvent::LineEditRejected(_) => {}
                    OrderEvent::OrderCancelled(_) => entry.status = OrderStatus::Cancelled,
                    OrderEvent::OrderReopened(_) => entry.status = OrderStatus::Open,
                }
                entry
            }
        };

        self.store.upsert(tenant_id, order_id, entry)?;
        Ok(())
    }

    /// Discard all state and replay the given history.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: &[EventEnvelope<JsonValue>],
    ) -> Result<(), OrderBookProjectionError> {
        {
            let mut cursors = self
                .cursors
                .write()
                .map_err(|_| DomainError::invariant("projection cursor lock poisoned"))?;
            cursors.clear();
        }

        let mut tenants: Vec<TenantId> = envelopes.iter().map(|e| e.tenant_id()).collect();
        tenants.sort_by_key(|t| *t.as_uuid());
        tenants.dedup();
        for tenant in tenants {
            self.store.clear_tenant(tenant)?;
        }

        let mut ordered: Vec<&EventEnvelope<JsonValue>> = envelopes.iter().collect();
        ordered.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid(),
                e.aggregate_id(),
                e.sequence_number(),
            )
        });

        for envelope in ordered {
            self.apply_envelope(envelope)?;
        }
        Ok(())
    }
}

fn set_line_quantity(entry: &mut OrderBookEntry, line_no: u32, quantity: Quantity) {
    if let Some(line) = entry.lines.iter_mut().find(|l| l.line_no == line_no) {
        line.quantity = quantity;
    }
}

fn event_identity(event: &OrderEvent) -> (TenantId, AggregateId) {
    match event {
        OrderEvent::OrderCreated(e) => (e.tenant_id, e.order_id.0),
        OrderEvent::LineEdited(e) => (e.tenant_id, e.order_id.0),
        OrderEvent::LineEditRequested(e) => (e.tenant_id, e.order_id.0),
        OrderEvent::LineEditApproved(e) => (e.tenant_id, e.order_id.0),
        OrderEvent::LineEditRejected(e) => (e.tenant_id, e.order_id.0),
        OrderEvent::OrderCancelled(e) => (e.tenant_id, e.order_id.0),
        OrderEvent::OrderReopened(e) => (e.tenant_id, e.order_id.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use kitforge_core::UserId;
    use kitforge_orders::{
        LineEdited, OrderCancelled, OrderCreated, OrderLine, OrderReopened, SalesOrderId,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::read_model::InMemoryTenantStore;

    type Projection = OrderBookProjection<Arc<InMemoryTenantStore<AggregateId, OrderBookEntry>>>;

    fn projection() -> Projection {
        OrderBookProjection::new(Arc::new(InMemoryTenantStore::new()))
    }

    fn qty(d: Decimal) -> Quantity {
        Quantity::new(d).unwrap()
    }

    fn envelope(
        tenant_id: TenantId,
        order_id: SalesOrderId,
        seq: u64,
        event: OrderEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn created(
        tenant_id: TenantId,
        order_id: SalesOrderId,
        reference: &str,
        part: PartId,
        quantity: Quantity,
    ) -> OrderEvent {
        OrderEvent::OrderCreated(OrderCreated {
            tenant_id,
            order_id,
            reference: reference.to_string(),
            lines: vec![OrderLine {
                line_no: 1,
                part,
                quantity,
                unit_price: dec!(10),
            }],
            occurred_at: Utc::now(),
        })
    }

    fn cancelled(tenant_id: TenantId, order_id: SalesOrderId) -> OrderEvent {
        OrderEvent::OrderCancelled(OrderCancelled {
            tenant_id,
            order_id,
            cancelled_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn on_order_sums_open_orders_for_a_part() {
        let projection = projection();
        let tenant_id = TenantId::new();
        let part = PartId::new(AggregateId::new());

        let first = SalesOrderId::new(AggregateId::new());
        let second = SalesOrderId::new(AggregateId::new());
        projection
            .apply_envelope(&envelope(
                tenant_id,
                first,
                1,
                created(tenant_id, first, "SO-0001", part, qty(dec!(4))),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                second,
                1,
                created(tenant_id, second, "SO-0002", part, qty(dec!(6))),
            ))
            .unwrap();

        assert_eq!(projection.on_order(tenant_id, part).unwrap(), qty(dec!(10)));
    }

    #[test]
    fn cancellation_removes_the_order_from_on_order_demand() {
        let projection = projection();
        let tenant_id = TenantId::new();
        let part = PartId::new(AggregateId::new());
        let order_id = SalesOrderId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                tenant_id,
                order_id,
                1,
                created(tenant_id, order_id, "SO-0001", part, qty(dec!(4))),
            ))
            .unwrap();
        assert_eq!(projection.on_order(tenant_id, part).unwrap(), qty(dec!(4)));

        projection
            .apply_envelope(&envelope(tenant_id, order_id, 2, cancelled(tenant_id, order_id)))
            .unwrap();
        assert_eq!(
            projection.on_order(tenant_id, part).unwrap(),
            Quantity::ZERO
        );
    }

    #[test]
    fn reopening_restores_the_order_to_demand() {
        let projection = projection();
        let tenant_id = TenantId::new();
        let part = PartId::new(AggregateId::new());
        let order_id = SalesOrderId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                tenant_id,
                order_id,
                1,
                created(tenant_id, order_id, "SO-0001", part, qty(dec!(4))),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(tenant_id, order_id, 2, cancelled(tenant_id, order_id)))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                order_id,
                3,
                OrderEvent::OrderReopened(OrderReopened {
                    tenant_id,
                    order_id,
                    reopened_by: UserId::new(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert_eq!(projection.on_order(tenant_id, part).unwrap(), qty(dec!(4)));
    }

    #[test]
    fn cancelled_orders_stay_in_the_reconciliation_listing() {
        let projection = projection();
        let tenant_id = TenantId::new();
        let part = PartId::new(AggregateId::new());

        let open = SalesOrderId::new(AggregateId::new());
        let dropped = SalesOrderId::new(AggregateId::new());
        projection
            .apply_envelope(&envelope(
                tenant_id,
                open,
                1,
                created(tenant_id, open, "SO-0001", part, qty(dec!(4))),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                dropped,
                1,
                created(tenant_id, dropped, "SO-0002", part, qty(dec!(6))),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(tenant_id, dropped, 2, cancelled(tenant_id, dropped)))
            .unwrap();

        let listing = projection.reconciliation(tenant_id).unwrap();
        assert_eq!(listing.len(), 2);
        assert!(!listing[0].excluded_from_demand());
        assert!(listing[1].excluded_from_demand());
        assert_eq!(listing[1].reference, "SO-0002");
    }

    #[test]
    fn line_edit_adjusts_on_order_quantity() {
        let projection = projection();
        let tenant_id = TenantId::new();
        let part = PartId::new(AggregateId::new());
        let order_id = SalesOrderId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                tenant_id,
                order_id,
                1,
                created(tenant_id, order_id, "SO-0001", part, qty(dec!(4))),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                tenant_id,
                order_id,
                2,
                OrderEvent::LineEdited(LineEdited {
                    tenant_id,
                    order_id,
                    line_no: 1,
                    quantity: qty(dec!(7)),
                    unit_price: dec!(10),
                    user: UserId::new(),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        assert_eq!(projection.on_order(tenant_id, part).unwrap(), qty(dec!(7)));
    }

    #[test]
    fn redelivered_cancellation_is_ignored() {
        let projection = projection();
        let tenant_id = TenantId::new();
        let part = PartId::new(AggregateId::new());
        let order_id = SalesOrderId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(
                tenant_id,
                order_id,
                1,
                created(tenant_id, order_id, "SO-0001", part, qty(dec!(4))),
            ))
            .unwrap();
        let dup = envelope(tenant_id, order_id, 2, cancelled(tenant_id, order_id));
        projection.apply_envelope(&dup).unwrap();
        projection.apply_envelope(&dup).unwrap();

        let entry = projection.get(tenant_id, order_id.0).unwrap().unwrap();
        assert_eq!(entry.status, OrderStatus::Cancelled);
        assert_eq!(
            projection.on_order(tenant_id, part).unwrap(),
            Quantity::ZERO
        );
    }

    #[test]
    fn rebuild_replays_cancellations_in_stream_order() {
        let projection = projection();
        let tenant_id = TenantId::new();
        let part = PartId::new(AggregateId::new());
        let order_id = SalesOrderId::new(AggregateId::new());

        let history = vec![
            envelope(tenant_id, order_id, 2, cancelled(tenant_id, order_id)),
            envelope(
                tenant_id,
                order_id,
                1,
                created(tenant_id, order_id, "SO-0001", part, qty(dec!(4))),
            ),
        ];
        projection.rebuild_from_scratch(&history).unwrap();

        let entry = projection.get(tenant_id, order_id.0).unwrap().unwrap();
        assert_eq!(entry.status, OrderStatus::Cancelled);
        assert_eq!(
            projection.on_order(tenant_id, part).unwrap(),
            Quantity::ZERO
        );
    }
}
