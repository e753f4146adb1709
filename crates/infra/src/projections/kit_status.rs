use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use kitforge_build::{KitEvent, KitStatus};
use kitforge_core::{AggregateId, DomainError, TenantId};
use kitforge_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Aggregate type this projection consumes. Envelopes for other streams are
/// ignored rather than rejected, so one bus can feed many projections.
const KIT_AGGREGATE_TYPE: &str = "build.kit";

/// Per-kit progress summary for list views and dashboards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitStatusReadModel {
    pub kit_id: AggregateId,
    pub reference: String,
    pub status: KitStatus,
    pub components: u32,
    pub allocated: u32,
    pub installed: u32,
}

#[derive(Debug, Error)]
pub enum KitStatusProjectionError {
    #[error("payload deserialization failed: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence (last {last}, found {found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("no read model for kit {0}")]
    MissingReadModel(AggregateId),

    #[error("read model store error: {0}")]
    Store(#[from] DomainError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Builds [`KitStatusReadModel`] entries from kit event envelopes.
///
/// Delivery is at-least-once, so application is idempotent: envelopes at or
/// below the stream cursor are silently skipped. A gap above the cursor is an
/// error; the fix is [`KitStatusProjection::rebuild_from_scratch`].
pub struct KitStatusProjection<S> {
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> KitStatusProjection<S>
where
    S: TenantStore<AggregateId, KitStatusReadModel>,
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
        kit_id: AggregateId,
    ) -> Result<Option<KitStatusReadModel>, KitStatusProjectionError> {
        Ok(self.store.get(tenant_id, &kit_id)?)
    }

    pub fn list(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<KitStatusReadModel>, KitStatusProjectionError> {
        Ok(self
            .store
            .list(tenant_id)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Apply one published envelope.
    ///
    /// Returns `Ok(())` for envelopes of other aggregate types and for
    /// already-applied sequence numbers.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), KitStatusProjectionError> {
        if envelope.aggregate_type() != KIT_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if seq == 0 {
            return Err(KitStatusProjectionError::NonMonotonicSequence { last: 0, found: 0 });
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
            return Err(KitStatusProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: KitEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| KitStatusProjectionError::Deserialize(e.to_string()))?;

        // Cross-check event-level identity against the envelope.
        let (event_tenant, event_kit) = event_identity(&event);
        if event_tenant != tenant_id {
            return Err(KitStatusProjectionError::TenantIsolation(format!(
                "envelope tenant {tenant_id} carries event for tenant {event_tenant}"
            )));
        }
        if event_kit != aggregate_id {
            return Err(KitStatusProjectionError::TenantIsolation(format!(
                "envelope aggregate {aggregate_id} carries event for kit {event_kit}"
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
        kit_id: AggregateId,
        event: &KitEvent,
    ) -> Result<(), KitStatusProjectionError> {
        let model = match event {
            KitEvent::KitCreated(created) => KitStatusReadModel {
                kit_id,
                reference: created.reference.clone(),
                status: KitStatus::Pending,
                components: 0,
                allocated: 0,
                installed: 0,
            },
            other => {
                let mut model = self
                    .store
                    .get(tenant_id, &kit_id)?
                    .ok_or(KitStatusProjectionError::MissingReadModel(kit_id))?;
                match other {
                    KitEvent::KitCreated(_) => {}
                    KitEvent::ComponentAdded(_) => model.components += 1,
                    KitEvent::StockAssigned(_) => model.allocated += 1,
                    KitEvent::ComponentInstalled(_) => model.installed += 1,
                    KitEvent::KitCompleted(_) => model.status = KitStatus::Complete,
                    KitEvent::KitCancelled(_) => model.status = KitStatus::Cancelled,
                }
                model
            }
        };

        self.store.upsert(tenant_id, kit_id, model)?;
        Ok(())
    }

    /// Discard all state and replay the given history.
    ///
    /// Envelopes are sorted into deterministic stream order first, so callers
    /// can pass history collected from many streams in publication order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: &[EventEnvelope<JsonValue>],
    ) -> Result<(), KitStatusProjectionError> {
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

fn event_identity(event: &KitEvent) -> (TenantId, AggregateId) {
    match event {
        KitEvent::KitCreated(e) => (e.tenant_id, e.kit_id.0),
        KitEvent::ComponentAdded(e) => (e.tenant_id, e.kit_id.0),
        KitEvent::StockAssigned(e) => (e.tenant_id, e.kit_id.0),
        KitEvent::ComponentInstalled(e) => (e.tenant_id, e.kit_id.0),
        KitEvent::KitCompleted(e) => (e.tenant_id, e.kit_id.0),
        KitEvent::KitCancelled(e) => (e.tenant_id, e.kit_id.0),
    }
}
