//! Command dispatch pipeline: rehydrate, decide, append, publish.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use kitforge_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use kitforge_events::{Event, EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Failure of a full dispatch cycle.
///
/// Domain errors are flattened into the variants an API layer can map to
/// response codes without inspecting message strings.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("optimistic concurrency conflict: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("event deserialization failed: {0}")]
    Deserialize(String),

    #[error("event store error: {0}")]
    Store(#[from] EventStoreError),

    #[error("event publication failed after append: {0}")]
    Publish(String),
}

impl From<DomainError> for DispatchError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::FieldValidation { field, message } => {
                DispatchError::Validation(format!("{field}: {message}"))
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::NotFound => DispatchError::NotFound,
            // Stale-version conflicts surface the same way as a lost append race.
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
        }
    }
}

/// Orchestrates the write path for one command.
///
/// The pipeline is: load the stream, rehydrate the aggregate, let it decide,
/// append the decided events with an exact-version expectation, then publish
/// each stored event on the bus. Publication happens only after a successful
/// append, so a publish failure never loses committed events; subscribers can
/// catch up by replaying the stream.
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }

    /// Execute one command against one aggregate stream.
    ///
    /// `make_aggregate` produces the empty (pre-creation) aggregate the
    /// history is replayed onto. Returns the stored events, which is empty
    /// when the command decided nothing (idempotent no-op).
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let mut history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(&history, tenant_id, aggregate_id)?;
        history.sort_by_key(|e| e.sequence_number);

        let stream_version = history.last().map(StoredEvent::stream_version).unwrap_or(0);

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        for stored in &history {
            let event: A::Event = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            aggregate.apply(&event);
        }

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            debug!(%aggregate_id, aggregate_type, "command decided no events");
            return Ok(vec![]);
        }

        let mut uncommitted = Vec::with_capacity(decided.len());
        for event in &decided {
            uncommitted.push(UncommittedEvent::from_typed(
                tenant_id,
                aggregate_id,
                aggregate_type,
                Uuid::now_v7(),
                event,
            )?);
        }

        let stored = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(stream_version))?;

        for event in &stored {
            self.bus
                .publish(event.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(stored)
    }
}

fn validate_loaded_stream(
    history: &[StoredEvent],
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(), DispatchError> {
    let mut last_seq = 0;
    for stored in history {
        if stored.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "stream for tenant {tenant_id} contains event for tenant {}",
                stored.tenant_id
            )));
        }
        if stored.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "stream for aggregate {aggregate_id} contains event for aggregate {}",
                stored.aggregate_id
            )));
        }
        if stored.sequence_number <= last_seq {
            return Err(DispatchError::Deserialize(format!(
                "stream sequence is not strictly increasing at {}",
                stored.sequence_number
            )));
        }
        last_seq = stored.sequence_number;
    }
    Ok(())
}
