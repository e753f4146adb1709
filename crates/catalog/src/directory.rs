use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use kitforge_core::{DomainError, DomainResult, UserId};

use crate::part::{Part, PartId};

/// Read-side snapshot of a part, as consumed by allocation and notification
/// logic. Kept separate from the aggregate so collaborators never hold live
/// aggregate state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_id: PartId,
    pub name: String,
    pub assembly: bool,
    pub subscribers: BTreeSet<UserId>,
}

impl From<&Part> for PartRecord {
    fn from(part: &Part) -> Self {
        Self {
            part_id: part.id_typed(),
            name: part.name().to_string(),
            assembly: part.is_assembly(),
            subscribers: part.subscribers().clone(),
        }
    }
}

/// Lookup surface for part snapshots. One instance per tenant.
pub trait PartDirectory: Send + Sync {
    fn get(&self, part_id: PartId) -> DomainResult<Option<PartRecord>>;

    fn upsert(&self, record: PartRecord) -> DomainResult<()>;
}

impl<D> PartDirectory for std::sync::Arc<D>
where
    D: PartDirectory + ?Sized,
{
    fn get(&self, part_id: PartId) -> DomainResult<Option<PartRecord>> {
        (**self).get(part_id)
    }

    fn upsert(&self, record: PartRecord) -> DomainResult<()> {
        (**self).upsert(record)
    }
}

/// In-memory directory backed by `RwLock<HashMap>`, for tests and the
/// projection worker.
#[derive(Debug, Default)]
pub struct InMemoryPartDirectory {
    parts: RwLock<HashMap<PartId, PartRecord>>,
}

impl InMemoryPartDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartDirectory for InMemoryPartDirectory {
    fn get(&self, part_id: PartId) -> DomainResult<Option<PartRecord>> {
        let parts = self
            .parts
            .read()
            .map_err(|_| DomainError::invariant("part directory lock poisoned"))?;
        Ok(parts.get(&part_id).cloned())
    }

    fn upsert(&self, record: PartRecord) -> DomainResult<()> {
        let mut parts = self
            .parts
            .write()
            .map_err(|_| DomainError::invariant("part directory lock poisoned"))?;
        parts.insert(record.part_id, record);
        Ok(())
    }
}
