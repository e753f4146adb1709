use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use kitforge_catalog::PartId;
use kitforge_core::{AggregateId, DomainError, DomainResult, UserId};

/// Build order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub AggregateId);

impl BuildId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BuildId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The build order a kit is raised against. Kits inherit the build's part and
/// notify its issuer and responsible owner on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub reference: String,
    pub part: PartId,
    pub issued_by: UserId,
    pub responsible: Option<UserId>,
}

/// Lookup surface for build orders. One instance per tenant.
pub trait BuildDirectory: Send + Sync {
    fn get(&self, id: BuildId) -> DomainResult<Option<Build>>;

    fn upsert(&self, build: Build) -> DomainResult<()>;
}

impl<D> BuildDirectory for std::sync::Arc<D>
where
    D: BuildDirectory + ?Sized,
{
    fn get(&self, id: BuildId) -> DomainResult<Option<Build>> {
        (**self).get(id)
    }

    fn upsert(&self, build: Build) -> DomainResult<()> {
        (**self).upsert(build)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBuildDirectory {
    builds: RwLock<HashMap<BuildId, Build>>,
}

impl InMemoryBuildDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuildDirectory for InMemoryBuildDirectory {
    fn get(&self, id: BuildId) -> DomainResult<Option<Build>> {
        let builds = self
            .builds
            .read()
            .map_err(|_| DomainError::invariant("build directory lock poisoned"))?;
        Ok(builds.get(&id).cloned())
    }

    fn upsert(&self, build: Build) -> DomainResult<()> {
        let mut builds = self
            .builds
            .write()
            .map_err(|_| DomainError::invariant("build directory lock poisoned"))?;
        builds.insert(build.id, build);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_get_returns_build() {
        let directory = InMemoryBuildDirectory::new();
        let build = Build {
            id: BuildId::new(AggregateId::new()),
            reference: "BO-0001".to_string(),
            part: PartId::new(AggregateId::new()),
            issued_by: UserId::new(),
            responsible: None,
        };

        directory.upsert(build.clone()).unwrap();
        assert_eq!(directory.get(build.id).unwrap(), Some(build));
    }

    #[test]
    fn get_missing_returns_none() {
        let directory = InMemoryBuildDirectory::new();
        assert_eq!(directory.get(BuildId::new(AggregateId::new())).unwrap(), None);
    }
}
