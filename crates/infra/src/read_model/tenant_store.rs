use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use kitforge_core::{DomainError, DomainResult, TenantId};

/// Key/value storage for read models, partitioned by tenant.
///
/// Every operation takes a `TenantId`; there is deliberately no way to read
/// or write across tenants through this interface. Read models are
/// disposable, so `clear_tenant` exists to support rebuild-by-replay.
pub trait TenantStore<K, V>: Send + Sync
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> DomainResult<Option<V>>;

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> DomainResult<()>;

    /// All entries for one tenant, in unspecified order.
    fn list(&self, tenant_id: TenantId) -> DomainResult<Vec<(K, V)>>;

    fn clear_tenant(&self, tenant_id: TenantId) -> DomainResult<()>;
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> DomainResult<Option<V>> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> DomainResult<()> {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> DomainResult<Vec<(K, V)>> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) -> DomainResult<()> {
        (**self).clear_tenant(tenant_id)
    }
}

/// HashMap-backed tenant store for tests and embedding.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> DomainResult<Option<V>> {
        let map = self
            .inner
            .read()
            .map_err(|_| DomainError::invariant("tenant store lock poisoned"))?;
        Ok(map.get(&(tenant_id, key.clone())).cloned())
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> DomainResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("tenant store lock poisoned"))?;
        map.insert((tenant_id, key), value);
        Ok(())
    }

    fn list(&self, tenant_id: TenantId) -> DomainResult<Vec<(K, V)>> {
        let map = self
            .inner
            .read()
            .map_err(|_| DomainError::invariant("tenant store lock poisoned"))?;
        Ok(map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear_tenant(&self, tenant_id: TenantId) -> DomainResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::invariant("tenant store lock poisoned"))?;
        map.retain(|(t, _), _| *t != tenant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_scoped_by_tenant() {
        let store: InMemoryTenantStore<&'static str, u32> = InMemoryTenantStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        store.upsert(tenant_a, "kit", 1).unwrap();
        store.upsert(tenant_b, "kit", 2).unwrap();

        assert_eq!(store.get(tenant_a, &"kit").unwrap(), Some(1));
        assert_eq!(store.get(tenant_b, &"kit").unwrap(), Some(2));
    }

    #[test]
    fn clear_tenant_leaves_other_tenants_intact() {
        let store: InMemoryTenantStore<u32, u32> = InMemoryTenantStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        store.upsert(tenant_a, 1, 10).unwrap();
        store.upsert(tenant_b, 1, 20).unwrap();
        store.clear_tenant(tenant_a).unwrap();

        assert_eq!(store.get(tenant_a, &1).unwrap(), None);
        assert_eq!(store.get(tenant_b, &1).unwrap(), Some(20));
        assert_eq!(store.list(tenant_b).unwrap().len(), 1);
    }

    #[test]
    fn poisoned_lock_surfaces_as_an_error() {
        let store: Arc<InMemoryTenantStore<u32, u32>> = Arc::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        store.upsert(tenant, 1, 10).unwrap();

        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poison the store lock");
        })
        .join();

        let err = store.upsert(tenant, 2, 20).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(store.get(tenant, &1).is_err());
        assert!(store.clear_tenant(tenant).is_err());
    }
}
