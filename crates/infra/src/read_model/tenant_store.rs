use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use gescom_core::TenantId;

/// Tenant-isolated key/value store abstraction for disposable read models.
///
/// Every read and write names the tenant; there is no way to list across tenants.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;

    fn upsert(&self, tenant_id: TenantId, key: K, value: V);

    /// Read-modify-write of one record under a single lock.
    ///
    /// `f` receives the current value (if any) and returns the value to store.
    fn update(&self, tenant_id: TenantId, key: K, f: &mut dyn FnMut(Option<V>) -> V) -> V;

    fn list(&self, tenant_id: TenantId) -> Vec<V>;

    fn count(&self, tenant_id: TenantId) -> usize {
        self.list(tenant_id).len()
    }

    /// Clear all read-model records for a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);

    /// Clear everything (startup rebuild).
    fn clear_all(&self);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn update(&self, tenant_id: TenantId, key: K, f: &mut dyn FnMut(Option<V>) -> V) -> V {
        (**self).update(tenant_id, key, f)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn count(&self, tenant_id: TenantId) -> usize {
        (**self).count(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }

    fn clear_all(&self) {
        (**self).clear_all()
    }
}

/// In-memory tenant-isolated store: one map per tenant.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    tenants: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
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
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let tenants = self.tenants.read().ok()?;
        tenants.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn update(&self, tenant_id: TenantId, key: K, f: &mut dyn FnMut(Option<V>) -> V) -> V {
        match self.tenants.write() {
            Ok(mut tenants) => {
                let records = tenants.entry(tenant_id).or_default();
                let next = f(records.remove(&key));
                records.insert(key, next.clone());
                next
            }
            // Poisoned: compute the value but keep the store untouched.
            Err(_) => f(None),
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let Ok(tenants) = self.tenants.read() else {
            return vec![];
        };
        tenants
            .get(&tenant_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn count(&self, tenant_id: TenantId) -> usize {
        self.tenants
            .read()
            .ok()
            .and_then(|t| t.get(&tenant_id).map(HashMap::len))
            .unwrap_or(0)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.remove(&tenant_id);
        }
    }

    fn clear_all(&self) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_never_see_each_other() {
        let store: InMemoryTenantStore<u32, &'static str> = InMemoryTenantStore::new();
        let a = TenantId::new();
        let b = TenantId::new();

        store.upsert(a, 1, "a1");
        store.upsert(b, 1, "b1");

        assert_eq!(store.get(a, &1), Some("a1"));
        assert_eq!(store.get(b, &1), Some("b1"));
        assert_eq!(store.list(a), vec!["a1"]);

        store.clear_tenant(a);
        assert_eq!(store.count(a), 0);
        assert_eq!(store.count(b), 1);
    }

    #[test]
    fn update_sees_previous_value() {
        let store: InMemoryTenantStore<&'static str, u32> = InMemoryTenantStore::new();
        let t = TenantId::new();

        assert_eq!(store.update(t, "qty", &mut |v| v.unwrap_or(0) + 5), 5);
        assert_eq!(store.update(t, "qty", &mut |v| v.unwrap_or(0) + 5), 10);
        assert_eq!(store.get(t, &"qty"), Some(10));
    }
}
