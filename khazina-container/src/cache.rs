//! The public service tier, shareable between container instances.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::value::Service;

/// Built public services keyed by id.
///
/// Cloning a `ServiceCache` yields a handle to the same map, so a
/// composer can hand one cache to several containers and have them agree
/// on every shared instance.
///
/// ```
/// use khazina_container::cache::ServiceCache;
/// use std::sync::Arc;
///
/// let cache = ServiceCache::new();
/// let other = cache.clone();
/// cache.get_or_insert("answer", Arc::new(42u32));
/// assert!(other.contains("answer"));
/// ```
#[derive(Clone, Default)]
pub struct ServiceCache {
    inner: Arc<DashMap<String, Service>>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Service> {
        self.inner.get(id).map(|entry| entry.value().clone())
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// Stores `service` unless `id` is already cached; returns the cached one.
    pub fn get_or_insert(&self, id: &str, service: Service) -> Service {
        self.inner
            .entry(id.to_string())
            .or_insert(service)
            .value()
            .clone()
    }

    pub fn remove(&self, id: &str) -> Option<Service> {
        self.inner.remove(id).map(|(_, service)| service)
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Cached ids, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl fmt::Debug for ServiceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCache")
            .field("cached", &self.inner.len())
            .finish()
    }
}
