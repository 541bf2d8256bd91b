//! Last-known-good results, keyed by input fingerprint.
//!
//! Successful primary results are written here by the invoker; a `Cached`
//! producer in a fallback chain serves them back when the dependency is
//! down. Entries expire after a TTL and the cache is bounded.

use moka::future::Cache;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::dependencies::DependencyKey;
use crate::error::FailureKind;

/// Result cache for one dependency, using moka.
pub struct ResultCache<T: Clone + Send + Sync + 'static> {
    key: DependencyKey,
    cache: Cache<String, T>,
}

impl<T: Clone + Send + Sync + 'static> ResultCache<T> {
    pub fn new(key: DependencyKey, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { key, cache }
    }

    pub fn from_config(key: DependencyKey, config: &CacheConfig) -> Self {
        Self::new(key, config.max_entries, config.ttl)
    }

    pub fn key(&self) -> &DependencyKey {
        &self.key
    }

    pub async fn get(&self, fingerprint: &str) -> Option<T> {
        self.cache.get(fingerprint).await
    }

    /// A cached value, or `Unavailable` on a miss.
    pub async fn lookup(&self, fingerprint: &str) -> Result<T, FailureKind> {
        self.get(fingerprint)
            .await
            .ok_or_else(|| FailureKind::Unavailable {
                key: self.key.clone(),
                reason: "no cached result".to_string(),
            })
    }

    pub async fn insert(&self, fingerprint: String, value: T) {
        self.cache.insert(fingerprint, value).await;
    }

}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for ResultCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("key", &self.key)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = ResultCache::new(DependencyKey::search(), 10, Duration::from_secs(60));

        // miss
        assert!(cache.get("abc").await.is_none());
        assert!(matches!(
            cache.lookup("abc").await,
            Err(FailureKind::Unavailable { .. })
        ));

        cache.insert("abc".to_string(), vec![1, 2, 3]).await;

        assert_eq!(cache.get("abc").await, Some(vec![1, 2, 3]));
        assert_eq!(cache.lookup("abc").await.unwrap(), vec![1, 2, 3]);
    }
}
