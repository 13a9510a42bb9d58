use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Cache;
use crate::error::CacheError;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// Keys written under one tag. The index expires no earlier than the
/// longest-lived key it points at.
struct TagIndex {
    keys: HashSet<String>,
    expires_at: Option<Instant>,
}

const PURGE_THRESHOLD: usize = 1024;

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tags: HashMap<String, TagIndex>,
}

impl Inner {
    fn purge(&mut self, now: Instant) {
        self.entries.retain(|_, e| !is_expired(e.expires_at, now));
        self.tags.retain(|_, t| !is_expired(t.expires_at, now));
    }
}

#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tag_count(&self) -> usize {
        self.inner.lock().tags.len()
    }

    /// Drops expired entries and tag indexes. Writes also do this once the
    /// cache holds `PURGE_THRESHOLD` entries.
    pub fn purge_expired(&self) {
        self.inner.lock().purge(Instant::now());
    }
}

fn is_expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_some_and(|at| at <= now)
}

fn later(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) if !is_expired(entry.expires_at, now) => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tags: &[String],
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = (!ttl.is_zero()).then(|| now + ttl);
        let mut inner = self.inner.lock();
        if inner.entries.len() >= PURGE_THRESHOLD || inner.tags.len() >= PURGE_THRESHOLD {
            inner.purge(now);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );

        for tag in tags {
            inner
                .tags
                .entry(tag.clone())
                .and_modify(|index| {
                    index.keys.insert(key.to_string());
                    index.expires_at = later(index.expires_at, expires_at);
                })
                .or_insert_with(|| TagIndex {
                    keys: HashSet::from([key.to_string()]),
                    expires_at,
                });
        }
        Ok(())
    }

    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        for tag in tags {
            if let Some(index) = inner.tags.remove(tag) {
                for key in index.keys {
                    inner.entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidation_drops_only_tagged_keys() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("a", "1", ttl, &["t1".to_string()]).await.unwrap();
        cache
            .set("b", "2", ttl, &["t1".to_string(), "t2".to_string()])
            .await
            .unwrap();
        cache.set("c", "3", ttl, &["t2".to_string()]).await.unwrap();
        cache.set("d", "4", ttl, &[]).await.unwrap();

        cache.invalidate_by_tags(&["t1".to_string()]).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("3"));
        assert_eq!(cache.get("d").await.unwrap().as_deref(), Some("4"));
        assert_eq!(cache.tag_count(), 1);
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("short", "v", Duration::from_millis(1), &["t".to_string()])
            .await
            .unwrap();
        cache.set("forever", "v", Duration::ZERO, &[]).await.unwrap();
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.get("forever").await.unwrap().is_some());

        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.tag_count(), 0);
    }

    #[tokio::test]
    async fn tag_index_outlives_its_longest_key() {
        let cache = MemoryCache::new();
        let tag = vec!["t".to_string()];
        cache.set("short", "v", Duration::from_millis(1), &tag).await.unwrap();
        cache.set("long", "v", Duration::from_secs(60), &tag).await.unwrap();
        std::thread::sleep(Duration::from_millis(10));

        cache.purge_expired();
        assert_eq!(cache.tag_count(), 1);

        cache.invalidate_by_tags(&tag).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn writes_purge_once_cache_grows() {
        let cache = MemoryCache::new();
        for i in 0..PURGE_THRESHOLD {
            cache
                .set(&format!("k{i}"), "v", Duration::from_millis(1), &[format!("t{i}")])
                .await
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(10));

        cache.set("fresh", "v", Duration::from_secs(60), &[]).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.tag_count(), 0);
    }
}
