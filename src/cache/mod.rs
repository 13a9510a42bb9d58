//! Tag-aware result cache used to memoize recommendations and risk
//! assessments.
//!
//! Every write may carry tags; `invalidate_by_tags` drops every key written
//! under any of them. Callers treat all errors as misses.

pub mod keys;
mod memory;
mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

const TTL_JITTER_RATIO: f64 = 0.1;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// A zero `ttl` stores without expiry.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tags: &[String],
    ) -> Result<(), CacheError>;

    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<(), CacheError>;
}

pub async fn get_json<T>(cache: &dyn Cache, key: &str) -> Result<Option<T>, CacheError>
where
    T: DeserializeOwned,
{
    match cache.get(key).await? {
        Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Duration,
    tags: &[String],
) -> Result<(), CacheError>
where
    T: Serialize + Sync,
{
    let payload = serde_json::to_string(value)?;
    cache.set(key, &payload, ttl, tags).await
}

pub(crate) fn apply_ttl_jitter(ttl: Duration) -> Duration {
    let base_ms = ttl.as_millis() as f64;
    let mut rng = rand::rng();
    let factor = rng.random_range(1.0 - TTL_JITTER_RATIO..=1.0 + TTL_JITTER_RATIO);
    let jittered_ms = (base_ms * factor).round().max(1.0);
    Duration::from_millis(jittered_ms as u64)
}
