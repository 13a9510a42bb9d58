//! Adaptive learning engine.
//!
//! `LearningEngine` owns no data itself: knowledge states, the event log,
//! assessments and pathways live behind [`Store`], memoized results behind an
//! optional [`Cache`]. Each public operation is a handful of sequential store
//! calls around a pure scoring function from the submodules.

mod intervention;
mod locks;
mod pathway;
mod profile;
mod recommender;
mod risk;
mod tracker;

pub use pathway::build_pathway;
pub use profile::summarize_knowledge;
pub use recommender::build_recommendations;
pub use risk::{
    build_assessment, compute_risk_factors, dropout_probability, performance_trend,
    recommend_interventions,
};
pub use tracker::{apply_observation, bkt_posterior, confidence_from_counts};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{self, Cache, RedisCache};
use crate::config::Config;
use crate::error::{EngineError, StoreError};
use crate::params::EngineParams;
use crate::store::{SqliteStore, Store};
use locks::{CacheGenerations, KeyedLocks};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LearningEngine {
    store: Arc<dyn Store>,
    cache: Option<Arc<dyn Cache>>,
    params: EngineParams,
    store_timeout: Duration,
    topic_locks: KeyedLocks,
    cache_generations: CacheGenerations,
}

impl LearningEngine {
    pub fn new(store: Arc<dyn Store>, cache: Option<Arc<dyn Cache>>, params: EngineParams) -> Self {
        Self {
            store,
            cache,
            params,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            topic_locks: KeyedLocks::default(),
            cache_generations: CacheGenerations::default(),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Sqlite store from `DATABASE_URL`, redis cache from `REDIS_URL` when
    /// reachable. A cache that cannot be reached is skipped, not fatal.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = SqliteStore::connect(&config.database_url).await?;

        let cache: Option<Arc<dyn Cache>> = match config.redis_url.as_deref() {
            Some(url) => match RedisCache::connect(url).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(err) => {
                    tracing::warn!(error = %err, "redis unavailable, running without cache");
                    None
                }
            },
            None => None,
        };

        Ok(Self::new(Arc::new(store), cache, config.engine_params())
            .with_store_timeout(config.store_timeout))
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                after_ms: self.store_timeout.as_millis() as u64,
            }),
        }
    }

    async fn cache_get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let cache = self.cache.as_deref()?;
        match tokio::time::timeout(self.store_timeout, cache::get_json(cache, key)).await {
            Ok(Ok(hit)) => {
                tracing::debug!(key, hit = hit.is_some(), "cache lookup");
                hit
            }
            Ok(Err(err)) => {
                tracing::warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
            Err(_) => {
                tracing::warn!(key, "cache read timed out, treating as miss");
                None
            }
        }
    }

    async fn cache_set<T>(&self, key: &str, value: &T, ttl: Duration, tags: &[String])
    where
        T: Serialize + Sync,
    {
        let Some(cache) = self.cache.as_deref() else {
            return;
        };
        let write = cache::set_json(cache, key, value, ttl, tags);
        match tokio::time::timeout(self.store_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(key, error = %err, "cache write failed"),
            Err(_) => tracing::warn!(key, "cache write timed out"),
        }
    }

    /// Caches a result computed from reads that started at `generation`.
    /// Skips the write if the user's data changed since, and undoes it if
    /// the change lands while the write is in flight.
    async fn cache_set_if_current<T>(
        &self,
        user_id: &str,
        generation: u64,
        key: &str,
        value: &T,
        ttl: Duration,
        tags: &[String],
    ) where
        T: Serialize + Sync,
    {
        if self.cache.is_none() {
            return;
        }
        if self.cache_generations.current(user_id) != generation {
            tracing::debug!(user_id, key, "data changed during computation, not caching");
            return;
        }
        self.cache_set(key, value, ttl, tags).await;
        if self.cache_generations.current(user_id) != generation {
            tracing::debug!(user_id, key, "data changed during cache write, dropping entry");
            self.cache_invalidate(tags).await;
        }
    }

    /// Marks the user's cached results stale, then drops them.
    async fn invalidate_user(&self, user_id: &str, tags: &[String]) {
        self.cache_generations.bump(user_id);
        self.cache_invalidate(tags).await;
    }

    async fn cache_invalidate(&self, tags: &[String]) {
        let Some(cache) = self.cache.as_deref() else {
            return;
        };
        match tokio::time::timeout(self.store_timeout, cache.invalidate_by_tags(tags)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(?tags, error = %err, "cache invalidation failed"),
            Err(_) => tracing::warn!(?tags, "cache invalidation timed out"),
        }
    }
}

fn require_id(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
