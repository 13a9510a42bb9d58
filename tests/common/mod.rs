#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use learning_engine::cache::{Cache, MemoryCache};
use learning_engine::error::{CacheError, StoreError};
use learning_engine::store::{MemoryStore, Store};
use learning_engine::types::{
    InterventionRecord, InterventionStatus, KnowledgeState, LearningEvent, LearningPathway,
    Performance, RiskAssessment,
};
use learning_engine::{EngineParams, LearningEngine};

pub struct Harness {
    pub engine: Arc<LearningEngine>,
    pub store: Arc<FaultyStore>,
    pub cache: Arc<MemoryCache>,
}

pub fn harness() -> Harness {
    let store = Arc::new(FaultyStore::default());
    let cache = Arc::new(MemoryCache::new());
    let engine = LearningEngine::new(
        store.clone(),
        Some(cache.clone() as Arc<dyn Cache>),
        EngineParams::default(),
    )
    .with_store_timeout(Duration::from_millis(200));
    Harness {
        engine: Arc::new(engine),
        store,
        cache,
    }
}

pub fn performance(result: bool) -> Performance {
    Performance {
        content_id: "lesson_1".to_string(),
        result,
        time_spent: 420.0,
        difficulty: 0.5,
        session_id: Some("session_1".to_string()),
    }
}

pub fn knowledge_state(user_id: &str, topic_id: &str, mastery: f64, attempts: u32) -> KnowledgeState {
    KnowledgeState {
        user_id: user_id.to_string(),
        topic_id: topic_id.to_string(),
        mastery_level: mastery,
        confidence: 0.5,
        attempts,
        correct_attempts: attempts / 2,
        last_updated: Utc::now(),
    }
}

pub fn scored_event(user_id: &str, at: DateTime<Utc>, result: bool, time_spent: f64) -> LearningEvent {
    LearningEvent {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        event_type: "knowledge_update".to_string(),
        content_id: Some("lesson_1".to_string()),
        performance_data: serde_json::Value::Null,
        session_id: None,
        difficulty: Some(0.5),
        time_spent: Some(time_spent),
        result: Some(result),
        timestamp: at,
    }
}

/// Memory store with switchable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    fail: AtomicBool,
    always_conflict: AtomicBool,
    stall: AtomicBool,
    slow_listing: AtomicBool,
}

impl FaultyStore {
    pub fn set_failing(&self, on: bool) {
        self.fail.store(on, Ordering::SeqCst);
    }

    pub fn set_always_conflict(&self, on: bool) {
        self.always_conflict.store(on, Ordering::SeqCst);
    }

    pub fn set_stalled(&self, on: bool) {
        self.stall.store(on, Ordering::SeqCst);
    }

    /// Knowledge state listings return a snapshot taken 100ms before they
    /// complete.
    pub fn set_slow_listing(&self, on: bool) {
        self.slow_listing.store(on, Ordering::SeqCst);
    }

    async fn check(&self) -> Result<(), StoreError> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn get_knowledge_state(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<KnowledgeState>, StoreError> {
        self.check().await?;
        self.inner.get_knowledge_state(user_id, topic_id).await
    }

    async fn list_knowledge_states(
        &self,
        user_id: &str,
    ) -> Result<Vec<KnowledgeState>, StoreError> {
        self.check().await?;
        let states = self.inner.list_knowledge_states(user_id).await?;
        if self.slow_listing.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(states)
    }

    async fn commit_knowledge_update(
        &self,
        state: &KnowledgeState,
        expected_attempts: Option<u32>,
        event: &LearningEvent,
    ) -> Result<bool, StoreError> {
        self.check().await?;
        if self.always_conflict.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner
            .commit_knowledge_update(state, expected_attempts, event)
            .await
    }

    async fn append_event(&self, event: &LearningEvent) -> Result<(), StoreError> {
        self.check().await?;
        self.inner.append_event(event).await
    }

    async fn list_recent_events(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LearningEvent>, StoreError> {
        self.check().await?;
        self.inner.list_recent_events(user_id, since, limit).await
    }

    async fn append_risk_assessment(&self, assessment: &RiskAssessment) -> Result<(), StoreError> {
        self.check().await?;
        self.inner.append_risk_assessment(assessment).await
    }

    async fn latest_risk_assessment(
        &self,
        user_id: &str,
    ) -> Result<Option<RiskAssessment>, StoreError> {
        self.check().await?;
        self.inner.latest_risk_assessment(user_id).await
    }

    async fn get_pathway(
        &self,
        user_id: &str,
        goal_id: &str,
    ) -> Result<Option<LearningPathway>, StoreError> {
        self.check().await?;
        self.inner.get_pathway(user_id, goal_id).await
    }

    async fn upsert_pathway_sequence(
        &self,
        user_id: &str,
        goal_id: &str,
        sequence: &[String],
        now: DateTime<Utc>,
    ) -> Result<LearningPathway, StoreError> {
        self.check().await?;
        self.inner
            .upsert_pathway_sequence(user_id, goal_id, sequence, now)
            .await
    }

    async fn set_pathway_position(
        &self,
        user_id: &str,
        goal_id: &str,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<LearningPathway>, StoreError> {
        self.check().await?;
        self.inner
            .set_pathway_position(user_id, goal_id, position, now)
            .await
    }

    async fn mark_intervention_executed(
        &self,
        intervention_id: &str,
        executed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check().await?;
        self.inner
            .mark_intervention_executed(intervention_id, executed_by, at)
            .await
    }

    async fn list_interventions(
        &self,
        user_id: &str,
        status: Option<InterventionStatus>,
    ) -> Result<Vec<InterventionRecord>, StoreError> {
        self.check().await?;
        self.inner.list_interventions(user_id, status).await
    }
}

/// Cache whose every call fails.
pub struct BrokenCache;

fn broken() -> CacheError {
    CacheError::Serialization(serde_json::from_str::<u8>("broken").unwrap_err())
}

#[async_trait]
impl Cache for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(broken())
    }

    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
        _tags: &[String],
    ) -> Result<(), CacheError> {
        Err(broken())
    }

    async fn invalidate_by_tags(&self, _tags: &[String]) -> Result<(), CacheError> {
        Err(broken())
    }
}
