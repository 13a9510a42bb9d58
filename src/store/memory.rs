use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::Store;
use crate::error::StoreError;
use crate::types::{
    InterventionRecord, InterventionStatus, KnowledgeState, LearningEvent, LearningPathway,
    RiskAssessment,
};

#[derive(Default)]
struct Inner {
    states: HashMap<String, Vec<KnowledgeState>>,
    events: Vec<LearningEvent>,
    assessments: Vec<RiskAssessment>,
    interventions: Vec<InterventionRecord>,
    pathways: HashMap<(String, String), LearningPathway>,
}

/// In-process store. Every operation takes a single lock, so compound writes
/// are atomic with respect to each other.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a state without touching the event log.
    pub async fn put_knowledge_state(&self, state: KnowledgeState) {
        let mut inner = self.inner.write().await;
        let states = inner.states.entry(state.user_id.clone()).or_default();
        match states.iter_mut().find(|s| s.topic_id == state.topic_id) {
            Some(existing) => *existing = state,
            None => states.push(state),
        }
    }

    pub async fn event_count(&self, user_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner.events.iter().filter(|e| e.user_id == user_id).count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_knowledge_state(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<KnowledgeState>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .states
            .get(user_id)
            .and_then(|states| states.iter().find(|s| s.topic_id == topic_id))
            .cloned())
    }

    async fn list_knowledge_states(
        &self,
        user_id: &str,
    ) -> Result<Vec<KnowledgeState>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.states.get(user_id).cloned().unwrap_or_default())
    }

    async fn commit_knowledge_update(
        &self,
        state: &KnowledgeState,
        expected_attempts: Option<u32>,
        event: &LearningEvent,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let states = inner.states.entry(state.user_id.clone()).or_default();
        let existing = states.iter_mut().find(|s| s.topic_id == state.topic_id);

        match (existing, expected_attempts) {
            (None, None) => states.push(state.clone()),
            (Some(current), Some(expected)) if current.attempts == expected => {
                *current = state.clone();
            }
            _ => return Ok(false),
        }

        inner.events.push(event.clone());
        Ok(true)
    }

    async fn append_event(&self, event: &LearningEvent) -> Result<(), StoreError> {
        self.inner.write().await.events.push(event.clone());
        Ok(())
    }

    async fn list_recent_events(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LearningEvent>, StoreError> {
        let inner = self.inner.read().await;
        let mut events: Vec<LearningEvent> = inner
            .events
            .iter()
            .filter(|e| e.user_id == user_id && e.timestamp >= since)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }

    async fn append_risk_assessment(&self, assessment: &RiskAssessment) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for intervention in &assessment.interventions_recommended {
            inner.interventions.push(InterventionRecord {
                assessment_id: assessment.id.clone(),
                user_id: assessment.user_id.clone(),
                intervention: intervention.clone(),
                status: InterventionStatus::Pending,
                created_at: assessment.created_at,
                executed_at: None,
                executed_by: None,
            });
        }
        inner.assessments.push(assessment.clone());
        Ok(())
    }

    async fn latest_risk_assessment(
        &self,
        user_id: &str,
    ) -> Result<Option<RiskAssessment>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .assessments
            .iter()
            .rev()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn get_pathway(
        &self,
        user_id: &str,
        goal_id: &str,
    ) -> Result<Option<LearningPathway>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .pathways
            .get(&(user_id.to_string(), goal_id.to_string()))
            .cloned())
    }

    async fn upsert_pathway_sequence(
        &self,
        user_id: &str,
        goal_id: &str,
        sequence: &[String],
        now: DateTime<Utc>,
    ) -> Result<LearningPathway, StoreError> {
        let mut inner = self.inner.write().await;
        let pathway = inner
            .pathways
            .entry((user_id.to_string(), goal_id.to_string()))
            .and_modify(|p| {
                p.module_sequence = sequence.to_vec();
                p.updated_at = now;
            })
            .or_insert_with(|| LearningPathway {
                user_id: user_id.to_string(),
                goal_id: goal_id.to_string(),
                module_sequence: sequence.to_vec(),
                current_position: 0,
                created_at: now,
                updated_at: now,
            });
        Ok(pathway.clone())
    }

    async fn set_pathway_position(
        &self,
        user_id: &str,
        goal_id: &str,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<LearningPathway>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(pathway) = inner
            .pathways
            .get_mut(&(user_id.to_string(), goal_id.to_string()))
        else {
            return Ok(None);
        };
        pathway.current_position = position;
        pathway.updated_at = now;
        Ok(Some(pathway.clone()))
    }

    async fn mark_intervention_executed(
        &self,
        intervention_id: &str,
        executed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner
            .interventions
            .iter_mut()
            .find(|r| r.intervention.id == intervention_id)
        else {
            return Ok(false);
        };
        record.status = InterventionStatus::Executed;
        record.executed_at = Some(at);
        record.executed_by = Some(executed_by.to_string());
        Ok(true)
    }

    async fn list_interventions(
        &self,
        user_id: &str,
        status: Option<InterventionStatus>,
    ) -> Result<Vec<InterventionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .interventions
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BktParams;
    use chrono::Duration;

    fn event(user_id: &str, id: &str, at: DateTime<Utc>) -> LearningEvent {
        LearningEvent {
            id: id.to_string(),
            user_id: user_id.to_string(),
            event_type: "knowledge_update".to_string(),
            content_id: None,
            performance_data: serde_json::Value::Null,
            session_id: None,
            difficulty: None,
            time_spent: None,
            result: Some(true),
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_attempts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut state = KnowledgeState::initial("u1", "t1", &BktParams::default(), now);
        state.attempts = 1;

        assert!(store.commit_knowledge_update(&state, None, &event("u1", "e1", now)).await.unwrap());
        // second insert-if-absent loses
        assert!(!store.commit_knowledge_update(&state, None, &event("u1", "e2", now)).await.unwrap());

        let mut next = state.clone();
        next.attempts = 2;
        assert!(!store.commit_knowledge_update(&next, Some(0), &event("u1", "e3", now)).await.unwrap());
        assert!(store.commit_knowledge_update(&next, Some(1), &event("u1", "e4", now)).await.unwrap());

        assert_eq!(store.event_count("u1").await, 2);
        let stored = store.get_knowledge_state("u1", "t1").await.unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn recent_events_are_windowed_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.append_event(&event("u1", "old", now - Duration::days(40))).await.unwrap();
        store.append_event(&event("u1", "a", now - Duration::days(2))).await.unwrap();
        store.append_event(&event("u1", "b", now - Duration::days(1))).await.unwrap();
        store.append_event(&event("u2", "other", now)).await.unwrap();

        let events = store
            .list_recent_events("u1", now - Duration::days(30), 100)
            .await
            .unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let capped = store.list_recent_events("u1", now - Duration::days(30), 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, "b");
    }

    #[tokio::test]
    async fn pathway_upsert_keeps_position() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_pathway_sequence("u1", "g1", &["topic_a".to_string()], now)
            .await
            .unwrap();
        store.set_pathway_position("u1", "g1", 1, now).await.unwrap();

        let updated = store
            .upsert_pathway_sequence("u1", "g1", &["topic_b".to_string(), "topic_c".to_string()], now)
            .await
            .unwrap();
        assert_eq!(updated.current_position, 1);
        assert_eq!(updated.module_sequence, vec!["topic_b", "topic_c"]);
    }
}
