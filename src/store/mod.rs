//! Persistence contract for the learning engine.
//!
//! The engine only talks to storage through [`Store`], so backends can be
//! swapped without touching scoring logic. Two backends ship with the crate:
//! [`MemoryStore`] for tests and embedded use, [`SqliteStore`] for durable
//! deployments.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{
    InterventionRecord, InterventionStatus, KnowledgeState, LearningEvent, LearningPathway,
    RiskAssessment,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_knowledge_state(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<KnowledgeState>, StoreError>;

    /// All states for a user, in insertion order.
    async fn list_knowledge_states(&self, user_id: &str)
        -> Result<Vec<KnowledgeState>, StoreError>;

    /// Writes `state` and appends `event` atomically.
    ///
    /// With `expected_attempts = None` the state is inserted only if no row
    /// exists yet; with `Some(n)` the row is replaced only while its stored
    /// `attempts` still equals `n`. Returns `false` when the guard fails and
    /// nothing was written.
    async fn commit_knowledge_update(
        &self,
        state: &KnowledgeState,
        expected_attempts: Option<u32>,
        event: &LearningEvent,
    ) -> Result<bool, StoreError>;

    async fn append_event(&self, event: &LearningEvent) -> Result<(), StoreError>;

    /// Events at or after `since`, newest first, at most `limit`.
    async fn list_recent_events(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LearningEvent>, StoreError>;

    /// Persists the assessment and one pending record per intervention.
    async fn append_risk_assessment(&self, assessment: &RiskAssessment) -> Result<(), StoreError>;

    async fn latest_risk_assessment(
        &self,
        user_id: &str,
    ) -> Result<Option<RiskAssessment>, StoreError>;

    async fn get_pathway(
        &self,
        user_id: &str,
        goal_id: &str,
    ) -> Result<Option<LearningPathway>, StoreError>;

    /// Creates the pathway at position 0, or replaces the sequence of an
    /// existing one without moving its position.
    async fn upsert_pathway_sequence(
        &self,
        user_id: &str,
        goal_id: &str,
        sequence: &[String],
        now: DateTime<Utc>,
    ) -> Result<LearningPathway, StoreError>;

    async fn set_pathway_position(
        &self,
        user_id: &str,
        goal_id: &str,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<LearningPathway>, StoreError>;

    /// Returns `false` if no intervention has this id.
    async fn mark_intervention_executed(
        &self,
        intervention_id: &str,
        executed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Newest first; `status = None` returns every record.
    async fn list_interventions(
        &self,
        user_id: &str,
        status: Option<InterventionStatus>,
    ) -> Result<Vec<InterventionRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_object_safe() {
        fn _takes_boxed(_: Box<dyn Store>) {}
    }
}
