use super::{mean, require_id, LearningEngine};
use crate::error::EngineError;
use crate::params::PathwayParams;
use crate::types::{KnowledgeProfile, KnowledgeState};

pub fn summarize_knowledge(states: &[KnowledgeState], params: &PathwayParams) -> KnowledgeProfile {
    let total_attempts: u64 = states.iter().map(|s| u64::from(s.attempts)).sum();
    let total_correct: u64 = states.iter().map(|s| u64::from(s.correct_attempts)).sum();

    KnowledgeProfile {
        topic_count: states.len(),
        avg_mastery: mean(states.iter().map(|s| s.mastery_level)),
        mastered_topics: states
            .iter()
            .filter(|s| s.mastery_level > params.strong_above)
            .map(|s| s.topic_id.clone())
            .collect(),
        weak_topics: states
            .iter()
            .filter(|s| s.mastery_level < params.weak_below)
            .map(|s| s.topic_id.clone())
            .collect(),
        total_attempts,
        overall_accuracy: if total_attempts == 0 {
            0.0
        } else {
            total_correct as f64 / total_attempts as f64
        },
    }
}

impl LearningEngine {
    pub async fn knowledge_profile(&self, user_id: &str) -> Result<KnowledgeProfile, EngineError> {
        require_id("userId", user_id)?;
        let states = self
            .timed("list_knowledge_states", self.store.list_knowledge_states(user_id))
            .await?;
        Ok(summarize_knowledge(&states, &self.params.pathway))
    }
}
