use chrono::Utc;

use super::{require_id, LearningEngine};
use crate::error::EngineError;
use crate::params::PathwayParams;
use crate::types::{KnowledgeState, LearningPathway};

/// Weakest topics first (ascending mastery, capped), then every strong
/// topic as an advanced module. Topics in between are left out.
pub fn build_pathway(states: &[KnowledgeState], params: &PathwayParams) -> Vec<String> {
    let mut weak: Vec<&KnowledgeState> = states
        .iter()
        .filter(|s| s.mastery_level < params.weak_below)
        .collect();
    weak.sort_by(|a, b| a.mastery_level.total_cmp(&b.mastery_level));

    let strong = states
        .iter()
        .filter(|s| s.mastery_level > params.strong_above)
        .map(|s| format!("advanced_topic_{}", s.topic_id));

    weak.into_iter()
        .take(params.weak_limit)
        .map(|s| format!("topic_{}", s.topic_id))
        .chain(strong)
        .collect()
}

impl LearningEngine {
    /// Regenerates the module sequence for a goal. An existing pathway keeps
    /// its `currentPosition`.
    pub async fn generate_learning_pathway(
        &self,
        user_id: &str,
        goal_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        require_id("userId", user_id)?;
        require_id("goalId", goal_id)?;

        let states = self
            .timed("list_knowledge_states", self.store.list_knowledge_states(user_id))
            .await
            .map_err(|err| {
                tracing::error!(user_id, goal_id, operation = "generate_learning_pathway", error = %err, "failed to load knowledge states");
                err
            })?;

        let sequence = build_pathway(&states, &self.params.pathway);

        let pathway = self
            .timed(
                "upsert_pathway_sequence",
                self.store
                    .upsert_pathway_sequence(user_id, goal_id, &sequence, Utc::now()),
            )
            .await
            .map_err(|err| {
                tracing::error!(user_id, goal_id, operation = "generate_learning_pathway", error = %err, "failed to persist pathway");
                err
            })?;

        tracing::debug!(
            user_id,
            goal_id,
            modules = pathway.module_sequence.len(),
            position = pathway.current_position,
            "pathway generated"
        );
        Ok(sequence)
    }

    /// Moves the learner one module forward, stopping at the end of the
    /// sequence. `None` if the pathway was never generated.
    pub async fn advance_pathway(
        &self,
        user_id: &str,
        goal_id: &str,
    ) -> Result<Option<LearningPathway>, EngineError> {
        require_id("userId", user_id)?;
        require_id("goalId", goal_id)?;

        let Some(pathway) = self
            .timed("get_pathway", self.store.get_pathway(user_id, goal_id))
            .await?
        else {
            return Ok(None);
        };

        let next = (pathway.current_position + 1).min(pathway.module_sequence.len());
        if next == pathway.current_position {
            return Ok(Some(pathway));
        }

        let advanced = self
            .timed(
                "set_pathway_position",
                self.store
                    .set_pathway_position(user_id, goal_id, next, Utc::now()),
            )
            .await?;
        Ok(advanced)
    }
}
