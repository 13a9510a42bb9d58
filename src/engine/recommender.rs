use super::{mean, require_id, LearningEngine};
use crate::cache::keys;
use crate::error::EngineError;
use crate::params::RecommendationParams;
use crate::types::{KnowledgeState, Recommendation, RecommendationKind};

/// Builds up to `count` recommendations: reinforcement for struggling
/// topics, one step up from the strongest topic, then adaptive practice at
/// the learner's average level. A learner with no history gets a single
/// fundamentals item regardless of `count`.
pub fn build_recommendations(
    states: &[KnowledgeState],
    count: usize,
    params: &RecommendationParams,
) -> Vec<Recommendation> {
    if count == 0 {
        return Vec::new();
    }

    if states.is_empty() {
        return vec![Recommendation {
            content_id: "fundamentals".to_string(),
            kind: RecommendationKind::ColdStart,
            difficulty: params.cold_start_difficulty,
            reason: "fundamentals for new learner".to_string(),
            confidence: params.cold_start_confidence,
        }];
    }

    let mut recommendations: Vec<Recommendation> = states
        .iter()
        .filter(|s| {
            s.mastery_level < params.reinforce_below && s.attempts > params.reinforce_attempts_above
        })
        .take(params.reinforce_limit)
        .map(|s| Recommendation {
            content_id: format!("review_{}", s.topic_id),
            kind: RecommendationKind::Reinforcement,
            difficulty: (s.mastery_level - params.reinforce_step_down).max(params.min_difficulty),
            reason: format!(
                "reinforce {}: mastery {:.2} below target",
                s.topic_id, s.mastery_level
            ),
            confidence: s.confidence,
        })
        .collect();

    let strongest = states
        .iter()
        .filter(|s| s.mastery_level > params.progress_above)
        .max_by(|a, b| a.mastery_level.total_cmp(&b.mastery_level));
    if let Some(best) = strongest {
        recommendations.push(Recommendation {
            content_id: format!("advance_{}", best.topic_id),
            kind: RecommendationKind::Progression,
            difficulty: (best.mastery_level + params.progress_step_up).min(params.max_difficulty),
            reason: format!("ready for harder material after {}", best.topic_id),
            confidence: params.progress_confidence,
        });
    }

    let avg_mastery = mean(states.iter().map(|s| s.mastery_level));
    let adaptive_difficulty = avg_mastery.clamp(params.min_difficulty, params.max_difficulty);
    let mut slot = 0;
    while recommendations.len() < count {
        slot += 1;
        recommendations.push(Recommendation {
            content_id: format!("adaptive_practice_{slot}"),
            kind: RecommendationKind::Adaptive,
            difficulty: adaptive_difficulty,
            reason: "adaptive practice at current level".to_string(),
            confidence: params.fill_confidence,
        });
    }

    recommendations.truncate(count);
    recommendations
}

impl LearningEngine {
    /// Recommendations are advisory: storage failures degrade to an empty
    /// list instead of an error. `None` requests the default count.
    pub async fn recommend_content(
        &self,
        user_id: &str,
        current_topic: Option<&str>,
        num_recommendations: Option<i64>,
    ) -> Result<Vec<Recommendation>, EngineError> {
        require_id("userId", user_id)?;
        let params = &self.params.recommendation;
        let requested = num_recommendations.unwrap_or(params.default_count);
        if requested < 0 {
            return Err(EngineError::validation(format!(
                "numRecommendations must not be negative, got {requested}"
            )));
        }
        if requested > params.max_count {
            return Err(EngineError::validation(format!(
                "numRecommendations must be at most {}, got {requested}",
                params.max_count
            )));
        }
        if requested == 0 {
            return Ok(Vec::new());
        }

        let cache_key = keys::recommendation_key(user_id, current_topic, requested);
        if let Some(cached) = self.cache_get::<Vec<Recommendation>>(&cache_key).await {
            return Ok(cached);
        }

        let generation = self.cache_generations.current(user_id);
        let states = match self
            .timed("list_knowledge_states", self.store.list_knowledge_states(user_id))
            .await
        {
            Ok(states) => states,
            Err(err) => {
                tracing::warn!(user_id, operation = "recommend_content", error = %err, "knowledge states unavailable, returning no recommendations");
                return Ok(Vec::new());
            }
        };

        let recommendations = build_recommendations(&states, requested as usize, params);

        let mut tags = vec![keys::user_recommendations_tag(user_id)];
        if let Some(topic) = current_topic {
            tags.push(keys::user_topic_tag(user_id, topic));
        }
        self.cache_set_if_current(
            user_id,
            generation,
            &cache_key,
            &recommendations,
            keys::RECOMMENDATION_TTL,
            &tags,
        )
        .await;

        Ok(recommendations)
    }
}
