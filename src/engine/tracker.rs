use chrono::{DateTime, Utc};
use serde_json::json;

use super::{clamp01, require_id, LearningEngine};
use crate::cache::keys;
use crate::error::{EngineError, StoreError};
use crate::params::BktParams;
use crate::types::{
    KnowledgeState, KnowledgeUpdate, LearningEvent, Performance, EVENT_KNOWLEDGE_UPDATE,
};

/// Posterior P(known) after one observation, followed by the learning
/// transition.
pub fn bkt_posterior(p_know: f64, correct: bool, params: &BktParams) -> f64 {
    let p_know = clamp01(p_know);
    let (known, unknown) = if correct {
        (p_know * (1.0 - params.p_slip), (1.0 - p_know) * params.p_guess)
    } else {
        (p_know * params.p_slip, (1.0 - p_know) * (1.0 - params.p_guess))
    };

    let evidence = known + unknown;
    let conditioned = if evidence > 0.0 { known / evidence } else { p_know };
    clamp01(conditioned + (1.0 - conditioned) * params.p_transit)
}

/// Confidence grows with attempt volume and with how far accuracy sits from
/// a coin flip.
pub fn confidence_from_counts(attempts: u32, correct_attempts: u32, params: &BktParams) -> f64 {
    if attempts == 0 {
        return params.initial_confidence;
    }
    let consistency = (attempts as f64 / params.consistency_attempts.max(1.0)).min(1.0);
    let accuracy = correct_attempts as f64 / attempts as f64;
    let accuracy_signal = (accuracy - 0.5).abs() * 2.0;
    clamp01(consistency * accuracy_signal)
}

pub fn apply_observation(
    prior: &KnowledgeState,
    performance: &Performance,
    params: &BktParams,
    now: DateTime<Utc>,
) -> KnowledgeState {
    let attempts = prior.attempts.saturating_add(1);
    let correct_attempts = prior
        .correct_attempts
        .saturating_add(u32::from(performance.result))
        .min(attempts);

    KnowledgeState {
        user_id: prior.user_id.clone(),
        topic_id: prior.topic_id.clone(),
        mastery_level: bkt_posterior(prior.mastery_level, performance.result, params),
        confidence: confidence_from_counts(attempts, correct_attempts, params),
        attempts,
        correct_attempts,
        last_updated: now,
    }
}

fn validate_performance(performance: &Performance) -> Result<(), EngineError> {
    require_id("contentId", &performance.content_id)?;
    if !performance.difficulty.is_finite() || !(0.0..=1.0).contains(&performance.difficulty) {
        return Err(EngineError::validation(format!(
            "difficulty must be within [0, 1], got {}",
            performance.difficulty
        )));
    }
    if !performance.time_spent.is_finite() || performance.time_spent < 0.0 {
        return Err(EngineError::validation(format!(
            "timeSpent must be a non-negative number of seconds, got {}",
            performance.time_spent
        )));
    }
    Ok(())
}

fn knowledge_event(
    before: &KnowledgeState,
    after: &KnowledgeState,
    performance: &Performance,
) -> LearningEvent {
    LearningEvent {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: after.user_id.clone(),
        event_type: EVENT_KNOWLEDGE_UPDATE.to_string(),
        content_id: Some(performance.content_id.clone()),
        performance_data: json!({
            "topicId": after.topic_id,
            "beforeMastery": before.mastery_level,
            "afterMastery": after.mastery_level,
            "beforeConfidence": before.confidence,
            "afterConfidence": after.confidence,
            "attempts": after.attempts,
            "correctAttempts": after.correct_attempts,
        }),
        session_id: performance.session_id.clone(),
        difficulty: Some(performance.difficulty),
        time_spent: Some(performance.time_spent),
        result: Some(performance.result),
        timestamp: after.last_updated,
    }
}

impl LearningEngine {
    /// Folds one observation into the (user, topic) knowledge state.
    ///
    /// Concurrent calls for the same pair are serialized in-process and
    /// guarded by a compare-and-set on `attempts` in the store, so no
    /// observation is lost. Re-submitting an observation counts it twice.
    pub async fn update_knowledge_state(
        &self,
        user_id: &str,
        topic_id: &str,
        performance: &Performance,
    ) -> Result<KnowledgeUpdate, EngineError> {
        require_id("userId", user_id)?;
        require_id("topicId", topic_id)?;
        validate_performance(performance)?;

        let lock = self.topic_locks.lock_for(&format!("{user_id}\u{1f}{topic_id}"));
        let _guard = lock.lock().await;

        let bkt = &self.params.bkt;
        for attempt in 0..=self.params.max_update_retries {
            let loaded = self
                .timed(
                    "get_knowledge_state",
                    self.store.get_knowledge_state(user_id, topic_id),
                )
                .await
                .map_err(|err| {
                    tracing::error!(user_id, topic_id, operation = "update_knowledge_state", error = %err, "failed to load knowledge state");
                    err
                })?;

            let now = Utc::now();
            let expected_attempts = loaded.as_ref().map(|s| s.attempts);
            let prior = loaded.unwrap_or_else(|| KnowledgeState::initial(user_id, topic_id, bkt, now));
            let updated = apply_observation(&prior, performance, bkt, now);
            let event = knowledge_event(&prior, &updated, performance);

            let committed = self
                .timed(
                    "commit_knowledge_update",
                    self.store.commit_knowledge_update(&updated, expected_attempts, &event),
                )
                .await
                .map_err(|err| {
                    tracing::error!(user_id, topic_id, operation = "update_knowledge_state", error = %err, "failed to persist knowledge state");
                    err
                })?;

            if committed {
                self.invalidate_user(
                    user_id,
                    &[
                        keys::user_recommendations_tag(user_id),
                        keys::user_risk_tag(user_id),
                        keys::user_topic_tag(user_id, topic_id),
                    ],
                )
                .await;

                tracing::debug!(
                    user_id,
                    topic_id,
                    before = prior.mastery_level,
                    after = updated.mastery_level,
                    "knowledge state updated"
                );
                return Ok(KnowledgeUpdate {
                    topic_id: topic_id.to_string(),
                    mastery_level: updated.mastery_level,
                    confidence: updated.confidence,
                });
            }

            tracing::warn!(user_id, topic_id, attempt, "knowledge state changed concurrently, retrying");
        }

        tracing::error!(user_id, topic_id, operation = "update_knowledge_state", "gave up after repeated write conflicts");
        Err(StoreError::Conflict {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
        }
        .into())
    }
}
