use chrono::{DateTime, Duration, Utc};

use super::{clamp01, mean, require_id, LearningEngine};
use crate::cache::keys;
use crate::error::EngineError;
use crate::params::RiskParams;
use crate::types::{
    Intervention, InterventionPriority, KnowledgeState, LearningEvent, PerformanceTrend,
    RiskAssessment, RiskFactors,
};

const SECONDS_PER_DAY: f64 = 86_400.0;

fn success_rate(events: &[LearningEvent]) -> f64 {
    let (correct, total) = events
        .iter()
        .filter_map(|e| e.result)
        .fold((0usize, 0usize), |(correct, total), r| (correct + usize::from(r), total + 1));
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// `events` must be newest first.
pub fn compute_risk_factors(
    events: &[LearningEvent],
    states: &[KnowledgeState],
    now: DateTime<Utc>,
) -> RiskFactors {
    let days_since_last_activity = events.first().map(|latest| {
        let elapsed = now.signed_duration_since(latest.timestamp);
        (elapsed.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY).max(0.0)
    });

    RiskFactors {
        days_since_last_activity,
        avg_session_length: mean(events.iter().filter_map(|e| e.time_spent).filter(|t| *t > 0.0)),
        success_rate: success_rate(events),
        avg_mastery: mean(states.iter().map(|s| s.mastery_level)),
        total_events: events.len(),
        knowledge_state_count: states.len(),
    }
}

/// Never-active learners count as inactive beyond every threshold.
fn inactive_days(factors: &RiskFactors) -> f64 {
    factors.days_since_last_activity.unwrap_or(f64::INFINITY)
}

pub fn dropout_probability(factors: &RiskFactors, params: &RiskParams) -> f64 {
    let mut score = 0.0;

    let inactive = inactive_days(factors);
    if inactive > params.inactive_days_high {
        score += params.inactive_weight_high;
    } else if inactive > params.inactive_days_low {
        score += params.inactive_weight_low;
    }

    if factors.success_rate < params.success_rate_critical {
        score += params.success_weight_critical;
    } else if factors.success_rate < params.success_rate_low {
        score += params.success_weight_low;
    }

    if factors.avg_session_length < params.short_session_secs {
        score += params.short_session_weight;
    }
    if factors.total_events < params.min_events {
        score += params.few_events_weight;
    }
    if factors.avg_mastery < params.low_mastery {
        score += params.low_mastery_weight;
    }

    clamp01(score)
}

/// Compares the newest window of events against the window before it.
/// `events` must be newest first.
pub fn performance_trend(events: &[LearningEvent], params: &RiskParams) -> PerformanceTrend {
    if events.len() < params.trend_min_events {
        return PerformanceTrend::Stable;
    }

    let window = params.trend_window.max(1);
    let recent = &events[..window.min(events.len())];
    let recent_rate = success_rate(recent);

    let older = events.get(window..).unwrap_or(&[]);
    let older = &older[..window.min(older.len())];
    let older_rate = if older.len() < window {
        recent_rate
    } else {
        success_rate(older)
    };

    let improvement = recent_rate - older_rate;
    if improvement > params.trend_threshold {
        PerformanceTrend::Improving
    } else if improvement < -params.trend_threshold {
        PerformanceTrend::Declining
    } else {
        PerformanceTrend::Stable
    }
}

fn intervention(
    kind: &str,
    priority: InterventionPriority,
    action: &str,
    message: String,
) -> Intervention {
    Intervention {
        id: uuid::Uuid::new_v4().to_string(),
        kind: kind.to_string(),
        priority,
        action: action.to_string(),
        message,
    }
}

/// Each rule fires independently; output is ordered by rule, not priority.
pub fn recommend_interventions(
    factors: &RiskFactors,
    dropout: f64,
    params: &RiskParams,
) -> Vec<Intervention> {
    let mut interventions = Vec::new();

    if dropout > params.mentor_threshold {
        interventions.push(intervention(
            "dropout_risk",
            InterventionPriority::Urgent,
            "personal_mentor_assignment",
            format!("dropout probability {dropout:.2} calls for a personal mentor"),
        ));
    }

    let inactive = inactive_days(factors);
    if inactive > params.inactive_days_high {
        let message = match factors.days_since_last_activity {
            Some(days) => format!("no learning activity for {days:.0} days"),
            None => "no learning activity recorded".to_string(),
        };
        interventions.push(intervention(
            "inactivity",
            InterventionPriority::High,
            "send_motivation_email",
            message,
        ));
    }

    if factors.success_rate < params.success_rate_critical {
        interventions.push(intervention(
            "low_performance",
            InterventionPriority::Medium,
            "reduce_difficulty",
            format!(
                "success rate {:.0}% is too low for the current difficulty",
                factors.success_rate * 100.0
            ),
        ));
    }

    if factors.avg_session_length < params.short_session_secs {
        interventions.push(intervention(
            "low_engagement",
            InterventionPriority::Medium,
            "gamification_boost",
            format!(
                "average session of {:.0}s suggests low engagement",
                factors.avg_session_length
            ),
        ));
    }

    interventions
}

/// `events` must be newest first.
pub fn build_assessment(
    user_id: &str,
    events: &[LearningEvent],
    states: &[KnowledgeState],
    params: &RiskParams,
    now: DateTime<Utc>,
) -> RiskAssessment {
    let factors = compute_risk_factors(events, states, now);
    let dropout = dropout_probability(&factors, params);
    let interventions = recommend_interventions(&factors, dropout, params);
    let confidence_score =
        clamp01(factors.total_events as f64 / params.confidence_full_events.max(1.0));

    RiskAssessment {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        dropout_probability: dropout,
        performance_trend: performance_trend(events, params),
        confidence_score,
        risk_factors: factors,
        interventions_recommended: interventions,
        model_version: params.model_version.clone(),
        created_at: now,
    }
}

impl LearningEngine {
    /// Scores dropout risk from the last 30 days of activity and persists the
    /// assessment. A cached assessment is returned as-is without a new record.
    pub async fn assess_user_risk(&self, user_id: &str) -> Result<RiskAssessment, EngineError> {
        require_id("userId", user_id)?;
        let params = &self.params.risk;

        let cache_key = keys::risk_assessment_key(user_id);
        if let Some(cached) = self.cache_get::<RiskAssessment>(&cache_key).await {
            return Ok(cached);
        }

        let generation = self.cache_generations.current(user_id);
        let now = Utc::now();
        let since = now - Duration::days(params.lookback_days);
        let events = self
            .timed(
                "list_recent_events",
                self.store.list_recent_events(user_id, since, params.max_events),
            )
            .await
            .map_err(|err| {
                tracing::error!(user_id, operation = "assess_user_risk", error = %err, "failed to load learning events");
                err
            })?;
        let states = self
            .timed("list_knowledge_states", self.store.list_knowledge_states(user_id))
            .await
            .map_err(|err| {
                tracing::error!(user_id, operation = "assess_user_risk", error = %err, "failed to load knowledge states");
                err
            })?;

        let assessment = build_assessment(user_id, &events, &states, params, now);

        self.timed(
            "append_risk_assessment",
            self.store.append_risk_assessment(&assessment),
        )
        .await
        .map_err(|err| {
            tracing::error!(user_id, operation = "assess_user_risk", error = %err, "failed to persist risk assessment");
            err
        })?;

        tracing::info!(
            user_id,
            dropout = assessment.dropout_probability,
            trend = assessment.performance_trend.as_str(),
            interventions = assessment.interventions_recommended.len(),
            "risk assessment recorded"
        );

        self.cache_set_if_current(
            user_id,
            generation,
            &cache_key,
            &assessment,
            keys::RISK_ASSESSMENT_TTL,
            &[keys::user_risk_tag(user_id)],
        )
        .await;

        Ok(assessment)
    }

    pub async fn latest_risk_assessment(
        &self,
        user_id: &str,
    ) -> Result<Option<RiskAssessment>, EngineError> {
        require_id("userId", user_id)?;
        let latest = self
            .timed(
                "latest_risk_assessment",
                self.store.latest_risk_assessment(user_id),
            )
            .await?;
        Ok(latest)
    }
}
