use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::BktParams;

pub const EVENT_KNOWLEDGE_UPDATE: &str = "knowledge_update";

// ========== Knowledge state ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeState {
    pub user_id: String,
    pub topic_id: String,
    pub mastery_level: f64,
    pub confidence: f64,
    pub attempts: u32,
    pub correct_attempts: u32,
    pub last_updated: DateTime<Utc>,
}

impl KnowledgeState {
    pub fn initial(user_id: &str, topic_id: &str, params: &BktParams, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            mastery_level: params.p_init,
            confidence: params.initial_confidence,
            attempts: 0,
            correct_attempts: 0,
            last_updated: now,
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.correct_attempts as f64 / self.attempts as f64
    }
}

/// One observed attempt on a piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub content_id: String,
    pub result: bool,
    /// Seconds.
    pub time_spent: f64,
    pub difficulty: f64,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeUpdate {
    pub topic_id: String,
    pub mastery_level: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeProfile {
    pub topic_count: usize,
    pub avg_mastery: f64,
    pub mastered_topics: Vec<String>,
    pub weak_topics: Vec<String>,
    pub total_attempts: u64,
    pub overall_accuracy: f64,
}

// ========== Event log ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    pub content_id: Option<String>,
    pub performance_data: serde_json::Value,
    pub session_id: Option<String>,
    pub difficulty: Option<f64>,
    pub time_spent: Option<f64>,
    pub result: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

// ========== Recommendations ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ColdStart,
    Reinforcement,
    Progression,
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub content_id: String,
    pub kind: RecommendationKind,
    pub difficulty: f64,
    pub reason: String,
    pub confidence: f64,
}

// ========== Risk ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    Improving,
    Stable,
    Declining,
}

impl PerformanceTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "improving" => Self::Improving,
            "declining" => Self::Declining,
            _ => Self::Stable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl InterventionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "medium" => Self::Medium,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: InterventionPriority,
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionStatus {
    Pending,
    Executed,
}

impl InterventionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "executed" => Self::Executed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRecord {
    pub assessment_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub intervention: Intervention,
    pub status: InterventionStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub executed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    /// `None` when the learner has no events in the lookback window.
    pub days_since_last_activity: Option<f64>,
    pub avg_session_length: f64,
    pub success_rate: f64,
    pub avg_mastery: f64,
    pub total_events: usize,
    pub knowledge_state_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub id: String,
    pub user_id: String,
    pub dropout_probability: f64,
    pub performance_trend: PerformanceTrend,
    pub confidence_score: f64,
    pub risk_factors: RiskFactors,
    pub interventions_recommended: Vec<Intervention>,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

// ========== Pathways ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPathway {
    pub user_id: String,
    pub goal_id: String,
    pub module_sequence: Vec<String>,
    pub current_position: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_uses_bkt_prior() {
        let state = KnowledgeState::initial("u1", "t1", &BktParams::default(), Utc::now());
        assert_eq!(state.mastery_level, 0.1);
        assert_eq!(state.confidence, 0.1);
        assert_eq!(state.attempts, 0);
        assert_eq!(state.accuracy(), 0.0);
    }

    #[test]
    fn intervention_serializes_kind_as_type() {
        let intervention = Intervention {
            id: "i1".into(),
            kind: "engagement".into(),
            priority: InterventionPriority::High,
            action: "send_motivation_email".into(),
            message: "inactive".into(),
        };
        let json = serde_json::to_value(&intervention).unwrap();
        assert_eq!(json["type"], "engagement");
        assert_eq!(json["priority"], "high");
    }

    #[test]
    fn priority_orders_by_severity() {
        assert!(InterventionPriority::Urgent > InterventionPriority::High);
        assert!(InterventionPriority::Medium > InterventionPriority::Low);
    }

    #[test]
    fn trend_parse_defaults_to_stable() {
        assert_eq!(PerformanceTrend::parse("DECLINING"), PerformanceTrend::Declining);
        assert_eq!(PerformanceTrend::parse("unknown"), PerformanceTrend::Stable);
    }
}
