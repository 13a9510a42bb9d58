use serde::{Deserialize, Serialize};

use crate::error::ParamsError;

/// Bayesian Knowledge Tracing parameters. `p_init` seeds a topic the first
/// time a learner is observed on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BktParams {
    pub p_init: f64,
    pub p_transit: f64,
    pub p_slip: f64,
    pub p_guess: f64,
    pub initial_confidence: f64,
    /// Attempts needed before the consistency term saturates.
    pub consistency_attempts: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            p_init: 0.1,
            p_transit: 0.1,
            p_slip: 0.1,
            p_guess: 0.25,
            initial_confidence: 0.1,
            consistency_attempts: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendationParams {
    pub default_count: i64,
    pub max_count: i64,
    pub cold_start_difficulty: f64,
    pub cold_start_confidence: f64,
    pub reinforce_below: f64,
    /// Strict lower bound: a topic needs more attempts than this.
    pub reinforce_attempts_above: u32,
    pub reinforce_limit: usize,
    pub reinforce_step_down: f64,
    pub progress_above: f64,
    pub progress_step_up: f64,
    pub progress_confidence: f64,
    pub fill_confidence: f64,
    pub min_difficulty: f64,
    pub max_difficulty: f64,
}

impl Default for RecommendationParams {
    fn default() -> Self {
        Self {
            default_count: 5,
            max_count: 50,
            cold_start_difficulty: 0.1,
            cold_start_confidence: 0.9,
            reinforce_below: 0.7,
            reinforce_attempts_above: 2,
            reinforce_limit: 2,
            reinforce_step_down: 0.2,
            progress_above: 0.8,
            progress_step_up: 0.2,
            progress_confidence: 0.8,
            fill_confidence: 0.6,
            min_difficulty: 0.1,
            max_difficulty: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskParams {
    pub lookback_days: i64,
    pub max_events: usize,
    pub inactive_days_high: f64,
    pub inactive_days_low: f64,
    pub inactive_weight_high: f64,
    pub inactive_weight_low: f64,
    pub success_rate_critical: f64,
    pub success_rate_low: f64,
    pub success_weight_critical: f64,
    pub success_weight_low: f64,
    pub short_session_secs: f64,
    pub short_session_weight: f64,
    pub min_events: usize,
    pub few_events_weight: f64,
    pub low_mastery: f64,
    pub low_mastery_weight: f64,
    pub mentor_threshold: f64,
    pub trend_min_events: usize,
    pub trend_window: usize,
    pub trend_threshold: f64,
    pub confidence_full_events: f64,
    pub model_version: String,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            max_events: 100,
            inactive_days_high: 7.0,
            inactive_days_low: 3.0,
            inactive_weight_high: 0.3,
            inactive_weight_low: 0.1,
            success_rate_critical: 0.3,
            success_rate_low: 0.5,
            success_weight_critical: 0.4,
            success_weight_low: 0.2,
            short_session_secs: 300.0,
            short_session_weight: 0.2,
            min_events: 5,
            few_events_weight: 0.1,
            low_mastery: 0.3,
            low_mastery_weight: 0.2,
            mentor_threshold: 0.7,
            trend_min_events: 5,
            trend_window: 10,
            trend_threshold: 0.1,
            confidence_full_events: 20.0,
            model_version: "rules-v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathwayParams {
    pub weak_below: f64,
    pub weak_limit: usize,
    pub strong_above: f64,
}

impl Default for PathwayParams {
    fn default() -> Self {
        Self {
            weak_below: 0.6,
            weak_limit: 5,
            strong_above: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineParams {
    pub bkt: BktParams,
    pub recommendation: RecommendationParams,
    pub risk: RiskParams,
    pub pathway: PathwayParams,
    pub max_update_retries: u32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            bkt: BktParams::default(),
            recommendation: RecommendationParams::default(),
            risk: RiskParams::default(),
            pathway: PathwayParams::default(),
            max_update_retries: 3,
        }
    }
}

impl EngineParams {
    /// Loads overrides from a JSON file. Missing sections keep their defaults.
    pub fn from_json_file(path: &str) -> Result<Self, ParamsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ParamsError::Read {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ParamsError::Parse {
            path: path.to_string(),
            source,
        })
    }
}
