//! Property-Based Tests for the scoring functions
//!
//! Tests the following invariants:
//! - Mastery and confidence stay within [0, 1] for any observation sequence
//! - correct_attempts never exceeds attempts
//! - A correct answer never lowers mastery, and a streak raises it strictly
//! - Dropout probability stays within [0, 1] for any risk factors
//! - Pathways never contain a topic twice

use chrono::Utc;
use proptest::prelude::*;

use learning_engine::engine::{
    apply_observation, bkt_posterior, build_pathway, build_recommendations, dropout_probability,
};
use learning_engine::params::{BktParams, PathwayParams, RecommendationParams, RiskParams};
use learning_engine::types::{KnowledgeState, Performance, RiskFactors};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_f64_0_1() -> impl Strategy<Value = f64> {
    (0u64..=1000u64).prop_map(|v| v as f64 / 1000.0)
}

fn arb_performance() -> impl Strategy<Value = Performance> {
    (any::<bool>(), arb_f64_0_1(), 0.0f64..3600.0).prop_map(|(result, difficulty, time_spent)| {
        Performance {
            content_id: "lesson".to_string(),
            result,
            time_spent,
            difficulty,
            session_id: None,
        }
    })
}

fn arb_state(topic: usize) -> impl Strategy<Value = KnowledgeState> {
    (arb_f64_0_1(), arb_f64_0_1(), 0u32..200).prop_map(move |(mastery, confidence, attempts)| {
        KnowledgeState {
            user_id: "u1".to_string(),
            topic_id: format!("t{topic}"),
            mastery_level: mastery,
            confidence,
            attempts,
            correct_attempts: attempts / 2,
            last_updated: Utc::now(),
        }
    })
}

fn arb_states() -> impl Strategy<Value = Vec<KnowledgeState>> {
    (0usize..12).prop_flat_map(|n| (0..n).map(arb_state).collect::<Vec<_>>())
}

fn arb_risk_factors() -> impl Strategy<Value = RiskFactors> {
    (
        proptest::option::of(0.0f64..400.0), // days_since_last_activity
        0.0f64..7200.0,                      // avg_session_length
        arb_f64_0_1(),                       // success_rate
        arb_f64_0_1(),                       // avg_mastery
        0usize..200,                         // total_events
        0usize..50,                          // knowledge_state_count
    )
        .prop_map(|(days, session, success, mastery, events, states)| RiskFactors {
            days_since_last_activity: days,
            avg_session_length: session,
            success_rate: success,
            avg_mastery: mastery,
            total_events: events,
            knowledge_state_count: states,
        })
}

// ============================================================================
// Knowledge tracing
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_state_stays_bounded(observations in prop::collection::vec(arb_performance(), 1..60)) {
        let params = BktParams::default();
        let mut state = KnowledgeState::initial("u1", "t1", &params, Utc::now());
        for performance in &observations {
            state = apply_observation(&state, performance, &params, Utc::now());
            prop_assert!((0.0..=1.0).contains(&state.mastery_level));
            prop_assert!((0.0..=1.0).contains(&state.confidence));
            prop_assert!(state.correct_attempts <= state.attempts);
        }
        prop_assert_eq!(state.attempts as usize, observations.len());
        let correct = observations.iter().filter(|p| p.result).count();
        prop_assert_eq!(state.correct_attempts as usize, correct);
    }

    #[test]
    fn prop_correct_answer_never_lowers_mastery(p in arb_f64_0_1()) {
        let params = BktParams::default();
        let after = bkt_posterior(p, true, &params);
        prop_assert!(after >= p);
    }

    #[test]
    fn prop_posterior_is_deterministic(p in arb_f64_0_1(), correct in any::<bool>()) {
        let params = BktParams::default();
        prop_assert_eq!(
            bkt_posterior(p, correct, &params).to_bits(),
            bkt_posterior(p, correct, &params).to_bits()
        );
    }
}

#[test]
fn streak_of_correct_answers_raises_mastery_strictly() {
    let params = BktParams::default();
    let correct = Performance {
        content_id: "lesson".to_string(),
        result: true,
        time_spent: 60.0,
        difficulty: 0.5,
        session_id: None,
    };
    let mut state = KnowledgeState::initial("u1", "t1", &params, Utc::now());
    assert_eq!(state.mastery_level, 0.1);

    for step in 0..100 {
        let next = apply_observation(&state, &correct, &params, Utc::now());
        assert!(next.mastery_level <= 1.0, "step {step}: {}", next.mastery_level);
        if state.mastery_level < 1.0 {
            assert!(
                next.mastery_level > state.mastery_level,
                "step {step}: {} -> {}",
                state.mastery_level,
                next.mastery_level
            );
        } else {
            assert_eq!(next.mastery_level, 1.0);
        }
        state = next;
    }
}

// ============================================================================
// Recommendations, risk, pathways
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_recommendations_respect_count(states in arb_states(), count in 0usize..20) {
        let params = RecommendationParams::default();
        let recs = build_recommendations(&states, count, &params);
        prop_assert!(recs.len() <= count);
        if !states.is_empty() {
            prop_assert_eq!(recs.len(), count);
        }
        for rec in &recs {
            prop_assert!((0.0..=1.0).contains(&rec.difficulty));
            prop_assert!((0.0..=1.0).contains(&rec.confidence));
        }
    }

    #[test]
    fn prop_dropout_bounded(factors in arb_risk_factors()) {
        let p = dropout_probability(&factors, &RiskParams::default());
        prop_assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn prop_pathway_has_no_duplicates(states in arb_states()) {
        let params = PathwayParams::default();
        let pathway = build_pathway(&states, &params);
        let mut seen = std::collections::HashSet::new();
        for module in &pathway {
            prop_assert!(seen.insert(module.clone()), "duplicate module {}", module);
        }
        let weak = pathway.iter().filter(|m| m.starts_with("topic_")).count();
        prop_assert!(weak <= params.weak_limit);
    }
}
