use std::time::Duration;

pub const RECOMMENDATION_TTL: Duration = Duration::from_secs(10 * 60);
pub const RISK_ASSESSMENT_TTL: Duration = Duration::from_secs(30 * 60);

pub fn recommendation_key(user_id: &str, current_topic: Option<&str>, count: i64) -> String {
    format!(
        "learning:{}:recommendations:{}:{}",
        user_id,
        current_topic.unwrap_or("*"),
        count
    )
}

pub fn risk_assessment_key(user_id: &str) -> String {
    format!("learning:{}:risk", user_id)
}

pub fn user_recommendations_tag(user_id: &str) -> String {
    format!("user:{}:recommendations", user_id)
}

pub fn user_risk_tag(user_id: &str) -> String {
    format!("user:{}:risk", user_id)
}

pub fn user_topic_tag(user_id: &str, topic_id: &str) -> String {
    format!("user:{}:topic:{}", user_id, topic_id)
}

/// Redis set holding the keys written under `tag`.
pub fn tag_index_key(tag: &str) -> String {
    format!("tag:{}", tag)
}

/// Present while some key under `tag` was written without expiry; the tag
/// index must then never expire.
pub fn tag_pin_key(tag: &str) -> String {
    format!("tagpin:{}", tag)
}
