use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::Store;
use crate::error::StoreError;
use crate::types::{
    Intervention, InterventionPriority, InterventionRecord, InterventionStatus, KnowledgeState,
    LearningEvent, LearningPathway, PerformanceTrend, RiskAssessment,
};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const SCHEMA_VERSION: &str = "1";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        let version: Option<String> = sqlx::query_scalar(
            r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#,
        )
        .fetch_optional(&self.pool)
        .await
        .unwrap_or(None);

        if version.is_some() {
            return Ok(());
        }

        for stmt in split_sql_statements(SCHEMA_SQL) {
            let sql: String = stmt
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let trimmed = sql.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#,
        )
        .bind(SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;

        tracing::info!(version = SCHEMA_VERSION, "sqlite schema applied");
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_knowledge_state(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<KnowledgeState>, StoreError> {
        let row = sqlx::query(
            r#"SELECT * FROM "knowledge_states" WHERE "userId" = ? AND "topicId" = ? LIMIT 1"#,
        )
        .bind(user_id)
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_knowledge_state(&r)).transpose()
    }

    async fn list_knowledge_states(
        &self,
        user_id: &str,
    ) -> Result<Vec<KnowledgeState>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT * FROM "knowledge_states" WHERE "userId" = ? ORDER BY rowid ASC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_knowledge_state).collect()
    }

    async fn commit_knowledge_update(
        &self,
        state: &KnowledgeState,
        expected_attempts: Option<u32>,
        event: &LearningEvent,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let written = match expected_attempts {
            None => sqlx::query(
                r#"
                INSERT INTO "knowledge_states"
                    ("userId", "topicId", "masteryLevel", "confidence", "attempts", "correctAttempts", "lastUpdated")
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT ("userId", "topicId") DO NOTHING
                "#,
            )
            .bind(&state.user_id)
            .bind(&state.topic_id)
            .bind(state.mastery_level)
            .bind(state.confidence)
            .bind(i64::from(state.attempts))
            .bind(i64::from(state.correct_attempts))
            .bind(format_ts(state.last_updated))
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            Some(expected) => sqlx::query(
                r#"
                UPDATE "knowledge_states"
                SET "masteryLevel" = ?, "confidence" = ?, "attempts" = ?,
                    "correctAttempts" = ?, "lastUpdated" = ?
                WHERE "userId" = ? AND "topicId" = ? AND "attempts" = ?
                "#,
            )
            .bind(state.mastery_level)
            .bind(state.confidence)
            .bind(i64::from(state.attempts))
            .bind(i64::from(state.correct_attempts))
            .bind(format_ts(state.last_updated))
            .bind(&state.user_id)
            .bind(&state.topic_id)
            .bind(i64::from(expected))
            .execute(&mut *tx)
            .await?
            .rows_affected(),
        };

        if written == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn append_event(&self, event: &LearningEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_recent_events(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LearningEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM "learning_events"
            WHERE "userId" = ? AND "timestamp" >= ?
            ORDER BY "timestamp" DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(format_ts(since))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_event).collect()
    }

    async fn append_risk_assessment(&self, assessment: &RiskAssessment) -> Result<(), StoreError> {
        let risk_factors = serde_json::to_string(&assessment.risk_factors)?;
        let interventions = serde_json::to_string(&assessment.interventions_recommended)?;
        let created_at = format_ts(assessment.created_at);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO "risk_assessments"
                ("id", "userId", "dropoutProbability", "performanceTrend", "confidenceScore",
                 "riskFactors", "interventionsRecommended", "modelVersion", "createdAt")
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&assessment.id)
        .bind(&assessment.user_id)
        .bind(assessment.dropout_probability)
        .bind(assessment.performance_trend.as_str())
        .bind(assessment.confidence_score)
        .bind(risk_factors)
        .bind(interventions)
        .bind(&assessment.model_version)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        for intervention in &assessment.interventions_recommended {
            sqlx::query(
                r#"
                INSERT INTO "interventions"
                    ("id", "assessmentId", "userId", "type", "priority", "action", "message", "status", "createdAt")
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&intervention.id)
            .bind(&assessment.id)
            .bind(&assessment.user_id)
            .bind(&intervention.kind)
            .bind(intervention.priority.as_str())
            .bind(&intervention.action)
            .bind(&intervention.message)
            .bind(InterventionStatus::Pending.as_str())
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn latest_risk_assessment(
        &self,
        user_id: &str,
    ) -> Result<Option<RiskAssessment>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM "risk_assessments"
            WHERE "userId" = ?
            ORDER BY "createdAt" DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_assessment(&r)).transpose()
    }

    async fn get_pathway(
        &self,
        user_id: &str,
        goal_id: &str,
    ) -> Result<Option<LearningPathway>, StoreError> {
        let row = sqlx::query(
            r#"SELECT * FROM "learning_pathways" WHERE "userId" = ? AND "goalId" = ? LIMIT 1"#,
        )
        .bind(user_id)
        .bind(goal_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_pathway(&r)).transpose()
    }

    async fn upsert_pathway_sequence(
        &self,
        user_id: &str,
        goal_id: &str,
        sequence: &[String],
        now: DateTime<Utc>,
    ) -> Result<LearningPathway, StoreError> {
        let now = format_ts(now);
        sqlx::query(
            r#"
            INSERT INTO "learning_pathways"
                ("userId", "goalId", "moduleSequence", "currentPosition", "createdAt", "updatedAt")
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT ("userId", "goalId") DO UPDATE SET
                "moduleSequence" = excluded."moduleSequence",
                "updatedAt" = excluded."updatedAt"
            "#,
        )
        .bind(user_id)
        .bind(goal_id)
        .bind(serde_json::to_string(sequence)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_pathway(user_id, goal_id).await?.ok_or_else(|| {
            StoreError::Corrupt(format!("pathway {user_id}/{goal_id} missing after upsert"))
        })
    }

    async fn set_pathway_position(
        &self,
        user_id: &str,
        goal_id: &str,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<LearningPathway>, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE "learning_pathways" SET "currentPosition" = ?, "updatedAt" = ?
            WHERE "userId" = ? AND "goalId" = ?
            "#,
        )
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .bind(format_ts(now))
        .bind(user_id)
        .bind(goal_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        self.get_pathway(user_id, goal_id).await
    }

    async fn mark_intervention_executed(
        &self,
        intervention_id: &str,
        executed_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE "interventions" SET "status" = ?, "executedAt" = ?, "executedBy" = ?
            WHERE "id" = ?
            "#,
        )
        .bind(InterventionStatus::Executed.as_str())
        .bind(format_ts(at))
        .bind(executed_by)
        .bind(intervention_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn list_interventions(
        &self,
        user_id: &str,
        status: Option<InterventionStatus>,
    ) -> Result<Vec<InterventionRecord>, StoreError> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(
            r#"
            SELECT * FROM "interventions"
            WHERE "userId" = ? AND (? IS NULL OR "status" = ?)
            ORDER BY "createdAt" DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_intervention).collect()
    }
}

async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    event: &LearningEvent,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO "learning_events"
            ("id", "userId", "eventType", "contentId", "performanceData", "sessionId",
             "difficulty", "timeSpent", "result", "timestamp")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.id)
    .bind(&event.user_id)
    .bind(&event.event_type)
    .bind(&event.content_id)
    .bind(serde_json::to_string(&event.performance_data)?)
    .bind(&event.session_id)
    .bind(event.difficulty)
    .bind(event.time_spent)
    .bind(event.result)
    .bind(format_ts(event.timestamp))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Millisecond RFC 3339 in UTC, so lexical order matches time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn parse_count(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn map_knowledge_state(row: &SqliteRow) -> Result<KnowledgeState, StoreError> {
    Ok(KnowledgeState {
        user_id: row.try_get("userId")?,
        topic_id: row.try_get("topicId")?,
        mastery_level: row.try_get("masteryLevel")?,
        confidence: row.try_get("confidence")?,
        attempts: parse_count(row.try_get("attempts")?, "attempts")?,
        correct_attempts: parse_count(row.try_get("correctAttempts")?, "correctAttempts")?,
        last_updated: parse_ts(&row.try_get::<String, _>("lastUpdated")?)?,
    })
}

fn map_event(row: &SqliteRow) -> Result<LearningEvent, StoreError> {
    let performance_data: String = row.try_get("performanceData")?;
    Ok(LearningEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        event_type: row.try_get("eventType")?,
        content_id: row.try_get("contentId")?,
        performance_data: serde_json::from_str(&performance_data)?,
        session_id: row.try_get("sessionId")?,
        difficulty: row.try_get("difficulty")?,
        time_spent: row.try_get("timeSpent")?,
        result: row.try_get("result")?,
        timestamp: parse_ts(&row.try_get::<String, _>("timestamp")?)?,
    })
}

fn map_assessment(row: &SqliteRow) -> Result<RiskAssessment, StoreError> {
    let risk_factors: String = row.try_get("riskFactors")?;
    let interventions: String = row.try_get("interventionsRecommended")?;
    Ok(RiskAssessment {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        dropout_probability: row.try_get("dropoutProbability")?,
        performance_trend: PerformanceTrend::parse(&row.try_get::<String, _>("performanceTrend")?),
        confidence_score: row.try_get("confidenceScore")?,
        risk_factors: serde_json::from_str(&risk_factors)?,
        interventions_recommended: serde_json::from_str(&interventions)?,
        model_version: row.try_get("modelVersion")?,
        created_at: parse_ts(&row.try_get::<String, _>("createdAt")?)?,
    })
}

fn map_intervention(row: &SqliteRow) -> Result<InterventionRecord, StoreError> {
    let executed_at: Option<String> = row.try_get("executedAt")?;
    Ok(InterventionRecord {
        assessment_id: row.try_get("assessmentId")?,
        user_id: row.try_get("userId")?,
        intervention: Intervention {
            id: row.try_get("id")?,
            kind: row.try_get("type")?,
            priority: InterventionPriority::parse(&row.try_get::<String, _>("priority")?),
            action: row.try_get("action")?,
            message: row.try_get("message")?,
        },
        status: InterventionStatus::parse(&row.try_get::<String, _>("status")?),
        created_at: parse_ts(&row.try_get::<String, _>("createdAt")?)?,
        executed_at: executed_at.as_deref().map(parse_ts).transpose()?,
        executed_by: row.try_get("executedBy")?,
    })
}

fn map_pathway(row: &SqliteRow) -> Result<LearningPathway, StoreError> {
    let sequence: String = row.try_get("moduleSequence")?;
    let position: i64 = row.try_get("currentPosition")?;
    Ok(LearningPathway {
        user_id: row.try_get("userId")?,
        goal_id: row.try_get("goalId")?,
        module_sequence: serde_json::from_str(&sequence)?,
        current_position: usize::try_from(position)
            .map_err(|_| StoreError::Corrupt(format!("currentPosition out of range: {position}")))?,
        created_at: parse_ts(&row.try_get::<String, _>("createdAt")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updatedAt")?)?,
    })
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            ';' if !in_single_quote && !in_double_quote => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}
