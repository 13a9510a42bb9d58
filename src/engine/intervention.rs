use chrono::Utc;

use super::{require_id, LearningEngine};
use crate::error::EngineError;
use crate::types::{InterventionRecord, InterventionStatus};

impl LearningEngine {
    /// Marks an intervention as carried out. Bookkeeping only: every failure
    /// is logged and reported as `false`.
    pub async fn execute_intervention(&self, intervention_id: &str, executed_by: &str) -> bool {
        if intervention_id.trim().is_empty() || executed_by.trim().is_empty() {
            tracing::warn!(intervention_id, executed_by, "intervention id and executor are required");
            return false;
        }

        let result = self
            .timed(
                "mark_intervention_executed",
                self.store
                    .mark_intervention_executed(intervention_id, executed_by, Utc::now()),
            )
            .await;

        match result {
            Ok(true) => {
                tracing::info!(intervention_id, executed_by, "intervention executed");
                true
            }
            Ok(false) => {
                tracing::warn!(intervention_id, "intervention not found");
                false
            }
            Err(err) => {
                tracing::error!(intervention_id, operation = "execute_intervention", error = %err, "failed to record intervention execution");
                false
            }
        }
    }

    pub async fn pending_interventions(
        &self,
        user_id: &str,
    ) -> Result<Vec<InterventionRecord>, EngineError> {
        require_id("userId", user_id)?;
        let pending = self
            .timed(
                "list_interventions",
                self.store
                    .list_interventions(user_id, Some(InterventionStatus::Pending)),
            )
            .await?;
        Ok(pending)
    }
}
