use sqlx::Row;

use fundflow_core::domain::org::{DesignationId, UserId};
use fundflow_core::domain::workflow::{
    StepId, Workflow, WorkflowFinalReceiver, WorkflowId, WorkflowStep,
};

use super::{RepositoryError, WorkflowRepository};
use crate::DbPool;

pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WorkflowRepository for SqlWorkflowRepository {
    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

        let Some(row) = sqlx::query("SELECT id, name FROM workflow WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let name: String = row.try_get("name").map_err(decode)?;

        let step_rows = sqlx::query(
            "SELECT id, workflow_id, name, sequence, sla_hours, auto_approve,
                    is_final_receiver, designation_id, assigned_user_name
             FROM workflow_step WHERE workflow_id = ?
             ORDER BY sequence ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        let steps = step_rows
            .iter()
            .map(|row| {
                Ok(WorkflowStep {
                    id: StepId(row.try_get("id").map_err(decode)?),
                    workflow_id: WorkflowId(row.try_get("workflow_id").map_err(decode)?),
                    name: row.try_get("name").map_err(decode)?,
                    sequence: row.try_get("sequence").map_err(decode)?,
                    sla_hours: row.try_get("sla_hours").map_err(decode)?,
                    auto_approve: row.try_get("auto_approve").map_err(decode)?,
                    is_final_receiver: row.try_get("is_final_receiver").map_err(decode)?,
                    designation_id: row
                        .try_get::<Option<i64>, _>("designation_id")
                        .map_err(decode)?
                        .map(DesignationId),
                    assigned_user_name: row.try_get("assigned_user_name").map_err(decode)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Some(Workflow { id, name, steps }))
    }

    async fn final_receiver_rows(
        &self,
        id: WorkflowId,
    ) -> Result<Vec<WorkflowFinalReceiver>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, receiver_name, user_id
             FROM workflow_final_receiver WHERE workflow_id = ?
             ORDER BY id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                Ok(WorkflowFinalReceiver {
                    id: row.try_get("id").map_err(decode)?,
                    workflow_id: WorkflowId(row.try_get("workflow_id").map_err(decode)?),
                    receiver_name: row.try_get("receiver_name").map_err(decode)?,
                    user_id: row
                        .try_get::<Option<i64>, _>("user_id")
                        .map_err(decode)?
                        .map(UserId),
                })
            })
            .collect()
    }
}
