use sqlx::Row;

use fundflow_core::domain::delegation::{Delegation, DelegationId};
use fundflow_core::domain::org::UserId;

use super::{parse_timestamp, DelegationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDelegationRepository {
    pool: DbPool,
}

impl SqlDelegationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DelegationRepository for SqlDelegationRepository {
    async fn list_unrevoked(&self) -> Result<Vec<Delegation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, from_user_id, to_user_id, starts_at, ends_at, revoked, created_at
             FROM delegation WHERE revoked = 0
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                let starts_at: String = row.try_get("starts_at").map_err(decode)?;
                let ends_at: String = row.try_get("ends_at").map_err(decode)?;
                let created_at: String = row.try_get("created_at").map_err(decode)?;
                Ok(Delegation {
                    id: DelegationId(row.try_get("id").map_err(decode)?),
                    from_user: UserId(row.try_get("from_user_id").map_err(decode)?),
                    to_user: UserId(row.try_get("to_user_id").map_err(decode)?),
                    starts_at: parse_timestamp(&starts_at)?,
                    ends_at: parse_timestamp(&ends_at)?,
                    revoked: row.try_get("revoked").map_err(decode)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}
