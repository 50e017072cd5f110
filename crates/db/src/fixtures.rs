use sqlx::{Executor, Row};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic demo dataset shared by tests and local development.
pub struct DemoSeed;

/// Row counts the seed is expected to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedVerification {
    pub users: i64,
    pub workflow_steps: i64,
    pub delegations: i64,
    pub requests: i64,
}

impl DemoSeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub const WORKFLOW_ID: i64 = 1;
    pub const SEED_REQUEST_ID: &str = "req-seed-001";

    pub async fn load(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let count = |table: &'static str| async move {
            let query = format!("SELECT COUNT(*) AS count FROM {table}");
            let row = sqlx::query(&query).fetch_one(pool).await?;
            row.try_get::<i64, _>("count")
                .map_err(|e| RepositoryError::Decode(e.to_string()))
        };

        Ok(SeedVerification {
            users: count("app_user").await?,
            workflow_steps: count("workflow_step").await?,
            delegations: count("delegation").await?,
            requests: count("fund_request").await?,
        })
    }
}
