//! Job Repository
//!
//! Postgres-backed job store. Records survive orchestrator restarts; jobs
//! that were still in flight are closed by the dispatcher's recovery pass.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use vacal_core::domain::job::{JobId, JobRecord, JobState, JobTransition};
use vacal_runner::{JobStore, StoreError};

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError> {
        let row = JobRow::try_from(&record)?;

        let result = sqlx::query(
            r#"
            INSERT INTO calibration_jobs
                (id, state, parameters, created_at, started_at, completed_at, result, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(row.state)
        .bind(row.parameters)
        .bind(row.created_at)
        .bind(row.started_at)
        .bind(row.completed_at)
        .bind(row.result)
        .bind(row.error)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(record.id));
        }
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, state, parameters, created_at, started_at, completed_at, result, error
            FROM calibration_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn set_state(
        &self,
        id: JobId,
        transition: JobTransition,
    ) -> Result<JobRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Row lock keeps concurrent transitions on one job serialized
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, state, parameters, created_at, started_at, completed_at, result, error
            FROM calibration_jobs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound(id))?;

        let mut record = JobRecord::try_from(row)?;
        record.apply(transition)?;
        let row = JobRow::try_from(&record)?;

        sqlx::query(
            r#"
            UPDATE calibration_jobs
            SET state = $1, started_at = $2, completed_at = $3, result = $4, error = $5
            WHERE id = $6
            "#,
        )
        .bind(row.state)
        .bind(row.started_at)
        .bind(row.completed_at)
        .bind(row.result)
        .bind(row.error)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, state, parameters, created_at, started_at, completed_at, result, error
            FROM calibration_jobs
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    tracing::error!("Database error: {:?}", err);
    StoreError::Backend(err.to_string())
}

fn corrupt(id: Uuid, column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("job {} has an unreadable {}: {}", id, column, err))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    state: String,
    parameters: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

impl TryFrom<&JobRecord> for JobRow {
    type Error = StoreError;

    fn try_from(record: &JobRecord) -> Result<Self, Self::Error> {
        let to_json = |column: &str, value: Result<serde_json::Value, serde_json::Error>| {
            value.map_err(|e| corrupt(record.id, column, e))
        };

        Ok(JobRow {
            id: record.id,
            state: record.state.as_str().to_string(),
            parameters: to_json("parameters", serde_json::to_value(&record.parameters))?,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
            result: record
                .result
                .as_ref()
                .map(|r| to_json("result", serde_json::to_value(r)))
                .transpose()?,
            error: record
                .error
                .as_ref()
                .map(|e| to_json("error", serde_json::to_value(e)))
                .transpose()?,
        })
    }
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let state: JobState = row.state.parse().map_err(|e| corrupt(id, "state", e))?;

        Ok(JobRecord {
            id,
            state,
            parameters: serde_json::from_value(row.parameters)
                .map_err(|e| corrupt(id, "parameters", e))?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            result: row
                .result
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| corrupt(id, "result", e))?,
            error: row
                .error
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| corrupt(id, "error", e))?,
        })
    }
}
