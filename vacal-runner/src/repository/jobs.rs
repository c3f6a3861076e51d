//! Job store
//!
//! Holds one record per job handle. The runner is the only writer of a
//! record once it exists; status queries only read. Every read returns a
//! whole record, never a half-applied transition.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use vacal_core::domain::job::{InvalidTransition, JobId, JobRecord, JobTransition};

/// Errors returned by a job store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} already exists")]
    AlreadyExists(JobId),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The underlying storage failed
    #[error("job store error: {0}")]
    Backend(String),
}

/// Capability for creating, reading and advancing job records
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new record
    async fn create(&self, record: JobRecord) -> Result<(), StoreError>;

    /// Reads a record by handle
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Applies a state transition and returns the updated record
    ///
    /// Transitions that would regress the lifecycle are rejected with
    /// [`StoreError::InvalidTransition`].
    async fn set_state(&self, id: JobId, transition: JobTransition)
    -> Result<JobRecord, StoreError>;

    /// Lists all records, most recent first
    async fn list(&self) -> Result<Vec<JobRecord>, StoreError>;
}

/// In-memory implementation of JobStore
///
/// Records live for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn set_state(
        &self,
        id: JobId,
        transition: JobTransition,
    ) -> Result<JobRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.apply(transition)?;
        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut records: Vec<JobRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vacal_core::domain::job::{JobFailure, JobState};
    use vacal_core::domain::params::CalibrationParams;

    fn pending() -> JobRecord {
        JobRecord::pending(Uuid::new_v4(), CalibrationParams::default())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryJobStore::new();
        let record = pending();
        let id = record.id;

        store.create(record.clone()).await.unwrap();

        assert_eq!(store.get(id).await.unwrap(), Some(record));
        assert_eq!(store.get(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_handle() {
        let store = InMemoryJobStore::new();
        let record = pending();

        store.create(record.clone()).await.unwrap();
        let err = store.create(record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_set_state_advances_and_rejects_regression() {
        let store = InMemoryJobStore::new();
        let record = pending();
        let id = record.id;
        store.create(record).await.unwrap();

        let running = store.set_state(id, JobTransition::Start).await.unwrap();
        assert_eq!(running.state, JobState::Running);

        let done = store
            .set_state(
                id,
                JobTransition::Fail(JobFailure::TimedOut { timeout_secs: 1 }),
            )
            .await
            .unwrap();
        assert_eq!(done.state, JobState::TimedOut);

        let err = store.set_state(id, JobTransition::Start).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        assert_eq!(
            store.get(id).await.unwrap().unwrap().state,
            JobState::TimedOut
        );
    }

    #[tokio::test]
    async fn test_set_state_unknown_job() {
        let store = InMemoryJobStore::new();
        let err = store
            .set_state(Uuid::new_v4(), JobTransition::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let store = InMemoryJobStore::new();
        let mut older = pending();
        older.created_at = older.created_at - chrono::Duration::seconds(10);
        let newer = pending();

        store.create(older.clone()).await.unwrap();
        store.create(newer.clone()).await.unwrap();

        let ids: Vec<JobId> = store.list().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
