//! Task DTOs for the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::{JobFailure, JobId, JobOutput, JobRecord, JobState};
use crate::domain::params::CalibrationParams;

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreated {
    pub task_id: JobId,
    pub status: JobState,
}

/// Status view of a single task
///
/// `error` carries the human-readable message while `failure` keeps the
/// structured kind so callers can branch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: JobId,
    pub status: JobState,
    pub result: Option<JobOutput>,
    pub error: Option<String>,
    pub failure: Option<JobFailure>,
    pub parameters: CalibrationParams,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for TaskStatus {
    fn from(record: JobRecord) -> Self {
        Self {
            task_id: record.id,
            status: record.state,
            result: record.result,
            error: record.error.as_ref().map(ToString::to_string),
            failure: record.error,
            parameters: record.parameters,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

/// Query string of the log endpoint
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub follow: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::JobTransition;
    use uuid::Uuid;

    #[test]
    fn test_status_view_carries_failure_message_and_kind() {
        let mut record = JobRecord::pending(Uuid::new_v4(), CalibrationParams::default());
        record.apply(JobTransition::Start).unwrap();
        record
            .apply(JobTransition::Fail(JobFailure::ExecutionFailed {
                exit_code: Some(1),
                output: "Error in library(openVA)\n".to_string(),
            }))
            .unwrap();

        let view = TaskStatus::from(record.clone());
        assert_eq!(view.task_id, record.id);
        assert_eq!(view.status, JobState::Failed);
        assert_eq!(
            view.error.as_deref(),
            Some("calibration script failed with exit code 1")
        );
        assert!(matches!(
            view.failure,
            Some(JobFailure::ExecutionFailed {
                exit_code: Some(1),
                ..
            })
        ));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "failed");
    }

    #[test]
    fn test_log_query_defaults_to_snapshot() {
        let query: LogQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.follow);
    }
}
