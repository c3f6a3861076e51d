//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::params::CalibrationParams;

/// Opaque handle assigned to a job at submission time
pub type JobId = Uuid;

/// Job record
///
/// Structure shared between the orchestrator (persists, serves status) and
/// the runner (updates at state transitions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub state: JobState,
    pub parameters: CalibrationParams,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobOutput>,
    pub error: Option<JobFailure>,
}

impl JobRecord {
    /// Creates a fresh record in the `Pending` state
    pub fn pending(id: JobId, parameters: CalibrationParams) -> Self {
        Self {
            id,
            state: JobState::Pending,
            parameters,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Applies a transition, rejecting anything that would move the job
    /// backwards or out of a terminal state.
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, transition: JobTransition) -> Result<(), InvalidTransition> {
        let next = transition.target_state();
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }

        let now = Utc::now();
        match transition {
            JobTransition::Start => {
                self.started_at = Some(now);
            }
            JobTransition::Succeed(output) => {
                self.result = Some(output);
                self.completed_at = Some(now);
            }
            JobTransition::Fail(failure) => {
                self.error = Some(failure);
                self.completed_at = Some(now);
            }
        }
        self.state = next;

        Ok(())
    }
}

/// Job lifecycle state
///
/// `Pending -> Running -> (Succeeded | Failed | TimedOut | Errored)`.
/// A pending job may also go straight to `Errored` when it never launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Errored,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Errored
        )
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic
    pub fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Pending, JobState::Running) => true,
            (JobState::Pending | JobState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Errored => "errored",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            "timed_out" => Ok(JobState::TimedOut),
            "errored" => Ok(JobState::Errored),
            other => Err(format!("unknown job state '{}'", other)),
        }
    }
}

/// A state change requested by the runner
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Start,
    Succeed(JobOutput),
    Fail(JobFailure),
}

impl JobTransition {
    pub fn target_state(&self) -> JobState {
        match self {
            JobTransition::Start => JobState::Running,
            JobTransition::Succeed(_) => JobState::Succeeded,
            JobTransition::Fail(failure) => failure.state(),
        }
    }
}

/// Payload of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Everything the calibration script printed, stdout and stderr combined
    pub output: String,
    pub log_file: String,
    /// Structured block parsed out of `output`, when the script emitted one
    pub result_data: Option<serde_json::Value>,
}

/// Terminal failure of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The script exited with a nonzero code; a negative code is the signal
    /// that killed it
    #[error("calibration script failed with {}", describe_exit(.exit_code))]
    ExecutionFailed {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("task timed out after {timeout_secs} seconds")]
    TimedOut { timeout_secs: u64 },

    /// Launch failure, log I/O failure or anything else unexpected
    #[error("{message}")]
    Infrastructure { message: String },
}

impl JobFailure {
    pub fn state(&self) -> JobState {
        match self {
            JobFailure::ExecutionFailed { .. } => JobState::Failed,
            JobFailure::TimedOut { .. } => JobState::TimedOut,
            JobFailure::Infrastructure { .. } => JobState::Errored,
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        JobFailure::Infrastructure {
            message: message.into(),
        }
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "unknown exit code".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition for job {id}: {from} -> {to}")]
pub struct InvalidTransition {
    pub id: JobId,
    pub from: JobState,
    pub to: JobState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> JobOutput {
        JobOutput {
            output: "done\n".to_string(),
            log_file: "logs/x.log".to_string(),
            result_data: None,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
        assert!(JobState::Errored.is_terminal());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(JobState::Pending.can_transition_to(JobState::Running));
        assert!(JobState::Pending.can_transition_to(JobState::Errored));
        assert!(JobState::Running.can_transition_to(JobState::Succeeded));
        assert!(JobState::Running.can_transition_to(JobState::TimedOut));

        assert!(!JobState::Running.can_transition_to(JobState::Pending));
        assert!(!JobState::Running.can_transition_to(JobState::Running));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Running));
        assert!(!JobState::Failed.can_transition_to(JobState::Succeeded));
    }

    #[test]
    fn test_apply_full_lifecycle() {
        let mut record = JobRecord::pending(Uuid::new_v4(), CalibrationParams::default());

        record.apply(JobTransition::Start).unwrap();
        assert_eq!(record.state, JobState::Running);
        assert!(record.started_at.is_some());

        record.apply(JobTransition::Succeed(output())).unwrap();
        assert_eq!(record.state, JobState::Succeeded);
        assert!(record.completed_at.is_some());
        assert_eq!(record.result, Some(output()));
    }

    #[test]
    fn test_apply_rejects_regression_and_leaves_record_untouched() {
        let mut record = JobRecord::pending(Uuid::new_v4(), CalibrationParams::default());
        record.apply(JobTransition::Start).unwrap();
        record
            .apply(JobTransition::Fail(JobFailure::TimedOut { timeout_secs: 600 }))
            .unwrap();

        let before = record.clone();
        let err = record.apply(JobTransition::Start).unwrap_err();
        assert_eq!(err.from, JobState::TimedOut);
        assert_eq!(err.to, JobState::Running);
        assert_eq!(record, before);
    }

    #[test]
    fn test_failure_maps_to_state() {
        let failed = JobFailure::ExecutionFailed {
            exit_code: Some(2),
            output: String::new(),
        };
        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(failed.to_string(), "calibration script failed with exit code 2");
        assert_eq!(
            JobFailure::TimedOut { timeout_secs: 600 }.state(),
            JobState::TimedOut
        );
        assert_eq!(
            JobFailure::infrastructure("boom").state(),
            JobState::Errored
        );
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Succeeded,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Errored,
        ] {
            assert_eq!(state.as_str().parse::<JobState>(), Ok(state));
        }
        assert!("queued".parse::<JobState>().is_err());
    }

    #[test]
    fn test_failure_serializes_with_kind_tag() {
        let json = serde_json::to_value(JobFailure::TimedOut { timeout_secs: 600 }).unwrap();
        assert_eq!(json["kind"], "timed_out");
        assert_eq!(json["timeout_secs"], 600);
    }
}
