//! Job dispatcher
//!
//! Accepts calibration submissions and runs each one in its own task.
//! Submission returns as soon as the job has a handle, a pending record and
//! a log file; the script itself runs in the background.

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;
use vacal_core::domain::job::{JobFailure, JobId, JobRecord, JobTransition};
use vacal_core::domain::params::{CalibrationParams, ValidationError};

use crate::config::RunnerConfig;
use crate::repository::{JobStore, StoreError};
use crate::service::{CommandLine, LogHeader, LogSink, LogTailer, ProcessRunner};

/// Message recorded for jobs found unfinished at startup
const INTERRUPTED_MESSAGE: &str = "interrupted by orchestrator restart";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("task {0} not found")]
    NotFound(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to create log file: {0}")]
    Io(#[source] io::Error),
}

/// Entry point for submitting and inspecting calibration jobs
pub struct JobDispatcher {
    config: Arc<RunnerConfig>,
    store: Arc<dyn JobStore>,
    runner: Arc<ProcessRunner>,
    tailer: LogTailer,
}

impl JobDispatcher {
    pub fn new(
        config: RunnerConfig,
        store: Arc<dyn JobStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let config = Arc::new(config);
        let runner = Arc::new(ProcessRunner::new(config.clone(), store.clone()));
        let tailer = LogTailer::new(config.clone(), store.clone(), shutdown);
        Self {
            config,
            store,
            runner,
            tailer,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Log readers for submitted jobs
    pub fn logs(&self) -> &LogTailer {
        &self.tailer
    }

    /// Validates and submits a job, returning its handle without waiting
    /// for the script to start
    ///
    /// Invalid parameters are rejected before any handle, record or log
    /// exists.
    pub async fn submit(&self, params: CalibrationParams) -> Result<JobId, DispatchError> {
        params.validate()?;

        let id = Uuid::new_v4();
        self.store
            .create(JobRecord::pending(id, params.clone()))
            .await?;

        let command = CommandLine::for_params(&self.config, &params);
        let header = LogHeader {
            id,
            params: &params,
            command: command.display(),
        };

        let sink = match LogSink::create(self.config.log_path(id), &header).await {
            Ok(sink) => sink,
            Err(e) => {
                error!("Failed to create log file for job {}: {}", id, e);
                let failure =
                    JobFailure::infrastructure(format!("failed to create log file: {}", e));
                if let Err(store_err) = self
                    .store
                    .set_state(id, JobTransition::Fail(failure))
                    .await
                {
                    warn!("Failed to mark job {} as errored: {}", id, store_err);
                }
                return Err(DispatchError::Io(e));
            }
        };

        info!("Submitted job {} (mode: {})", id, params.mode);
        self.spawn_job_task(id, params, sink);

        Ok(id)
    }

    /// Current record of a job
    pub async fn status(&self, id: JobId) -> Result<JobRecord, DispatchError> {
        self.store
            .get(id)
            .await?
            .ok_or(DispatchError::NotFound(id))
    }

    /// All jobs, most recent first
    pub async fn list(&self) -> Result<Vec<JobRecord>, DispatchError> {
        Ok(self.store.list().await?)
    }

    /// Marks jobs left unfinished by a previous process as errored
    ///
    /// Only meaningful with a persistent store; returns how many jobs were
    /// closed.
    pub async fn recover_interrupted(&self) -> Result<usize, DispatchError> {
        let unfinished: Vec<JobRecord> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| !record.state.is_terminal())
            .collect();

        for record in &unfinished {
            warn!(
                "Job {} was left {} by a previous run, marking as errored",
                record.id, record.state
            );
            self.runner.abort(record.id, INTERRUPTED_MESSAGE).await;
        }

        Ok(unfinished.len())
    }

    /// Spawns the supervised execution task for one job
    ///
    /// A panic inside the run still leaves the job with a terminal state and
    /// a closed log.
    fn spawn_job_task(&self, id: JobId, params: CalibrationParams, sink: LogSink) {
        let runner = Arc::clone(&self.runner);

        tokio::spawn(async move {
            let task = {
                let runner = Arc::clone(&runner);
                tokio::spawn(async move { runner.run(id, &params, sink).await })
            };

            if let Err(e) = task.await {
                error!("Execution task for job {} panicked: {}", id, e);
                runner
                    .abort(id, format!("execution task aborted: {}", e))
                    .await;
            }
        });
    }
}
