//! Task-related API endpoints

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use uuid::Uuid;
use vacal_core::domain::params::CalibrationParams;
use vacal_core::dto::job::{TaskCreated, TaskStatus};

/// Live log chunks, in the order they were written
pub type LogChunks = BoxStream<'static, Result<Bytes>>;

impl OrchestratorClient {
    // =============================================================================
    // Task Lifecycle
    // =============================================================================

    /// Submit a calibration task
    ///
    /// # Example
    /// ```no_run
    /// # use vacal_client::OrchestratorClient;
    /// # use vacal_core::domain::params::CalibrationParams;
    /// # async fn example() -> vacal_client::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8000");
    /// let created = client.submit_calibration(&CalibrationParams::default()).await?;
    /// println!("Submitted {}", created.task_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_calibration(&self, params: &CalibrationParams) -> Result<TaskCreated> {
        let url = format!("{}/tasks/calibration", self.base_url);
        let response = self.client.post(&url).json(params).send().await?;

        self.handle_response(response).await
    }

    /// Get a task's status by ID
    pub async fn get_task(&self, task_id: Uuid) -> Result<TaskStatus> {
        let url = format!("{}/tasks/{}", self.base_url, task_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all tasks, most recent first
    pub async fn list_tasks(&self) -> Result<Vec<TaskStatus>> {
        let url = format!("{}/tasks", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Logs
    // =============================================================================

    /// Get the task log as written so far
    pub async fn get_logs(&self, task_id: Uuid) -> Result<String> {
        let url = format!("{}/tasks/{}/logs", self.base_url, task_id);
        let response = self.client.get(&url).send().await?;

        let response = self.check_status(response).await?;
        Ok(response.text().await?)
    }

    /// Follow the task log until the task finishes
    ///
    /// The stream ends once the orchestrator has sent the terminal status
    /// line.
    pub async fn follow_logs(&self, task_id: Uuid) -> Result<LogChunks> {
        let url = format!("{}/tasks/{}/logs", self.base_url, task_id);
        let response = self
            .client
            .get(&url)
            .query(&[("follow", "true")])
            .send()
            .await?;

        let response = self.check_status(response).await?;
        Ok(response
            .bytes_stream()
            .map_err(ClientError::RequestFailed)
            .boxed())
    }

    // =============================================================================
    // Service
    // =============================================================================

    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<Value> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
