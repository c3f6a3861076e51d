//! VA Calibration HTTP Client
//!
//! A type-safe HTTP client for the calibration orchestrator API.
//!
//! # Example
//!
//! ```no_run
//! use vacal_client::OrchestratorClient;
//! use vacal_core::domain::params::CalibrationParams;
//!
//! #[tokio::main]
//! async fn main() -> vacal_client::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8000");
//!
//!     let created = client.submit_calibration(&CalibrationParams::default()).await?;
//!     let status = client.get_task(created.task_id).await?;
//!
//!     println!("Task {} is {}", status.task_id, status.status);
//!     Ok(())
//! }
//! ```

pub mod error;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use tasks::LogChunks;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the orchestrator API
///
/// Covers task submission, status and history, and log retrieval in both
/// snapshot and follow form.
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use vacal_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc. Avoid a
    /// total request timeout if you intend to follow logs of long tasks.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Turn a non-success status into an error, passing the response
    /// through otherwise
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}
