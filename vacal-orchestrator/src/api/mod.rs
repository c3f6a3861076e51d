//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod task;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vacal_runner::JobDispatcher;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<JobDispatcher>,
}

/// Create the main API router with all endpoints
pub fn create_router(dispatcher: Arc<JobDispatcher>, cors_origins: &[String]) -> Router {
    Router::new()
        // Health check
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        // Task endpoints
        .route("/tasks", get(task::list_tasks))
        .route("/tasks/calibration", post(task::submit_calibration))
        .route("/tasks/{id}", get(task::get_task))
        .route("/tasks/{id}/logs", get(task::get_task_logs))
        // Add state and middleware
        .with_state(AppState { dispatcher })
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
