//! Health Check API Handlers
//!
//! Liveness and banner endpoints for monitoring.

use axum::Json;
use serde_json::{Value, json};

/// GET /
/// Service banner
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "VA Calibration API",
        "version": "1.0",
    }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
