//! Task API Handlers
//!
//! HTTP endpoints for submitting calibration tasks and reading their status
//! and logs.

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use uuid::Uuid;
use vacal_core::domain::job::JobState;
use vacal_core::domain::params::CalibrationParams;
use vacal_core::dto::job::{LogQuery, TaskCreated, TaskStatus};

use crate::api::AppState;
use crate::api::error::ApiResult;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// POST /tasks/calibration
/// Validate and launch a calibration task
pub async fn submit_calibration(
    State(state): State<AppState>,
    Json(params): Json<CalibrationParams>,
) -> ApiResult<Json<TaskCreated>> {
    tracing::info!("Submitting {} calibration task", params.mode);

    let task_id = state.dispatcher.submit(params).await?;

    Ok(Json(TaskCreated {
        task_id,
        status: JobState::Pending,
    }))
}

/// GET /tasks
/// List all tasks, most recent first
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskStatus>>> {
    tracing::debug!("Listing tasks");

    let records = state.dispatcher.list().await?;
    Ok(Json(records.into_iter().map(TaskStatus::from).collect()))
}

/// GET /tasks/{id}
/// Get task status by ID
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskStatus>> {
    tracing::debug!("Getting task: {}", id);

    let record = state.dispatcher.status(id).await?;
    Ok(Json(record.into()))
}

/// GET /tasks/{id}/logs
/// Return the task log, or stream it until the task finishes
///
/// Query parameters:
/// - `follow` (optional): keep the response open and send new output as it
///   is written
pub async fn get_task_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Response> {
    let logs = state.dispatcher.logs();

    let body = if query.follow {
        tracing::debug!("Following logs for task: {}", id);
        Body::from_stream(logs.follow(id).await?)
    } else {
        tracing::debug!("Getting logs for task: {}", id);
        Body::from(logs.snapshot(id).await?)
    };

    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response())
}
