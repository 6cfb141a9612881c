//! Table Change Notification Handlers
//!
//! The storage layer posts row mutations here. Changes to the control
//! pipelines and filters tables mutate the in-memory pipelines; other
//! tables are acknowledged and ignored.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use courier_core::dto::dispatch::MessageResponse;
use courier_core::dto::table::{TableDelete, TableUpdate};
use serde_json::Value;
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;

const PIPELINES_TABLE: &str = "control_pipelines";
const FILTERS_TABLE: &str = "control_filters";

/// POST /table/insert/{table}
pub async fn insert(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let row: Value = parse(&body)?;
    match table.as_str() {
        PIPELINES_TABLE => state
            .ctx
            .manager
            .pipeline_inserted(&row)
            .await
            .map_err(bad_request)?,
        FILTERS_TABLE => state
            .ctx
            .manager
            .filter_inserted(&row)
            .await
            .map_err(bad_request)?,
        other => debug!("Ignoring insert notification for table '{}'", other),
    }
    Ok(accepted())
}

/// POST /table/update/{table}
pub async fn update(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let change: TableUpdate = parse(&body)?;
    match table.as_str() {
        PIPELINES_TABLE => state
            .ctx
            .manager
            .pipeline_updated(&change)
            .await
            .map_err(bad_request)?,
        FILTERS_TABLE => state
            .ctx
            .manager
            .filter_updated(&change)
            .await
            .map_err(bad_request)?,
        other => debug!("Ignoring update notification for table '{}'", other),
    }
    Ok(accepted())
}

/// POST /table/delete/{table}
pub async fn delete(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let change: TableDelete = parse(&body)?;
    match table.as_str() {
        PIPELINES_TABLE => state
            .ctx
            .manager
            .pipeline_deleted(&change)
            .await
            .map_err(bad_request)?,
        FILTERS_TABLE => state
            .ctx
            .manager
            .filter_deleted(&change)
            .await
            .map_err(bad_request)?,
        other => debug!("Ignoring delete notification for table '{}'", other),
    }
    Ok(accepted())
}

fn parse<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Failed to parse request payload".to_string()))
}

fn bad_request(e: anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{:#}", e))
}

fn accepted() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Notification accepted")),
    )
}
