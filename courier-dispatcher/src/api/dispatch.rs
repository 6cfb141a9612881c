//! Dispatch API Handlers
//!
//! HTTP endpoints accepting control writes and operations. A valid
//! request is queued for asynchronous delivery and acknowledged with 202;
//! malformed payloads are rejected before anything is queued.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use courier_core::domain::{CallerIdentity, ControlIntent, ControlRequest, Endpoint, KvList};
use courier_core::dto::dispatch::{MessageResponse, OperationRequest, WriteRequest};
use serde_json::Value;
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::context::ServiceContext;

/// POST /dispatch/write
/// Queue a setpoint write for delivery
pub async fn write(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let caller = authenticate(&state.ctx, &headers, "/dispatch/write").await?;
    check_enabled(&state.ctx)?;

    let request: WriteRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Failed to parse request payload".to_string()))?;

    let values = KvList::from_json_object(&request.write)
        .map_err(|e| ApiError::BadRequest(format!("Invalid write values: {}", e)))?;

    let intent = match request.destination.as_str() {
        "service" => ControlIntent::WriteService {
            service: require_name(&request.name, "service")?,
            values,
        },
        "asset" => ControlIntent::WriteAsset {
            asset: require_name(&request.name, "asset")?,
            values,
        },
        "script" => ControlIntent::WriteScript {
            script: require_name(&request.name, "script")?,
            values,
        },
        "broadcast" => ControlIntent::WriteBroadcast { values },
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unsupported destination type '{}' in write payload",
                other
            )))
        }
    };

    let source_hint = source_hint(
        &state.ctx,
        request.source.as_deref(),
        request.source_name.as_deref(),
    )
    .await?;

    enqueue(&state, ControlRequest::new(caller, source_hint, intent))
}

/// POST /dispatch/operation
/// Queue a control operation for delivery
pub async fn operation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let caller = authenticate(&state.ctx, &headers, "/dispatch/operation").await?;
    check_enabled(&state.ctx)?;

    let request: OperationRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Failed to parse request payload".to_string()))?;

    let (operation, parameters) = parse_operation(&request.operation)?;

    let intent = match request.destination.as_str() {
        "service" => ControlIntent::OperationService {
            operation,
            service: require_name(&request.name, "service")?,
            parameters,
        },
        "asset" => ControlIntent::OperationAsset {
            operation,
            asset: require_name(&request.name, "asset")?,
            parameters,
        },
        "broadcast" => ControlIntent::OperationBroadcast {
            operation,
            parameters,
        },
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unsupported destination type '{}' in operation payload",
                other
            )))
        }
    };

    let source_hint = source_hint(
        &state.ctx,
        request.source.as_deref(),
        request.source_name.as_deref(),
    )
    .await?;

    enqueue(&state, ControlRequest::new(caller, source_hint, intent))
}

// =============================================================================
// Helpers
// =============================================================================

/// Resolve the caller identity of a dispatch call. A bearer token is
/// verified through the core; when the security policy is mandatory an
/// unauthenticated call is refused.
async fn authenticate(
    ctx: &ServiceContext,
    headers: &HeaderMap,
    url: &str,
) -> Result<CallerIdentity, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) => match ctx.core.verify_token(token).await {
            Ok(claims) => Ok(CallerIdentity::new(claims.name, claims.caller_type, url)),
            Err(e) => {
                debug!("Bearer token verification failed: {:#}", e);
                Err(ApiError::Unauthorized("Invalid bearer token".to_string()))
            }
        },
        None if ctx.auth_mandatory() => Err(ApiError::Unauthorized(
            "Authentication required".to_string(),
        )),
        None => Ok(CallerIdentity::default()),
    }
}

fn check_enabled(ctx: &ServiceContext) -> Result<(), ApiError> {
    if ctx.control_enabled() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "Control dispatch is disabled".to_string(),
        ))
    }
}

fn require_name(name: &Option<String>, destination: &str) -> Result<String, ApiError> {
    name.clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {} name in payload", destination)))
}

/// The operation body is a single-key object mapping the operation name
/// to its (optional) parameter object
fn parse_operation(operation: &Value) -> Result<(String, KvList), ApiError> {
    let entries = operation
        .as_object()
        .filter(|map| !map.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing operation in payload".to_string()))?;
    let (name, parameters) = entries.iter().next().expect("map checked non-empty");
    let parameters = match parameters {
        Value::Null => KvList::new(),
        value => KvList::from_json_object(value)
            .map_err(|e| ApiError::BadRequest(format!("Invalid operation parameters: {}", e)))?,
    };
    Ok((name.clone(), parameters))
}

/// Convert the body's source hint into an endpoint via the lookup tables
async fn source_hint(
    ctx: &ServiceContext,
    source: Option<&str>,
    source_name: Option<&str>,
) -> Result<Option<Endpoint>, ApiError> {
    let Some(source) = source.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let Some(kind) = ctx.manager.source_kind(source).await else {
        return Err(ApiError::BadRequest(format!(
            "Unknown source type '{}'",
            source
        )));
    };
    Ok(Some(Endpoint::from_parts(
        kind,
        source_name.unwrap_or_default(),
    )))
}

fn enqueue(
    state: &AppState,
    request: ControlRequest,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    match state.queue.queue(request) {
        Some(id) => {
            debug!(%id, "Control request queued");
            Ok((
                StatusCode::ACCEPTED,
                Json(MessageResponse::new("Request queued")),
            ))
        }
        None => Err(ApiError::Internal(
            "Dispatcher is shutting down".to_string(),
        )),
    }
}
