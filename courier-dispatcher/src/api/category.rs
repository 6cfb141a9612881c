//! Configuration Change Handlers
//!
//! The core delivers configuration changes for the categories this
//! service registered interest in. The dispatcher's own categories drive
//! the control gate and the security policy; everything else is routed to
//! the pipeline manager for filter plugin reconfiguration.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use courier_core::dto::dispatch::MessageResponse;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::config::CategoryNames;
use crate::pipeline::events;

/// POST /category/{name}/change
pub async fn change(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let config: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Failed to parse request payload".to_string()))?;

    let ctx = &state.ctx;
    let names = CategoryNames::for_service(&ctx.service_name);

    if name == names.advanced {
        if let Some(level) = config.get("logLevel").and_then(Value::as_str) {
            info!(
                "Log level change to '{}' takes effect on the next restart",
                level
            );
        }
        if config.get("dispatcherThreads").is_some() {
            warn!("dispatcherThreads changes take effect on the next restart");
        }
    } else if name == names.server {
        if let Some(enabled) = config.get("enable").and_then(events::as_bool) {
            ctx.set_control_enabled(enabled);
            info!(
                "Control dispatch is now {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    } else if name == names.security {
        if let Some(policy) = config.get("authentication").and_then(Value::as_str) {
            ctx.set_auth_mandatory(policy == "mandatory");
            info!("Dispatch authentication policy is now '{}'", policy);
        }
    } else if name == names.main {
        warn!(
            "Configuration change for the '{}' category is not handled",
            name
        );
    } else {
        // A filter category one of the live pipelines registered
        ctx.manager.category_changed(&name, &config).await;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Configuration change accepted")),
    ))
}
