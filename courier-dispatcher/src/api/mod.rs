//! API Module
//!
//! HTTP API layer for the dispatcher.
//! Each submodule handles endpoints for a specific concern.

pub mod category;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod table;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::context::ServiceContext;
use crate::queue::RequestQueue;

/// Shared state of the API handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ServiceContext>,
    pub queue: Arc<RequestQueue>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Control dispatch endpoints
        .route("/dispatch/write", post(dispatch::write))
        .route("/dispatch/operation", post(dispatch::operation))
        // Storage change notifications
        .route("/table/insert/{table}", post(table::insert))
        .route("/table/update/{table}", post(table::update))
        .route("/table/delete/{table}", post(table::delete))
        // Configuration change callbacks from the core
        .route("/category/{name}/change", post(category::change))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
