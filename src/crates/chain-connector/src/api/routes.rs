//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};
use chain_core::NodeSupervisor;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<NodeSupervisor>,
}

/// Build the complete connector router
pub fn create_router(supervisor: Arc<NodeSupervisor>) -> Router {
    let app_state = AppState { supervisor };

    Router::new()
        // Health check endpoint
        .route("/health", get(handlers::health))
        // Chain endpoints
        .route("/chain/create-and-start", post(handlers::deploy_chain))
        // Pre-stage endpoint
        .route("/node/pre", post(handlers::run_pre))
        // Peer communication endpoints
        .route("/node/communicate/setup", post(handlers::setup_node))
        .route("/node/communicate/run", post(handlers::run_node))
        .route("/node/communicate/notify", post(handlers::notify))
        .route(
            "/node/communicate/enqueue-status",
            post(handlers::enqueue_status),
        )
        // Node control endpoints
        .route("/node/resume", post(handlers::resume_node))
        .route("/node/suspend", post(handlers::suspend_node))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
