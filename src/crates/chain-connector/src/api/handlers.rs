//! Connector endpoint handlers
//!
//! Each handler translates a JSON body into a supervisor request. A 201 is
//! only ever acknowledgement of local acceptance; downstream progress and
//! failures are observable through the monitoring stream. Routing misses on
//! the peer-communication endpoints answer 200 with nothing run, so one
//! stale peer cannot stall a chain.

use axum::{extract::State, http::StatusCode, Json};
use chain_core::{
    ChainError, NodeSignal, PreMessage, ReportMessage, ServicePayload, SetupMessage,
    StatusMessage, SupervisorRequest,
};
use tracing::{info, warn};

use crate::api::{
    error::{ApiError, ApiResult},
    models::{DeployRequest, DeployResponse, HealthResponse, PreResponse, SetupResponse, StatusRequest},
    routes::AppState,
};

/// Handler for GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        supervisor: state.supervisor.tag(),
    })
}

/// Handler for POST /chain/create-and-start
pub async fn deploy_chain(
    State(state): State<AppState>,
    Json(request): Json<DeployRequest>,
) -> ApiResult<(StatusCode, Json<DeployResponse>)> {
    let response = state
        .supervisor
        .handle_request(SupervisorRequest::ChainDeploy {
            config: request.chain_config,
            data: request.data,
            parent_chain_id: None,
        })
        .await?;

    let chain_id = response
        .chain_id
        .ok_or_else(|| ApiError::InternalError("deploy returned no chain id".to_string()))?;
    info!(%chain_id, "chain accepted");
    Ok((
        StatusCode::CREATED,
        Json(DeployResponse {
            chain_id,
            message: "chain deployed and started".to_string(),
        }),
    ))
}

/// Handler for POST /node/pre
pub async fn run_pre(
    State(state): State<AppState>,
    Json(message): Json<PreMessage>,
) -> ApiResult<Json<PreResponse>> {
    let config = message
        .chain_config
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadRequest("empty pre-stage chain".to_string()))?;

    let response = state
        .supervisor
        .handle_request(SupervisorRequest::NodePre {
            config: Box::new(config),
            data: message.data,
        })
        .await?;
    Ok(Json(PreResponse {
        data: response.data.unwrap_or(serde_json::Value::Null),
    }))
}

/// Handler for POST /node/communicate/setup
pub async fn setup_node(
    State(state): State<AppState>,
    Json(message): Json<SetupMessage>,
) -> ApiResult<(StatusCode, Json<SetupResponse>)> {
    let response = state
        .supervisor
        .handle_request(SupervisorRequest::NodeSetup {
            chain_id: message.chain_id,
            config: Box::new(message.remote_configs),
        })
        .await?;

    let node_id = response
        .node_id
        .ok_or_else(|| ApiError::InternalError("setup returned no node id".to_string()))?;
    info!(%node_id, "remote stage registered");
    Ok((StatusCode::CREATED, Json(SetupResponse { node_id })))
}

/// Handler for POST /node/communicate/run
pub async fn run_node(
    State(state): State<AppState>,
    Json(payload): Json<ServicePayload>,
) -> StatusCode {
    let supervisor = state.supervisor.clone();
    tokio::spawn(async move {
        let result = supervisor
            .handle_request(SupervisorRequest::NodeSendData {
                chain_id: payload.chain_id,
                target_id: payload.target_id,
                data: payload.data,
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "inbound run request failed");
        }
    });
    StatusCode::OK
}

/// Handler for POST /node/communicate/notify
pub async fn notify(
    State(state): State<AppState>,
    Json(message): Json<ReportMessage>,
) -> StatusCode {
    state.supervisor.notify(&message);
    StatusCode::OK
}

/// Handler for POST /node/communicate/enqueue-status
pub async fn enqueue_status(
    State(state): State<AppState>,
    Json(message): Json<StatusMessage>,
) -> ApiResult<StatusCode> {
    match state.supervisor.enqueue_node_status(message, None).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(ChainError::RoutingMiss(miss)) => {
            warn!(%miss, "status signal for unknown target");
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e.into()),
    }
}

/// Handler for POST /node/resume
pub async fn resume_node(
    State(state): State<AppState>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<StatusCode> {
    dispatch_status(state, request, NodeSignal::Resume).await
}

/// Handler for POST /node/suspend
pub async fn suspend_node(
    State(state): State<AppState>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<StatusCode> {
    dispatch_status(state, request, NodeSignal::Suspend).await
}

async fn dispatch_status(
    state: AppState,
    request: StatusRequest,
    signal: NodeSignal,
) -> ApiResult<StatusCode> {
    let result = state
        .supervisor
        .handle_request(request.into_supervisor_request(signal))
        .await;
    match result {
        Ok(_) => Ok(StatusCode::OK),
        Err(ChainError::RoutingMiss(miss)) => {
            warn!(%miss, signal = %signal, "status request for unknown target");
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e.into()),
    }
}
