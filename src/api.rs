//! REST API server for CinderChain
//!
//! Thin HTTP layer over [`Node`]: every handler delegates to a node operation
//! and maps its errors onto status codes.

use axum::{
    extract::{Path, Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::{AddressData, Block};
use crate::contracts::{Contract, ContractType, ExecutionResult};
use crate::error::ChainError;
use crate::node::Node;
use crate::sync::ConsensusOutcome;
use crate::transaction::Transaction;

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BlockchainError(ChainError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            ApiError::BlockchainError(
                e @ (ChainError::IoError(_) | ChainError::DatabaseError(_) | ChainError::SerializationError(_)),
            ) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::BlockchainError(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    message: String,
    accepted_in_block: u64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MineQuery {
    miner_address: Option<String>,
}

#[derive(Deserialize)]
struct DeployRequest {
    #[serde(rename = "type")]
    contract_type: ContractType,
    creator: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    method: String,
    #[serde(default)]
    params: Value,
    caller: String,
}

#[derive(Deserialize)]
struct RegisterPeerRequest {
    peer: String,
}

#[derive(Serialize)]
struct PeersResponse {
    count: usize,
    peers: Vec<String>,
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware. Logs method, path, status and duration.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints under `/api`.
pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    let api_routes = Router::new()
        // Chain endpoints
        .route("/transaction", post(submit_transaction))
        .route("/pending", get(get_pending))
        .route("/mine", post(mine))
        .route("/chain", get(get_chain))
        .route("/address/:addr", get(get_address))
        // Contract endpoints
        .route("/contracts", get(list_contracts).post(deploy_contract))
        .route("/contracts/:id", get(get_contract))
        .route("/contracts/:id/execute", post(execute_contract))
        // Network endpoints
        .route("/peers", get(get_peers).post(register_peer))
        .route("/consensus", post(consensus))
        // System endpoints
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(node);

    Router::new().nest("/api", api_routes).layer(cors)
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let blockchain = node.blockchain.read().await;
    Json(json!({
        "status": "healthy",
        "height": blockchain.len(),
        "difficulty": blockchain.difficulty,
        "pending": blockchain.pending_transactions().len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn submit_transaction(
    State(node): State<Arc<Node>>,
    Json(tx): Json<Transaction>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let index = node.submit_transaction(tx).await?;
    Ok(Json(SubmitResponse {
        message: format!("Transaction will be added in block {}", index),
        accepted_in_block: index,
    }))
}

async fn get_pending(State(node): State<Arc<Node>>) -> Json<Vec<Transaction>> {
    Json(node.pending_transactions().await)
}

async fn mine(State(node): State<Arc<Node>>, Query(query): Query<MineQuery>) -> Result<Json<Block>, ApiError> {
    let block = match query.miner_address {
        Some(address) if !address.is_empty() => node.mine_to(address).await?,
        _ => node.mine().await?,
    };
    Ok(Json(block))
}

async fn get_chain(State(node): State<Arc<Node>>) -> Json<Vec<Block>> {
    Json(node.get_chain().await)
}

async fn get_address(State(node): State<Arc<Node>>, Path(addr): Path<String>) -> Json<AddressData> {
    Json(node.get_address(&addr).await)
}

async fn deploy_contract(
    State(node): State<Arc<Node>>,
    Json(req): Json<DeployRequest>,
) -> Result<Json<Contract>, ApiError> {
    if req.creator.is_empty() {
        return Err(ApiError::InvalidInput("creator must not be empty".to_string()));
    }
    let contract = node.deploy_contract(req.contract_type, &req.creator, req.params).await?;
    Ok(Json(contract))
}

async fn list_contracts(State(node): State<Arc<Node>>) -> Json<Vec<Contract>> {
    Json(node.list_contracts().await)
}

async fn get_contract(State(node): State<Arc<Node>>, Path(id): Path<String>) -> Result<Json<Contract>, ApiError> {
    Ok(Json(node.get_contract(&id).await?))
}

/// Contract failures are reported in the body with `success: false`.
async fn execute_contract(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> Json<ExecutionResult> {
    Json(node.execute_contract(&id, &req.method, req.params, &req.caller).await)
}

async fn get_peers(State(node): State<Arc<Node>>) -> Json<PeersResponse> {
    let peers = node.peers().await;
    Json(PeersResponse {
        count: peers.len(),
        peers,
    })
}

async fn register_peer(
    State(node): State<Arc<Node>>,
    Json(req): Json<RegisterPeerRequest>,
) -> Result<Json<PeersResponse>, ApiError> {
    node.register_peer(&req.peer)
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    let peers = node.peers().await;
    Ok(Json(PeersResponse {
        count: peers.len(),
        peers,
    }))
}

async fn consensus(State(node): State<Arc<Node>>) -> Json<ConsensusOutcome> {
    Json(node.consensus().await)
}
