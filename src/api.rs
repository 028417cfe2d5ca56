//! HTTP surface of a CareChain node
//!
//! Translates requests into ledger calls and ledger results into JSON. Input
//! validation happens here; the ledger only ever sees well-formed records.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::Blockchain;
use crate::consensus::{ConsensusResolver, Resolution};
use crate::error::ChainError;
use crate::miner::mine_once;
use crate::record::record_from_submission;

const HOME_TEXT: &str = "Hospital Blockchain Node - Use endpoints: /transactions/new, /mine, \
/chain, /nodes/register, /nodes/resolve";

const INVALID_NODES: &str = "Error: Please supply a valid list of nodes";

/// Request counters exposed on `/stats`.
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    records_submitted: u64,
    blocks_mined: u64,
    resolutions: u64,
    chains_replaced: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub records_submitted: u64,
    pub blocks_mined: u64,
    pub resolutions: u64,
    pub chains_replaced: u64,
    pub uptime_seconds: u64,
}

/// Everything a handler needs. The ledger is owned here and handed to each
/// request through axum state.
#[derive(Clone)]
pub struct AppState {
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub resolver: Arc<ConsensusResolver>,
    stats: Arc<RwLock<ApiStats>>,
}

impl AppState {
    pub fn new(blockchain: Arc<RwLock<Blockchain>>, resolver: Arc<ConsensusResolver>) -> Self {
        Self {
            blockchain,
            resolver,
            stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            records_submitted: stats.records_submitted,
            blocks_mined: stats.blocks_mined,
            resolutions: stats.resolutions,
            chains_replaced: stats.chains_replaced,
            uptime_seconds: uptime,
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidRecord(msg) => ApiError::InvalidInput(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    state.stats.write().await.record_request(success);

    response
}

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

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(home))
        .route("/transactions/new", post(new_transaction))
        .route("/transactions/pending", get(pending_transactions))
        .route("/mine", get(mine))
        .route("/chain", get(full_chain))
        .route("/chain/validate", get(validate_chain))
        .route("/nodes", get(list_nodes))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(consensus))
        .route("/stats", get(api_stats))
        // last layer is outermost: logged timing includes the stats bookkeeping
        .layer(middleware::from_fn_with_state(state.clone(), stats_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
        .layer(cors)
}

/// Serve the node API on `listener` until `shutdown` resolves.
pub async fn serve<F>(state: AppState, listener: TcpListener, shutdown: F) -> Result<(), ChainError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn home() -> &'static str {
    HOME_TEXT
}

async fn new_transaction(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(values) = payload?;
    let record = record_from_submission(&values)?;

    let index = state.blockchain.write().await.submit_record(record);
    state.stats.write().await.records_submitted += 1;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("Transaction added to Block {}", index),
        }),
    ))
}

async fn pending_transactions(State(state): State<AppState>) -> impl IntoResponse {
    let chain = state.blockchain.read().await;
    let pending = chain.pending_records();
    Json(json!({
        "count": pending.len(),
        "transactions": pending,
    }))
}

async fn mine(State(state): State<AppState>) -> Response {
    let Some(block) = mine_once(&state.blockchain).await else {
        return (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "No transactions to mine".to_string(),
            }),
        )
            .into_response();
    };
    state.stats.write().await.blocks_mined += 1;

    Json(json!({
        "message": "New Block Mined",
        "index": block.index,
        "transactions": block.transactions,
        "previous_hash": block.previous_hash,
    }))
    .into_response()
}

async fn full_chain(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.blockchain.read().await.snapshot())
}

async fn validate_chain(State(state): State<AppState>) -> impl IntoResponse {
    let chain = state.blockchain.read().await;
    Json(json!({
        "valid": chain.validate(),
        "length": chain.len(),
    }))
}

async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    let nodes = state.blockchain.read().await.nodes();
    Json(json!({
        "count": nodes.len(),
        "nodes": nodes,
    }))
}

/// Pulls the `nodes` list out of a registration body, rejecting anything that
/// is not an array of strings.
fn parse_node_list(values: &Value) -> Result<Vec<String>, ApiError> {
    let invalid = || ApiError::InvalidInput(INVALID_NODES.to_string());
    values
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(invalid)?
        .iter()
        .map(|node| node.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

async fn register_nodes(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(values) = payload.map_err(|_| ApiError::InvalidInput(INVALID_NODES.to_string()))?;
    let nodes = parse_node_list(&values)?;

    let mut chain = state.blockchain.write().await;
    for node in nodes {
        if chain.register_node(node.clone()) {
            tracing::info!(peer = %node, "registered peer");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "New nodes have been added",
            "total_nodes": chain.nodes(),
        })),
    ))
}

async fn consensus(State(state): State<AppState>) -> impl IntoResponse {
    let resolution = state.resolver.resolve(&state.blockchain).await;
    {
        let mut stats = state.stats.write().await;
        stats.resolutions += 1;
        if resolution.is_replaced() {
            stats.chains_replaced += 1;
        }
    }

    match resolution {
        Resolution::Replaced { chain } => Json(json!({
            "message": "Chain was replaced",
            "new_chain": chain,
        })),
        Resolution::NotReplaced { chain } => Json(json!({
            "message": "Chain is authoritative",
            "chain": chain,
        })),
    }
}

async fn api_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.get_stats().await)
}
