//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the ledger registry over HTTP. All
//! handlers share [`AppState`] through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                               | Description                     |
//! |--------|------------------------------------|---------------------------------|
//! | GET    | `/health`                          | Liveness probe                  |
//! | GET    | `/status`                          | Version, ledger count, uptime   |
//! | POST   | `/ledgers`                         | Create a ledger                 |
//! | GET    | `/ledgers/count`                   | Number of ledgers               |
//! | GET    | `/ledgers/index/:index`            | Ledger id by creation position  |
//! | GET    | `/creators/:creator/ledgers`       | Ledgers created by a creator    |
//! | GET    | `/ledgers/:id`                     | Ledger summary                  |
//! | GET    | `/ledgers/:id/policy`              | Immutable fee policy            |
//! | GET    | `/ledgers/:id/balances/:holder`    | Balance of a holder             |
//! | POST   | `/ledgers/:id/transfer`            | Transfer with fee split         |
//! | POST   | `/ledgers/:id/approve`             | Set an allowance                |
//! | POST   | `/ledgers/:id/transfer-from`       | Delegated transfer              |
//! | POST   | `/ledgers/:id/claim`               | Claim pending reflection        |
//! | GET    | `/ledgers/:id/reflections/:holder` | Claimable reflection (peek)     |
//! | GET    | `/ledgers/:id/owner`               | Current owner                   |
//! | POST   | `/ledgers/:id/owner`               | Transfer ownership              |
//! | GET    | `/ws`                              | Live ledger event stream        |
//!
//! Accounts in JSON bodies use the engine's representation: `{"holder":
//! "alice"}`, `"reserve"` or `"null"`. In path segments a plain name is a
//! holder, and `~reserve` / `~null` name the two special accounts.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use prism_contracts::{
    Account, Applied, EventRecord, EventSink, FactoryError, FeePolicy, FeePolicyParams,
    LedgerError, LedgerId, LedgerInfo, LedgerParams, SharedRegistry, TransferReceipt,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub registry: Arc<SharedRegistry>,
    /// Committed ledger events, fanned out to WebSocket subscribers.
    pub event_tx: broadcast::Sender<EventRecord>,
    pub metrics: SharedMetrics,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the registry with an [`EventPublisher`] attached, so events
    /// reach subscribers in per-ledger sequence order.
    pub fn new(
        version: String,
        metrics: SharedMetrics,
        event_capacity: usize,
        journal_capacity: usize,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity);
        let publisher = EventPublisher {
            event_tx: event_tx.clone(),
            metrics: Arc::clone(&metrics),
        };
        let registry = SharedRegistry::new()
            .with_journal_capacity(journal_capacity)
            .with_event_sink(Arc::new(publisher));
        Self {
            version,
            registry: Arc::new(registry),
            event_tx,
            metrics,
            started_at: Utc::now(),
        }
    }

    /// Runs a registry mutation and times it. Rejections are counted and
    /// logged, then handed back.
    fn execute<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&SharedRegistry) -> Result<Applied<T>, FactoryError>,
    ) -> Result<T, ApiError> {
        let timer = self.metrics.operation_latency_seconds.start_timer();
        let result = op(&self.registry);
        timer.observe_duration();

        match result {
            Ok(applied) => Ok(applied.value),
            Err(err) => {
                let err = ApiError::from(err);
                self.metrics.record_rejection(err.kind());
                tracing::warn!(operation, kind = err.kind(), "operation rejected: {}", err);
                Err(err)
            }
        }
    }
}

/// Feeds committed events to the metrics and the live stream. Runs inside
/// the ledger's critical section; a broadcast send never blocks.
pub struct EventPublisher {
    event_tx: broadcast::Sender<EventRecord>,
    metrics: SharedMetrics,
}

impl EventSink for EventPublisher {
    fn publish(&self, events: &[EventRecord]) {
        self.metrics.observe_events(events);
        for event in events {
            // No subscribers is not an error.
            let _ = self.event_tx.send(event.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes and request tracing.
/// `cors` adds a permissive CORS layer.
pub fn create_router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .route("/ledgers", post(create_ledger_handler))
        .route("/ledgers/count", get(ledger_count_handler))
        .route("/ledgers/index/:index", get(ledger_at_handler))
        .route("/creators/:creator/ledgers", get(creator_ledgers_handler))
        .route("/ledgers/:id", get(ledger_info_handler))
        .route("/ledgers/:id/policy", get(fee_policy_handler))
        .route("/ledgers/:id/balances/:holder", get(balance_handler))
        .route("/ledgers/:id/transfer", post(transfer_handler))
        .route("/ledgers/:id/approve", post(approve_handler))
        .route("/ledgers/:id/transfer-from", post(transfer_from_handler))
        .route("/ledgers/:id/claim", post(claim_handler))
        .route("/ledgers/:id/reflections/:holder", get(peek_handler))
        .route(
            "/ledgers/:id/owner",
            get(owner_handler).post(transfer_ownership_handler),
        );

    let router = if cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable snake_case discriminator.
    pub kind: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] FactoryError),
    #[error("invalid ledger id: {0}")]
    InvalidLedgerId(String),
    #[error("invalid ledger index: {0}")]
    InvalidIndex(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidLedgerId(_) => "invalid_ledger_id",
            ApiError::InvalidIndex(_) => "invalid_index",
            ApiError::Registry(err) => match err {
                FactoryError::Validation(_) => "validation",
                FactoryError::IndexOutOfRange { .. } => "index_out_of_range",
                FactoryError::LedgerNotFound(_) => "ledger_not_found",
                FactoryError::Ledger(err) => match err {
                    LedgerError::InsufficientBalance { .. } => "insufficient_balance",
                    LedgerError::InsufficientAllowance { .. } => "insufficient_allowance",
                    LedgerError::InvalidRecipient(_) => "invalid_recipient",
                    LedgerError::InvalidSender(_) => "invalid_sender",
                    LedgerError::InvalidSpender(_) => "invalid_spender",
                    LedgerError::InvalidOwner(_) => "invalid_owner",
                    LedgerError::NothingToClaim => "nothing_to_claim",
                    LedgerError::Overflow => "overflow",
                    LedgerError::ConservationViolated(_) => "conservation_violated",
                },
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidLedgerId(_) | ApiError::InvalidIndex(_) => StatusCode::BAD_REQUEST,
            ApiError::Registry(err) => match err {
                FactoryError::Validation(_) => StatusCode::BAD_REQUEST,
                FactoryError::IndexOutOfRange { .. } | FactoryError::LedgerNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                FactoryError::Ledger(err) => match err {
                    LedgerError::InsufficientBalance { .. }
                    | LedgerError::InsufficientAllowance { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    LedgerError::InvalidRecipient(_)
                    | LedgerError::InvalidSender(_)
                    | LedgerError::InvalidSpender(_)
                    | LedgerError::InvalidOwner(_) => StatusCode::BAD_REQUEST,
                    LedgerError::NothingToClaim => StatusCode::CONFLICT,
                    LedgerError::Overflow | LedgerError::ConservationViolated(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn parse_ledger_id(raw: &str) -> Result<LedgerId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidLedgerId(raw.to_string()))
}

/// Maps a path segment to an account: `~reserve` and `~null` are the
/// special accounts, anything else is a holder name.
fn account_from_path(segment: &str) -> Account {
    match segment {
        "~reserve" => Account::Reserve,
        "~null" => Account::Null,
        name => Account::holder(name),
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLedgerRequest {
    /// Account the ledger is indexed under.
    pub creator: Account,
    pub name: String,
    pub symbol: String,
    pub initial_supply: u64,
    #[serde(default)]
    pub policy: FeePolicyParams,
    /// Receives the initial supply.
    pub owner: Account,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: Account,
    pub to: Account,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub owner: Account,
    pub spender: Account,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferFromRequest {
    pub spender: Account,
    pub from: Account,
    pub to: Account,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub holder: Account,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnershipRequest {
    pub new_owner: Account,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub engine_version: String,
    pub ledger_count: usize,
    pub uptime_seconds: i64,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerIdResponse {
    pub ledger_id: LedgerId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatorLedgersResponse {
    pub creator: Account,
    pub ledgers: Vec<LedgerId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub holder: Account,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub owner: Account,
    pub spender: Account,
    pub allowance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub holder: Account,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReflectionResponse {
    pub holder: Account,
    /// What a claim would pay right now.
    pub claimable: u64,
    pub high_water_mark: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub owner: Account,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 while the process is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let now = Utc::now();
    Json(StatusResponse {
        version: state.version.clone(),
        engine_version: prism_contracts::config::ENGINE_VERSION.to_string(),
        ledger_count: state.registry.ledger_count(),
        uptime_seconds: (now - state.started_at).num_seconds(),
        timestamp: now.to_rfc3339(),
    })
}

/// `POST /ledgers`: validates and registers a new ledger.
async fn create_ledger_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateLedgerRequest>,
) -> Result<(StatusCode, Json<LedgerIdResponse>), ApiError> {
    let params = LedgerParams {
        name: req.name,
        symbol: req.symbol,
        initial_supply: req.initial_supply,
        policy: req.policy,
        owner: req.owner,
    };
    let ledger_id = state.execute("create", |registry| registry.create(&req.creator, params))?;
    state
        .metrics
        .ledger_count
        .set(state.registry.ledger_count() as i64);
    Ok((StatusCode::CREATED, Json(LedgerIdResponse { ledger_id })))
}

async fn ledger_count_handler(State(state): State<AppState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.registry.ledger_count(),
    })
}

/// `GET /ledgers/index/:index`: the `index`-th ledger ever created.
async fn ledger_at_handler(
    Path(index): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LedgerIdResponse>, ApiError> {
    let position: usize = index
        .parse()
        .map_err(|_| ApiError::InvalidIndex(index.clone()))?;
    let ledger_id = state.registry.ledger_at(position)?;
    Ok(Json(LedgerIdResponse { ledger_id }))
}

async fn creator_ledgers_handler(
    Path(creator): Path<String>,
    State(state): State<AppState>,
) -> Json<CreatorLedgersResponse> {
    let creator = account_from_path(&creator);
    let ledgers = state.registry.creator_ledgers(&creator);
    Json(CreatorLedgersResponse { creator, ledgers })
}

async fn ledger_info_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LedgerInfo>, ApiError> {
    let id = parse_ledger_id(&id)?;
    Ok(Json(state.registry.info(&id)?))
}

/// `GET /ledgers/:id/policy`: the policy fixed at creation.
async fn fee_policy_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<FeePolicy>, ApiError> {
    let id = parse_ledger_id(&id)?;
    Ok(Json(state.registry.fee_policy(&id)?))
}

async fn balance_handler(
    Path((id, holder)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let id = parse_ledger_id(&id)?;
    let holder = account_from_path(&holder);
    let balance = state.registry.balance_of(&id, &holder)?;
    Ok(Json(BalanceResponse { holder, balance }))
}

/// `POST /ledgers/:id/transfer`: applies the burn/reflection/tax split and
/// returns how the amount was divided.
async fn transfer_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransferReceipt>, ApiError> {
    let id = parse_ledger_id(&id)?;
    let receipt = state.execute("transfer", |registry| {
        registry.transfer(&id, &req.from, &req.to, req.amount)
    })?;
    Ok(Json(receipt))
}

async fn approve_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let id = parse_ledger_id(&id)?;
    state.execute("approve", |registry| {
        registry.approve(&id, &req.owner, &req.spender, req.amount)
    })?;
    Ok(Json(AllowanceResponse {
        owner: req.owner,
        spender: req.spender,
        allowance: req.amount,
    }))
}

async fn transfer_from_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TransferFromRequest>,
) -> Result<Json<TransferReceipt>, ApiError> {
    let id = parse_ledger_id(&id)?;
    let receipt = state.execute("transfer_from", |registry| {
        registry.transfer_from(&id, &req.spender, &req.from, &req.to, req.amount)
    })?;
    Ok(Json(receipt))
}

/// `POST /ledgers/:id/claim`: pays out pending reflection. 409 when there
/// is nothing to claim.
async fn claim_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let id = parse_ledger_id(&id)?;
    let amount = state.execute("claim", |registry| registry.claim(&id, &req.holder))?;
    Ok(Json(ClaimResponse {
        holder: req.holder,
        amount,
    }))
}

/// `GET /ledgers/:id/reflections/:holder`: read-only view of what a claim
/// would pay. Never fails for a known ledger.
async fn peek_handler(
    Path((id, holder)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<ReflectionResponse>, ApiError> {
    let id = parse_ledger_id(&id)?;
    let holder = account_from_path(&holder);
    let (claimable, high_water_mark) = state.registry.read(&id, |ledger| {
        (ledger.peek(&holder), ledger.claimed_high_water_mark(&holder))
    })?;
    Ok(Json(ReflectionResponse {
        holder,
        claimable,
        high_water_mark,
    }))
}

async fn owner_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<OwnerResponse>, ApiError> {
    let id = parse_ledger_id(&id)?;
    let owner = state.registry.current_owner(&id)?;
    Ok(Json(OwnerResponse { owner }))
}

/// `POST /ledgers/:id/owner`: records a new owner. Authenticating the
/// caller is left to whatever sits in front of the node.
async fn transfer_ownership_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<OwnershipRequest>,
) -> Result<Json<OwnerResponse>, ApiError> {
    let id = parse_ledger_id(&id)?;
    let new_owner = req.new_owner;
    state.execute("transfer_ownership", |registry| {
        registry.transfer_ownership(&id, new_owner.clone())
    })?;
    Ok(Json(OwnerResponse { owner: new_owner }))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Only forward events of this ledger.
    pub ledger: Option<String>,
}

/// `GET /ws`: pushes JSON-encoded [`EventRecord`]s as ledgers commit them.
/// `?ledger=<id>` narrows the stream to one ledger. Client messages are
/// ignored.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<StreamParams>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let filter = params
        .ledger
        .as_deref()
        .map(parse_ledger_id)
        .transpose()?;
    Ok(ws.on_upgrade(move |socket| handle_ws_connection(socket, state, filter)))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState, filter: Option<LedgerId>) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(record) => {
                        if filter.is_some_and(|id| id != record.ledger_id) {
                            continue;
                        }
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use prism_contracts::LedgerEvent;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_app_state() -> AppState {
        AppState::new(
            "0.1.0-test".into(),
            Arc::new(crate::metrics::NodeMetrics::new()),
            1024,
            prism_contracts::config::DEFAULT_JOURNAL_CAPACITY,
        )
    }

    /// Sends a GET request and returns (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    fn holder(name: &str) -> serde_json::Value {
        json!({ "holder": name })
    }

    /// The scenario ledger: 5% tax to `wallet`, 5% reflection, no burn.
    async fn create_scenario_ledger(router: &Router) -> String {
        let (status, body) = post_json(
            router,
            "/ledgers",
            json!({
                "creator": holder("launcher"),
                "name": "Prism Coin",
                "symbol": "PRSM",
                "initial_supply": 1_000_000u64,
                "policy": {
                    "tax_percent": 5,
                    "tax_account": holder("wallet"),
                    "reflection_percent": 5,
                    "reflection_enabled": true
                },
                "owner": holder("owner")
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let resp: LedgerIdResponse = serde_json::from_slice(&body).unwrap();
        resp.ledger_id.to_string()
    }

    fn error_kind(body: &[u8]) -> String {
        let err: ErrorResponse = serde_json::from_slice(body).unwrap();
        err.kind
    }

    // -- Service ---------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state(), true);
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_ledger_count() {
        let router = create_router(test_app_state(), false);
        create_scenario_ledger(&router).await;

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.ledger_count, 1);
        assert_eq!(resp.version, "0.1.0-test");
        assert!(resp.uptime_seconds >= 0);
    }

    // -- Factory ---------------------------------------------------------------

    #[tokio::test]
    async fn created_ledger_is_indexed() {
        let router = create_router(test_app_state(), true);
        let id = create_scenario_ledger(&router).await;

        let (_, body) = get(&router, "/ledgers/count").await;
        let count: CountResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(count.count, 1);

        let (status, body) = get(&router, "/ledgers/index/0").await;
        assert_eq!(status, StatusCode::OK);
        let at: LedgerIdResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(at.ledger_id.to_string(), id);

        let (_, body) = get(&router, "/creators/launcher/ledgers").await;
        let by_creator: CreatorLedgersResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(by_creator.ledgers.len(), 1);
        assert_eq!(by_creator.ledgers[0].to_string(), id);

        let (_, body) = get(&router, "/creators/nobody/ledgers").await;
        let empty: CreatorLedgersResponse = serde_json::from_slice(&body).unwrap();
        assert!(empty.ledgers.is_empty());
    }

    #[tokio::test]
    async fn invalid_policy_is_rejected_with_400() {
        let state = test_app_state();
        let router = create_router(state.clone(), true);
        let (status, body) = post_json(
            &router,
            "/ledgers",
            json!({
                "creator": holder("launcher"),
                "name": "Greedy",
                "symbol": "GRD",
                "initial_supply": 1_000u64,
                "policy": {
                    "tax_percent": 60,
                    "tax_account": holder("wallet"),
                    "burn_percent": 50,
                    "burn_enabled": true
                },
                "owner": holder("owner")
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "validation");
        assert_eq!(state.registry.ledger_count(), 0);
    }

    #[tokio::test]
    async fn index_out_of_range_is_404() {
        let router = create_router(test_app_state(), true);
        let (status, body) = get(&router, "/ledgers/index/0").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_kind(&body), "index_out_of_range");

        let (status, body) = get(&router, "/ledgers/index/minus-one").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_index");
    }

    #[tokio::test]
    async fn unknown_and_malformed_ledger_ids() {
        let router = create_router(test_app_state(), true);
        let (status, body) = get(&router, &format!("/ledgers/{}", LedgerId::generate())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_kind(&body), "ledger_not_found");

        let (status, body) = get(&router, "/ledgers/not-a-uuid/policy").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_ledger_id");
    }

    #[tokio::test]
    async fn policy_endpoint_returns_creation_values() {
        let router = create_router(test_app_state(), true);
        let id = create_scenario_ledger(&router).await;
        let (status, body) = get(&router, &format!("/ledgers/{}/policy", id)).await;
        assert_eq!(status, StatusCode::OK);
        let policy: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(policy["tax_percent"], 5);
        assert_eq!(policy["reflection_percent"], 5);
        assert_eq!(policy["burn_percent"], 0);
        assert_eq!(policy["reflection_enabled"], true);
        assert_eq!(policy["burn_enabled"], false);
        assert_eq!(policy["tax_account"], holder("wallet"));
    }

    // -- Transfers -------------------------------------------------------------

    #[tokio::test]
    async fn transfer_applies_split() {
        let state = test_app_state();
        let router = create_router(state.clone(), true);
        let id = create_scenario_ledger(&router).await;

        let (status, body) = post_json(
            &router,
            &format!("/ledgers/{}/transfer", id),
            json!({ "from": holder("owner"), "to": holder("a"), "amount": 1000 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let receipt: TransferReceipt = serde_json::from_slice(&body).unwrap();
        assert_eq!(receipt.split.reflected, 50);
        assert_eq!(receipt.split.taxed, 47);
        assert_eq!(receipt.split.net, 903);

        let (_, body) = get(&router, &format!("/ledgers/{}/balances/a", id)).await;
        let balance: BalanceResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(balance.balance, 903);

        let (_, body) = get(&router, &format!("/ledgers/{}/balances/~reserve", id)).await;
        let pool: BalanceResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(pool.holder, Account::Reserve);
        assert_eq!(pool.balance, 50);

        let (_, body) = get(&router, &format!("/ledgers/{}", id)).await;
        let info: LedgerInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.total_supply, 1_000_000);

        assert_eq!(state.metrics.transfers_total.get(), 1);
        assert_eq!(state.metrics.reflection_pooled_total.get(), 50);
    }

    #[tokio::test]
    async fn transfer_errors_map_to_status_codes() {
        let state = test_app_state();
        let router = create_router(state.clone(), true);
        let id = create_scenario_ledger(&router).await;
        let path = format!("/ledgers/{}/transfer", id);

        let (status, body) = post_json(
            &router,
            &path,
            json!({ "from": holder("a"), "to": holder("b"), "amount": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_kind(&body), "insufficient_balance");

        let (status, body) = post_json(
            &router,
            &path,
            json!({ "from": holder("owner"), "to": "null", "amount": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_recipient");

        let (status, body) = post_json(
            &router,
            &path,
            json!({ "from": "reserve", "to": holder("b"), "amount": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_sender");

        let rejected = state
            .metrics
            .rejected_operations_total
            .with_label_values(&["insufficient_balance"])
            .get();
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn approve_then_transfer_from() {
        let router = create_router(test_app_state(), true);
        let id = create_scenario_ledger(&router).await;

        let (status, _) = post_json(
            &router,
            &format!("/ledgers/{}/approve", id),
            json!({ "owner": holder("owner"), "spender": holder("desk"), "amount": 500 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            &router,
            &format!("/ledgers/{}/transfer-from", id),
            json!({
                "spender": holder("desk"),
                "from": holder("owner"),
                "to": holder("c"),
                "amount": 400
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let receipt: TransferReceipt = serde_json::from_slice(&body).unwrap();
        assert_eq!(receipt.amount, 400);

        let (status, body) = post_json(
            &router,
            &format!("/ledgers/{}/transfer-from", id),
            json!({
                "spender": holder("desk"),
                "from": holder("owner"),
                "to": holder("c"),
                "amount": 101
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_kind(&body), "insufficient_allowance");
    }

    // -- Reflection ------------------------------------------------------------

    #[tokio::test]
    async fn peek_then_claim() {
        let state = test_app_state();
        let router = create_router(state.clone(), true);
        let id = create_scenario_ledger(&router).await;
        post_json(
            &router,
            &format!("/ledgers/{}/transfer", id),
            json!({ "from": holder("owner"), "to": holder("a"), "amount": 100_000 }),
        )
        .await;

        let (status, body) = get(&router, &format!("/ledgers/{}/reflections/owner", id)).await;
        assert_eq!(status, StatusCode::OK);
        let peek: ReflectionResponse = serde_json::from_slice(&body).unwrap();
        assert!(peek.claimable > 0);
        assert_eq!(peek.high_water_mark, 0);

        let (status, body) = post_json(
            &router,
            &format!("/ledgers/{}/claim", id),
            json!({ "holder": holder("owner") }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let claim: ClaimResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(claim.amount, peek.claimable);

        let (status, body) = post_json(
            &router,
            &format!("/ledgers/{}/claim", id),
            json!({ "holder": holder("owner") }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_kind(&body), "nothing_to_claim");

        assert_eq!(state.metrics.claims_total.get(), 1);
        assert_eq!(state.metrics.tokens_claimed_total.get(), claim.amount);
    }

    #[tokio::test]
    async fn peek_for_reserve_is_zero() {
        let router = create_router(test_app_state(), true);
        let id = create_scenario_ledger(&router).await;
        let (status, body) =
            get(&router, &format!("/ledgers/{}/reflections/~reserve", id)).await;
        assert_eq!(status, StatusCode::OK);
        let peek: ReflectionResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(peek.claimable, 0);
    }

    // -- Ownership -------------------------------------------------------------

    #[tokio::test]
    async fn ownership_transfer_round_trip() {
        let router = create_router(test_app_state(), true);
        let id = create_scenario_ledger(&router).await;
        let path = format!("/ledgers/{}/owner", id);

        let (_, body) = get(&router, &path).await;
        let owner: OwnerResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(owner.owner, Account::holder("owner"));

        let (status, _) = post_json(&router, &path, json!({ "new_owner": holder("heir") })).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = get(&router, &path).await;
        let owner: OwnerResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(owner.owner, Account::holder("heir"));

        let (status, body) = post_json(&router, &path, json!({ "new_owner": "null" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_owner");
    }

    // -- Events ----------------------------------------------------------------

    #[tokio::test]
    async fn committed_events_are_broadcast() {
        let state = test_app_state();
        let mut rx = state.event_tx.subscribe();
        let router = create_router(state.clone(), true);
        let id = create_scenario_ledger(&router).await;
        post_json(
            &router,
            &format!("/ledgers/{}/transfer", id),
            json!({ "from": holder("owner"), "to": holder("a"), "amount": 1000 }),
        )
        .await;

        let kinds: Vec<&'static str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|record| record.event.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["ledger_created", "reflection_pooled", "transferred"]
        );
        assert_eq!(state.metrics.ledgers_created_total.get(), 1);
        assert_eq!(state.metrics.ledger_count.get(), 1);
    }

    #[tokio::test]
    async fn rejected_operations_publish_nothing() {
        let state = test_app_state();
        let router = create_router(state.clone(), true);
        let id = create_scenario_ledger(&router).await;
        let mut rx = state.event_tx.subscribe();

        post_json(
            &router,
            &format!("/ledgers/{}/claim", id),
            json!({ "holder": holder("owner") }),
        )
        .await;
        assert!(rx.try_recv().is_err());

        post_json(
            &router,
            &format!("/ledgers/{}/approve", id),
            json!({ "owner": holder("owner"), "spender": holder("desk"), "amount": 1 }),
        )
        .await;
        let record = rx.try_recv().unwrap();
        assert!(matches!(record.event, LedgerEvent::Approval { amount: 1, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_stream_in_sequence_order() {
        let state = test_app_state();
        let router = create_router(state.clone(), true);
        let id = create_scenario_ledger(&router).await;
        let mut rx = state.event_tx.subscribe();
        let path = format!("/ledgers/{}/transfer", id);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let router = router.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    let to = holder(&format!("h{}", i));
                    for _ in 0..10 {
                        post_json(
                            &router,
                            &path,
                            json!({ "from": holder("owner"), "to": to, "amount": 100 }),
                        )
                        .await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let sequences: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|record| record.sequence)
            .collect();
        // 80 transfers, two events each (reflection pooled, transferred).
        assert_eq!(sequences.len(), 160);
        assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
    }
}
