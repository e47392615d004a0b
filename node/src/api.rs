//! # REST + WebSocket + JSON-RPC API
//!
//! The axum router in front of a [`SharedTaconomics`] host. Reads are plain
//! REST; every mutating entry point goes through JSON-RPC at `/rpc`.
//!
//! ## Endpoints
//!
//! | Method | Path                            | Description                        |
//! |--------|---------------------------------|------------------------------------|
//! | GET    | `/health`                       | Liveness check                     |
//! | GET    | `/status`                       | Node and ledger summary            |
//! | GET    | `/token`                        | Token state and crunch parameters  |
//! | GET    | `/token/accounts/:address`      | One account, dashboard view        |
//! | GET    | `/token/taqueros`               | Crunch leaderboard                 |
//! | GET    | `/sale`                         | Crowdsale state                    |
//! | GET    | `/sale/contributions/:address`  | One contributor                    |
//! | GET    | `/events`                       | Journal page (`from`, `limit`)     |
//! | POST   | `/rpc`                          | JSON-RPC 2.0 gateway               |
//! | GET    | `/ws`                           | Live journal records               |
//!
//! Reads and `dev_increaseTime` are open. Every other call must carry an
//! `auth` member inside its params: a [`CallSignature`] over the method, a
//! nonce and the remaining params. The caller is the address of the signing
//! key, never a request field.
//!
//! A committed call is persisted before its response is sent, then its
//! records are broadcast to WebSocket subscribers.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use taconomics_contracts::crowdsale::{Round, SaleConfig};
use taconomics_contracts::error::{ContractError, ErrorKind};
use taconomics_contracts::host::{OwnedContract, SharedTaconomics, Taconomics};
use taconomics_contracts::liquidity::LiquidityDeposit;
use taconomics_contracts::taco_token::{
    AccountInfo, CrunchParameters, LeaderboardEntry, LeaderboardOrder, SocialProofs,
};
use taconomics_protocol::auth::CallSignature;
use taconomics_protocol::clock::ManualClock;
use taconomics_protocol::events::{EventRecord, LedgerEvent};
use taconomics_protocol::storage::LedgerDB;
use taconomics_protocol::types::{amount_string, Address, Amount, Timestamp};

use crate::metrics::SharedMetrics;

/// Largest page `/events` and `/token/taqueros` will return.
const MAX_PAGE: usize = 1_000;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub host: SharedTaconomics,
    pub db: LedgerDB,
    pub metrics: SharedMetrics,
    /// Committed journal records, for `/ws` subscribers.
    pub event_tx: broadcast::Sender<EventView>,
    /// Present on devnet nodes; enables `dev_increaseTime`.
    pub manual_clock: Option<Arc<ManualClock>>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/token", get(token_handler))
        .route("/token/accounts/:address", get(account_handler))
        .route("/token/taqueros", get(taqueros_handler))
        .route("/sale", get(sale_handler))
        .route("/sale/contributions/:address", get(contribution_handler))
        .route("/events", get(events_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    /// Named parameters.
    pub params: Option<Value>,
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Every method `/rpc` answers.
pub const RPC_METHODS: &[&str] = &[
    "taco_balanceOf",
    "taco_accountInfo",
    "taco_crunchAmount",
    "sale_contributionOf",
    "dev_increaseTime",
    "taco_transfer",
    "taco_crunch",
    "taco_setPauser",
    "taco_unpause",
    "taco_setCrunchRate",
    "taco_setRewardForTaquero",
    "taco_setTacoTuesdayRewardMultiplier",
    "taco_setTwitterProof",
    "taco_setGithubProof",
    "taco_transferOwnership",
    "sale_sendValue",
    "sale_setCooksList",
    "sale_addAndLockLiquidity",
];

/// JSON-RPC code for a missing, malformed or forged call signature.
pub const UNAUTHENTICATED_CODE: i32 = -32040;

/// Contract rejections map to one code per [`ErrorKind`].
pub fn contract_error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => -32010,
        ErrorKind::Authorization => -32011,
        ErrorKind::State => -32012,
        ErrorKind::Invariant => -32020,
    }
}

/// Why a JSON-RPC call failed.
#[derive(Debug)]
enum RpcFailure {
    MethodNotFound(String),
    InvalidParams(String),
    Unauthenticated(String),
    Contract(ContractError),
    ClockNotManual,
    Internal(String),
}

impl From<RpcFailure> for JsonRpcError {
    fn from(failure: RpcFailure) -> Self {
        match failure {
            RpcFailure::MethodNotFound(method) => JsonRpcError {
                code: -32601,
                message: format!("Method not found: {method}"),
                data: None,
            },
            RpcFailure::InvalidParams(reason) => JsonRpcError {
                code: -32602,
                message: format!("Invalid params: {reason}"),
                data: None,
            },
            RpcFailure::Unauthenticated(reason) => JsonRpcError {
                code: UNAUTHENTICATED_CODE,
                message: format!("Unauthenticated: {reason}"),
                data: None,
            },
            RpcFailure::Contract(e) => JsonRpcError {
                code: contract_error_code(e.kind()),
                message: e.to_string(),
                data: Some(json!({ "code": e.code(), "kind": e.kind() })),
            },
            RpcFailure::ClockNotManual => JsonRpcError {
                code: -32030,
                message: "this node runs on the system clock".into(),
                data: None,
            },
            RpcFailure::Internal(reason) => JsonRpcError {
                code: -32603,
                message: format!("Internal error: {reason}"),
                data: None,
            },
        }
    }
}

// -- Parameters -------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountParams {
    account: Address,
}

/// Mutating calls whose only input is the signature.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferParams {
    to: Address,
    #[serde(with = "amount_string")]
    amount: Amount,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PauserParams {
    pauser: Address,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterParams {
    value: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TwitterProofParams {
    tweet_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GithubProofParams {
    proof: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OwnershipParams {
    contract: OwnedContract,
    new_owner: Address,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendValueParams {
    #[serde(with = "amount_string")]
    amount: Amount,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CooksParams {
    accounts: Vec<Address>,
}

#[derive(Debug, Deserialize)]
struct IncreaseTimeParams {
    seconds: u64,
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcFailure> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcFailure::InvalidParams(e.to_string()))
}

/// Splits the `auth` member off `params` and verifies it over what is
/// left. Returns the caller, its nonce and the remaining params.
fn authenticate(method: &str, params: Option<Value>) -> Result<(Address, u64, Value), RpcFailure> {
    let mut params = match params {
        Some(Value::Object(map)) => map,
        None => serde_json::Map::new(),
        Some(_) => {
            return Err(RpcFailure::InvalidParams(
                "expected named parameters".into(),
            ))
        }
    };
    let auth = params
        .remove("auth")
        .ok_or_else(|| RpcFailure::Unauthenticated("call is not signed".into()))?;
    let auth: CallSignature = serde_json::from_value(auth)
        .map_err(|e| RpcFailure::Unauthenticated(format!("malformed auth: {e}")))?;
    let params = Value::Object(params);
    let caller = auth
        .verify(method, &params)
        .map_err(|e| RpcFailure::Unauthenticated(e.to_string()))?;
    Ok((caller, auth.nonce, params))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcFailure> {
    serde_json::to_value(value).map_err(|e| RpcFailure::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// A journal record as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventView {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub name: String,
    pub event: LedgerEvent,
    pub hash: String,
    pub prev_hash: String,
}

impl From<&EventRecord> for EventView {
    fn from(record: &EventRecord) -> Self {
        Self {
            seq: record.seq,
            timestamp: record.timestamp,
            name: record.event.name().to_string(),
            event: record.event.clone(),
            hash: record.hash_hex(),
            prev_hash: hex::encode(record.prev_hash),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Ledger time.
    pub now: Timestamp,
    pub manual_clock: bool,
    pub events: usize,
    pub head_hash: String,
    pub paused: bool,
    pub round: Option<Round>,
    pub sale_open: bool,
    pub sale_ended: bool,
    pub liquidity_locked: bool,
    /// Wall-clock time of the response, RFC 3339.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub owner: Address,
    pub pauser: Option<Address>,
    pub paused: bool,
    pub pauser_burned: bool,
    pub reserve: Option<Address>,
    #[serde(with = "amount_string")]
    pub total_supply: Amount,
    #[serde(with = "amount_string")]
    pub reserve_balance: Amount,
    #[serde(with = "amount_string")]
    pub total_crunched: Amount,
    /// What a crunch right now would take from the reserve.
    #[serde(with = "amount_string")]
    pub crunchable: Amount,
    pub is_taco_tuesday: bool,
    pub reward_multiplier: u64,
    pub parameters: CrunchParameters,
    pub social: SocialProofs,
    pub taqueros: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub info: AccountInfo,
    #[serde(with = "amount_string")]
    pub native_balance: Amount,
}

#[derive(Debug, Deserialize)]
pub struct TaquerosQuery {
    #[serde(default)]
    pub order: LeaderboardOrder,
    #[serde(default = "default_leaderboard_limit")]
    pub limit: usize,
}

fn default_leaderboard_limit() -> usize {
    10
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaleResponse {
    pub address: Address,
    pub owner: Address,
    pub config: SaleConfig,
    #[serde(with = "amount_string")]
    pub wei_raised: Amount,
    pub round: Option<Round>,
    pub is_open: bool,
    pub has_ended: bool,
    pub public_sale_started: bool,
    pub contributors: usize,
    pub cooks: usize,
    /// $TACO still held by the controller.
    #[serde(with = "amount_string")]
    pub tokens_available: Amount,
    /// Native value held by the controller.
    #[serde(with = "amount_string")]
    pub value_held: Amount,
    pub liquidity: Option<LiquidityDeposit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContributionResponse {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub contribution: Amount,
    #[serde(with = "amount_string")]
    pub remaining_allowance: Amount,
    pub is_cook: bool,
    /// May buy in the round open right now.
    pub eligible_now: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from: u64,
    #[serde(default = "default_events_limit")]
    pub limit: usize,
}

fn default_events_limit() -> usize {
    100
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_address(raw: &str) -> axum::response::Response {
    let err = ErrorResponse {
        error: format!("invalid address: {raw:?}"),
    };
    (StatusCode::BAD_REQUEST, Json(err)).into_response()
}

// ---------------------------------------------------------------------------
// REST Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Liveness only; ledger state belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let host = state.host.lock();
    let now = host.now();
    let resp = StatusResponse {
        version: state.version.clone(),
        now,
        manual_clock: state.manual_clock.is_some(),
        events: host.journal().len(),
        head_hash: hex::encode(host.journal().head_hash()),
        paused: host.token().is_paused(),
        round: host.sale().current_round(now),
        sale_open: host.sale().is_open(now),
        sale_ended: host.sale().has_ended(),
        liquidity_locked: host.finalizer().is_spent(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

async fn token_handler(State(state): State<AppState>) -> impl IntoResponse {
    let host = state.host.lock();
    let now = host.now();
    let token = host.token();
    let resp = TokenResponse {
        owner: token.owner().clone(),
        pauser: token.pauser().cloned(),
        paused: token.is_paused(),
        pauser_burned: token.gate().is_burned(),
        reserve: token.reserve().cloned(),
        total_supply: token.total_supply(),
        reserve_balance: token.reserve().map_or(0, |r| token.balance_of(r)),
        total_crunched: token.total_crunched(),
        crunchable: token.crunch_amount(now),
        is_taco_tuesday: token.is_taco_tuesday(now),
        reward_multiplier: token.reward_multiplier(now),
        parameters: token.parameters().clone(),
        social: token.social_proofs().clone(),
        taqueros: token.taqueros().len(),
    };
    Json(resp)
}

/// `GET /token/accounts/:address`. Unknown accounts read as zero.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> axum::response::Response {
    let Ok(address) = Address::new(address.as_str()) else {
        return bad_address(&address);
    };
    let host = state.host.lock();
    let resp = AccountResponse {
        info: host.token().info_for(&address, host.now()),
        native_balance: host.native_balance(&address),
    };
    Json(resp).into_response()
}

async fn taqueros_handler(
    Query(query): Query<TaquerosQuery>,
    State(state): State<AppState>,
) -> Json<Vec<LeaderboardEntry>> {
    let host = state.host.lock();
    Json(
        host.token()
            .leaderboard(query.order, query.limit.min(MAX_PAGE)),
    )
}

async fn sale_handler(State(state): State<AppState>) -> impl IntoResponse {
    let host = state.host.lock();
    let now = host.now();
    let sale = host.sale();
    let resp = SaleResponse {
        address: sale.address().clone(),
        owner: sale.owner().clone(),
        config: sale.config().clone(),
        wei_raised: sale.wei_raised(),
        round: sale.current_round(now),
        is_open: sale.is_open(now),
        has_ended: sale.has_ended(),
        public_sale_started: sale.public_sale_started(now),
        contributors: sale.contributors(),
        cooks: sale.allowlist().len(),
        tokens_available: host.token().balance_of(sale.address()),
        value_held: host.native_balance(sale.address()),
        liquidity: host.finalizer().deposit().cloned(),
    };
    Json(resp)
}

async fn contribution_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> axum::response::Response {
    let Ok(address) = Address::new(address.as_str()) else {
        return bad_address(&address);
    };
    let host = state.host.lock();
    let sale = host.sale();
    let resp = ContributionResponse {
        contribution: sale.contribution_of(&address),
        remaining_allowance: sale.remaining_allowance(&address),
        is_cook: sale.allowlist().is_cook(&address),
        eligible_now: host.is_eligible_now(&address),
        address,
    };
    Json(resp).into_response()
}

async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Json<Vec<EventView>> {
    let host = state.host.lock();
    let page = host
        .journal()
        .since(query.from)
        .iter()
        .take(query.limit.min(MAX_PAGE))
        .map(EventView::from)
        .collect();
    Json(page)
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

/// `POST /rpc`. The call runs on the blocking pool: it holds the ledger
/// lock and may write to sled.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: -32600,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    let label = if RPC_METHODS.contains(&req.method.as_str()) {
        req.method.as_str()
    } else {
        "unknown"
    };
    state.metrics.rpc_calls_total.with_label_values(&[label]).inc();
    let timer = state.metrics.call_latency_seconds.start_timer();

    let method = req.method.clone();
    let params = req.params;
    let worker_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || dispatch(&worker_state, &method, params))
        .await
        .unwrap_or_else(|e| Err(RpcFailure::Internal(format!("call aborted: {e}"))));
    timer.observe_duration();

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(failure) => {
            tracing::debug!(method = %req.method, ?failure, "rpc call failed");
            (None, Some(JsonRpcError::from(failure)))
        }
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn dispatch(state: &AppState, method: &str, params: Option<Value>) -> Result<Value, RpcFailure> {
    match method {
        "taco_balanceOf" => {
            let p: AccountParams = parse(params)?;
            let host = state.host.lock();
            Ok(json!(host.token().balance_of(&p.account).to_string()))
        }
        "taco_accountInfo" => {
            let p: AccountParams = parse(params)?;
            let host = state.host.lock();
            to_json(&host.token().info_for(&p.account, host.now()))
        }
        "taco_crunchAmount" => {
            let host = state.host.lock();
            Ok(json!(host.crunch_amount().to_string()))
        }
        "sale_contributionOf" => {
            let p: AccountParams = parse(params)?;
            let host = state.host.lock();
            Ok(json!(host.sale().contribution_of(&p.account).to_string()))
        }
        "dev_increaseTime" => {
            let p: IncreaseTimeParams = parse(params)?;
            let clock = state.manual_clock.as_ref().ok_or(RpcFailure::ClockNotManual)?;
            let now = clock.advance(p.seconds);
            tracing::info!(seconds = p.seconds, now, "ledger clock advanced");
            Ok(json!(now))
        }
        _ if RPC_METHODS.contains(&method) => {
            let (caller, nonce, params) = authenticate(method, params).map_err(|failure| {
                if matches!(failure, RpcFailure::Unauthenticated(_)) {
                    state
                        .metrics
                        .rejected_calls_total
                        .with_label_values(&["UNAUTHENTICATED"])
                        .inc();
                    tracing::warn!(method, ?failure, "unauthenticated call refused");
                }
                failure
            })?;
            mutate(state, method, &caller, nonce, Some(params))
        }
        other => Err(RpcFailure::MethodNotFound(other.to_string())),
    }
}

/// Runs a mutating entry point for an authenticated `caller` and commits
/// what it journaled along with the spent nonce.
fn mutate(
    state: &AppState,
    method: &str,
    caller: &Address,
    nonce: u64,
    params: Option<Value>,
) -> Result<Value, RpcFailure> {
    let mut guard = state.host.lock();
    let host: &mut Taconomics = &mut guard;

    if let Err(e) = host.check_nonce(caller, nonce) {
        state
            .metrics
            .rejected_calls_total
            .with_label_values(&[e.code()])
            .inc();
        return Err(RpcFailure::Contract(e));
    }

    let result = match method {
        "taco_transfer" => {
            let p: TransferParams = parse(params)?;
            host.transfer(caller, &p.to, p.amount).map(|()| Value::Bool(true))
        }
        "taco_crunch" => {
            let _: NoParams = parse(params)?;
            match host.crunch(caller) {
                Ok(outcome) => Ok(to_json(&outcome)?),
                Err(e) => Err(e),
            }
        }
        "taco_setPauser" => {
            let p: PauserParams = parse(params)?;
            host.set_pauser(caller, p.pauser)
                .map(|previous| json!({ "previous": previous }))
        }
        "taco_unpause" => {
            let _: NoParams = parse(params)?;
            host.unpause(caller).map(|()| Value::Bool(true))
        }
        "taco_setCrunchRate" => {
            let p: ParameterParams = parse(params)?;
            host.set_crunch_rate(caller, p.value).map(|()| Value::Bool(true))
        }
        "taco_setRewardForTaquero" => {
            let p: ParameterParams = parse(params)?;
            host.set_reward_for_taquero(caller, p.value)
                .map(|()| Value::Bool(true))
        }
        "taco_setTacoTuesdayRewardMultiplier" => {
            let p: ParameterParams = parse(params)?;
            host.set_taco_tuesday_multiplier(caller, p.value)
                .map(|()| Value::Bool(true))
        }
        "taco_setTwitterProof" => {
            let p: TwitterProofParams = parse(params)?;
            host.set_twitter_proof(caller, p.tweet_id)
                .map(|()| Value::Bool(true))
        }
        "taco_setGithubProof" => {
            let p: GithubProofParams = parse(params)?;
            host.set_github_proof(caller, p.proof)
                .map(|()| Value::Bool(true))
        }
        "taco_transferOwnership" => {
            let p: OwnershipParams = parse(params)?;
            host.transfer_ownership(caller, p.contract, p.new_owner)
                .map(|previous| json!({ "previous": previous }))
        }
        "sale_sendValue" => {
            let p: SendValueParams = parse(params)?;
            match host.send_value(caller, p.amount) {
                Ok(receipt) => Ok(to_json(&receipt)?),
                Err(e) => Err(e),
            }
        }
        "sale_setCooksList" => {
            let p: CooksParams = parse(params)?;
            host.set_cooks_list(caller, p.accounts)
                .map(|added| json!({ "added": added }))
        }
        "sale_addAndLockLiquidity" => {
            let _: NoParams = parse(params)?;
            match host.add_and_lock_liquidity(caller) {
                Ok(deposit) => Ok(to_json(&deposit)?),
                Err(e) => Err(e),
            }
        }
        other => return Err(RpcFailure::MethodNotFound(other.to_string())),
    };

    match result {
        Ok(value) => {
            host.record_nonce(caller, nonce);
            commit(state, host)?;
            Ok(value)
        }
        Err(e) => {
            state
                .metrics
                .rejected_calls_total
                .with_label_values(&[e.code()])
                .inc();
            Err(RpcFailure::Contract(e))
        }
    }
}

/// Persists what the last call journaled, then fans it out. The snapshot
/// is written even without new records: the spent nonce must survive.
fn commit(state: &AppState, host: &mut Taconomics) -> Result<(), RpcFailure> {
    let fresh: Vec<EventView> = host.unpersisted().iter().map(EventView::from).collect();
    host.persist(&state.db).map_err(|e| {
        tracing::error!(error = %e, "failed to persist ledger state");
        RpcFailure::Internal(format!("storage: {e}"))
    })?;
    for view in fresh {
        state.metrics.record_event(&view.event);
        // No subscribers is fine.
        let _ = state.event_tx.send(view);
    }
    state.metrics.observe(host);
    Ok(())
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`. Pushes every committed [`EventView`] as JSON. Client
/// messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(view) => {
                        let payload = match serde_json::to_string(&view) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
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
