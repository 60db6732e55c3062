//! Axum-based HTTP gateway with body limits, timeouts, and CORS.
//!
//! Every response body is JSON. Errors use a uniform envelope:
//! `{"code": "...", "message": "..."}` with an optional `"field"` for
//! validation failures, so clients can branch on `code` without parsing
//! human-readable text.
//!
//! Route groups:
//! - `/health` — public liveness + database probe
//! - `/api/auth/*` — register, login, refresh, me
//! - `/api/kitchens/*` — reads and creation are public (registration
//!   needs a kitchen before any user exists); rename/delete need a token
//! - `/api/items/*`, `/api/consumption-logs/*`, `/api/restock-logs/*` —
//!   bearer token required

use crate::auth::{AuthService, User};
use crate::error::Error;
use crate::inventory::{
    InventoryLedger, ItemPatch, ItemStatus, LogFilter, LogQuery, NewItem,
};
use crate::kitchen::KitchenDirectory;
use crate::store::Store;
use anyhow::Result;
use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) — prevents slow-loris abuse
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Minimum password length accepted at registration.
const MIN_PASSWORD_LEN: usize = 8;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub directory: Arc<KitchenDirectory>,
    pub auth: Arc<AuthService>,
    pub ledger: Arc<InventoryLedger>,
    pub logs: Arc<LogQuery>,
}

/// Concrete handler return type (avoids `impl IntoResponse` inference issues).
type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Run the HTTP gateway.
pub async fn run(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received — draining connections");
}

/// Build the full router with middleware. Split out so tests can drive
/// it with `tower::ServiceExt::oneshot` without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/auth/register", post(handle_auth_register))
        .route("/api/auth/login", post(handle_auth_login))
        .route("/api/auth/refresh", post(handle_auth_refresh))
        .route("/api/auth/me", get(handle_auth_me))
        .route("/api/kitchens", post(handle_kitchen_create))
        .route("/api/kitchens", get(handle_kitchen_list))
        .route("/api/kitchens/{id}", get(handle_kitchen_get))
        .route("/api/kitchens/{id}", put(handle_kitchen_rename))
        .route("/api/kitchens/{id}", delete(handle_kitchen_delete))
        .route("/api/kitchens/by-code/{code}", get(handle_kitchen_by_code))
        .route("/api/items", post(handle_item_create))
        .route("/api/items", get(handle_item_list))
        .route("/api/items/{id}", get(handle_item_get))
        .route("/api/items/{id}", put(handle_item_update))
        .route("/api/items/{id}", delete(handle_item_delete))
        .route("/api/items/{id}/quantity", patch(handle_item_set_quantity))
        .route("/api/consumption-logs", post(handle_consumption_create))
        .route("/api/consumption-logs", get(handle_consumption_list))
        .route("/api/consumption-logs/{id}", get(handle_consumption_get))
        .route(
            "/api/consumption-logs/{id}",
            delete(handle_consumption_delete),
        )
        .route("/api/restock-logs", post(handle_restock_create))
        .route("/api/restock-logs", get(handle_restock_list))
        .route("/api/restock-logs/{id}", get(handle_restock_get))
        .route("/api/restock-logs/{id}", delete(handle_restock_delete))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

// ══════════════════════════════════════════════════════════════════════════════
// RESPONSE HELPERS
// ══════════════════════════════════════════════════════════════════════════════

fn error_body(code: &str, message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({"code": code, "message": message}))
}

fn field_error(message: &str, field: &str) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "code": "validation_error",
            "message": message,
            "field": field,
        })),
    )
}

/// Map a domain error onto status + envelope. Internal failures are
/// logged server-side and never echo their cause to the client.
fn error_response(err: &Error) -> ApiResponse {
    match err {
        Error::NotFound(_) => (StatusCode::NOT_FOUND, error_body(err.code(), &err.to_string())),
        Error::Conflict(_) => (StatusCode::CONFLICT, error_body(err.code(), &err.to_string())),
        Error::InvalidCredentials | Error::TokenInvalid | Error::TokenExpired => (
            StatusCode::UNAUTHORIZED,
            error_body(err.code(), &err.to_string()),
        ),
        Error::Validation(_) => (
            StatusCode::BAD_REQUEST,
            error_body(err.code(), &err.to_string()),
        ),
        Error::CodeSpaceExhausted | Error::Credential(_) | Error::Storage(_) => {
            tracing::error!("Internal error: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(err.code(), "Internal server error"),
            )
        }
    }
}

fn json_ok<T: Serialize>(status: StatusCode, value: &T) -> ApiResponse {
    match serde_json::to_value(value) {
        Ok(v) => (status, Json(v)),
        Err(e) => {
            tracing::error!("Failed to serialize response: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal_error", "Internal server error"),
            )
        }
    }
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiResponse> {
    body.map(|Json(b)| b).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            error_body("validation_error", &format!("Invalid request body: {e}")),
        )
    })
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the authenticated user or produce the 401 response.
fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiResponse> {
    let token = extract_bearer_token(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            error_body("token_invalid", "Missing Authorization header"),
        )
    })?;
    state.auth.current_user(token).map_err(|e| error_response(&e))
}

// ══════════════════════════════════════════════════════════════════════════════
// INPUT VALIDATORS
// ══════════════════════════════════════════════════════════════════════════════

/// Password policy: at least 8 chars with upper, lower, digit, and symbol.
fn validate_password(password: &str) -> Result<(), ApiResponse> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());

    if long_enough && has_upper && has_lower && has_digit && has_symbol {
        Ok(())
    } else {
        Err(field_error(
            "Password must be at least 8 characters and include uppercase, \
             lowercase, digit, and symbol",
            "password",
        ))
    }
}

fn validate_kitchen_code(code: &str) -> Result<(), ApiResponse> {
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(field_error("Kitchen code must be exactly 6 digits", "kitchen_code"))
    }
}

fn validate_percent(value: f64, field: &str) -> Result<(), ApiResponse> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(field_error("Value must be between 0 and 100", field))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// HEALTH
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health — public; degraded (503) when the database probe fails.
async fn handle_health(State(state): State<AppState>) -> ApiResponse {
    if state.store.ping() {
        (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "database": "ok"})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded", "database": "unreachable"})),
        )
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AUTH HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RegisterBody {
    display_name: String,
    password: String,
    kitchen_code: String,
}

#[derive(Deserialize)]
struct LoginBody {
    display_name: String,
    password: String,
    kitchen_code: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

/// POST /api/auth/register — create a user in an existing kitchen and
/// sign them in immediately.
async fn handle_auth_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> ApiResponse {
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    if let Err(resp) = validate_kitchen_code(&body.kitchen_code) {
        return resp;
    }
    if let Err(resp) = validate_password(&body.password) {
        return resp;
    }

    let user = match state
        .auth
        .register(&body.display_name, &body.password, &body.kitchen_code)
    {
        Ok(user) => user,
        Err(e) => return error_response(&e),
    };
    let tokens = match state.auth.issue_tokens(&user) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "user": user,
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
        })),
    )
}

/// POST /api/auth/login
async fn handle_auth_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResponse {
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let user = match state
        .auth
        .authenticate(&body.display_name, &body.password, &body.kitchen_code)
    {
        Ok(user) => user,
        Err(e) => return error_response(&e),
    };
    let tokens = match state.auth.issue_tokens(&user) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "user": user,
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
        })),
    )
}

/// POST /api/auth/refresh — exchange a refresh token for a new access token.
async fn handle_auth_refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshBody>, JsonRejection>,
) -> ApiResponse {
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match state.auth.refresh(&body.refresh_token) {
        Ok(access_token) => (
            StatusCode::OK,
            Json(serde_json::json!({"access_token": access_token})),
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /api/auth/me — resolve the caller from their access token.
async fn handle_auth_me(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    match require_user(&state, &headers) {
        Ok(user) => json_ok(StatusCode::OK, &user),
        Err(resp) => resp,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// KITCHEN HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct KitchenBody {
    name: String,
}

/// POST /api/kitchens — public: the first user of a household creates
/// the kitchen before anyone can register into it.
async fn handle_kitchen_create(
    State(state): State<AppState>,
    body: Result<Json<KitchenBody>, JsonRejection>,
) -> ApiResponse {
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match state.directory.create(&body.name) {
        Ok(kitchen) => json_ok(StatusCode::CREATED, &kitchen),
        Err(e) => error_response(&e),
    }
}

/// GET /api/kitchens
async fn handle_kitchen_list(State(state): State<AppState>) -> ApiResponse {
    match state.directory.list_all() {
        Ok(kitchens) => json_ok(StatusCode::OK, &kitchens),
        Err(e) => error_response(&e),
    }
}

/// GET /api/kitchens/{id}
async fn handle_kitchen_get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResponse {
    match state.directory.lookup_by_id(id) {
        Ok(kitchen) => json_ok(StatusCode::OK, &kitchen),
        Err(e) => error_response(&e),
    }
}

/// GET /api/kitchens/by-code/{code} — the join-a-kitchen lookup.
async fn handle_kitchen_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResponse {
    if let Err(resp) = validate_kitchen_code(&code) {
        return resp;
    }
    match state.directory.lookup_by_code(&code) {
        Ok(kitchen) => json_ok(StatusCode::OK, &kitchen),
        Err(e) => error_response(&e),
    }
}

/// PUT /api/kitchens/{id} — rename; the code never changes.
async fn handle_kitchen_rename(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Result<Json<KitchenBody>, JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match state.directory.rename(id, &body.name) {
        Ok(kitchen) => json_ok(StatusCode::OK, &kitchen),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/kitchens/{id}
async fn handle_kitchen_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    match state.directory.delete(id) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted"})),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            error_body("not_found", "kitchen not found"),
        ),
        Err(e) => error_response(&e),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ITEM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct ItemCreateBody {
    name: String,
    kitchen_id: i64,
    category: Option<String>,
    quantity_percent: Option<f64>,
    low_stock_threshold: Option<f64>,
    status: Option<String>,
}

#[derive(Deserialize, Default)]
struct ItemUpdateBody {
    name: Option<String>,
    category: Option<String>,
    quantity_percent: Option<f64>,
    low_stock_threshold: Option<f64>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity_percent: f64,
}

#[derive(Deserialize)]
struct ItemListParams {
    kitchen_id: Option<i64>,
}

fn parse_status(raw: &str) -> Result<ItemStatus, ApiResponse> {
    ItemStatus::parse(raw)
        .ok_or_else(|| field_error("Status must be 'needed' or 'in_stock'", "status"))
}

/// POST /api/items
async fn handle_item_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ItemCreateBody>, JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let mut draft = NewItem::new(body.name, body.kitchen_id);
    draft.category = body.category;
    if let Some(quantity) = body.quantity_percent {
        if let Err(resp) = validate_percent(quantity, "quantity_percent") {
            return resp;
        }
        draft.quantity_percent = quantity;
    }
    if let Some(threshold) = body.low_stock_threshold {
        if let Err(resp) = validate_percent(threshold, "low_stock_threshold") {
            return resp;
        }
        draft.low_stock_threshold = threshold;
    }
    if let Some(ref raw) = body.status {
        match parse_status(raw) {
            Ok(status) => draft.status = status,
            Err(resp) => return resp,
        }
    }

    match state.ledger.create_item(draft) {
        Ok(item) => json_ok(StatusCode::CREATED, &item),
        Err(e) => error_response(&e),
    }
}

/// GET /api/items?kitchen_id=N
async fn handle_item_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ItemListParams>,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    let Some(kitchen_id) = params.kitchen_id else {
        return (
            StatusCode::BAD_REQUEST,
            error_body("missing_parameter", "kitchen_id query parameter is required"),
        );
    };
    match state.ledger.list_items_by_kitchen(kitchen_id) {
        Ok(items) => json_ok(StatusCode::OK, &items),
        Err(e) => error_response(&e),
    }
}

/// GET /api/items/{id}
async fn handle_item_get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    match state.ledger.get_item(id) {
        Ok(item) => json_ok(StatusCode::OK, &item),
        Err(e) => error_response(&e),
    }
}

/// PUT /api/items/{id} — partial update; quantity and status move
/// independently here, with no clamping or derivation.
async fn handle_item_update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Result<Json<ItemUpdateBody>, JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let mut patch = ItemPatch {
        name: body.name,
        category: body.category,
        ..Default::default()
    };
    if let Some(quantity) = body.quantity_percent {
        if let Err(resp) = validate_percent(quantity, "quantity_percent") {
            return resp;
        }
        patch.quantity_percent = Some(quantity);
    }
    if let Some(threshold) = body.low_stock_threshold {
        if let Err(resp) = validate_percent(threshold, "low_stock_threshold") {
            return resp;
        }
        patch.low_stock_threshold = Some(threshold);
    }
    if let Some(ref raw) = body.status {
        match parse_status(raw) {
            Ok(status) => patch.status = Some(status),
            Err(resp) => return resp,
        }
    }

    match state.ledger.update_item(id, patch) {
        Ok(item) => json_ok(StatusCode::OK, &item),
        Err(e) => error_response(&e),
    }
}

/// PATCH /api/items/{id}/quantity — direct set; out-of-range input is
/// clamped rather than rejected, and status is derived at the bounds.
async fn handle_item_set_quantity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Result<Json<QuantityBody>, JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match state.ledger.update_quantity(id, body.quantity_percent) {
        Ok(item) => json_ok(StatusCode::OK, &item),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/items/{id}
async fn handle_item_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    match state.ledger.delete_item(id) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted"})),
        ),
        Ok(false) => (StatusCode::NOT_FOUND, error_body("not_found", "item not found")),
        Err(e) => error_response(&e),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// LOG HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct ConsumptionBody {
    item_id: i64,
    percent_used: f64,
}

#[derive(Deserialize)]
struct RestockBody {
    item_id: i64,
}

#[derive(Deserialize)]
struct LogListParams {
    item_id: Option<i64>,
    kitchen_id: Option<i64>,
    user_id: Option<i64>,
}

/// Log listings accept exactly one filter dimension.
fn log_filter_from_params(params: &LogListParams) -> Result<LogFilter, ApiResponse> {
    let filters: Vec<LogFilter> = [
        params.item_id.map(LogFilter::Item),
        params.kitchen_id.map(LogFilter::Kitchen),
        params.user_id.map(LogFilter::User),
    ]
    .into_iter()
    .flatten()
    .collect();

    match filters.as_slice() {
        [single] => Ok(*single),
        [] => Err((
            StatusCode::BAD_REQUEST,
            error_body(
                "missing_parameter",
                "One of item_id, kitchen_id, or user_id is required",
            ),
        )),
        _ => Err((
            StatusCode::BAD_REQUEST,
            error_body(
                "validation_error",
                "Filters item_id, kitchen_id, and user_id are mutually exclusive",
            ),
        )),
    }
}

/// POST /api/consumption-logs — attributed to the calling user.
async fn handle_consumption_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ConsumptionBody>, JsonRejection>,
) -> ApiResponse {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    if let Err(resp) = validate_percent(body.percent_used, "percent_used") {
        return resp;
    }

    match state
        .ledger
        .record_consumption(user.id, body.item_id, body.percent_used)
    {
        Ok(log) => json_ok(StatusCode::CREATED, &log),
        Err(e) => error_response(&e),
    }
}

/// GET /api/consumption-logs?item_id=|kitchen_id=|user_id=
async fn handle_consumption_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LogListParams>,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    let filter = match log_filter_from_params(&params) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match state.logs.list_consumption(filter) {
        Ok(logs) => json_ok(StatusCode::OK, &logs),
        Err(e) => error_response(&e),
    }
}

/// GET /api/consumption-logs/{id}
async fn handle_consumption_get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    match state.logs.get_consumption(id) {
        Ok(log) => json_ok(StatusCode::OK, &log),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/consumption-logs/{id} — removes the record only; the
/// item quantity it produced is untouched.
async fn handle_consumption_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    match state.logs.delete_consumption(id) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted"})),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            error_body("not_found", "consumption log not found"),
        ),
        Err(e) => error_response(&e),
    }
}

/// POST /api/restock-logs — resets the item to full.
async fn handle_restock_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RestockBody>, JsonRejection>,
) -> ApiResponse {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match state.ledger.record_restock(user.id, body.item_id) {
        Ok(log) => json_ok(StatusCode::CREATED, &log),
        Err(e) => error_response(&e),
    }
}

/// GET /api/restock-logs?item_id=|kitchen_id=|user_id=
async fn handle_restock_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LogListParams>,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    let filter = match log_filter_from_params(&params) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match state.logs.list_restock(filter) {
        Ok(logs) => json_ok(StatusCode::OK, &logs),
        Err(e) => error_response(&e),
    }
}

/// GET /api/restock-logs/{id}
async fn handle_restock_get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    match state.logs.get_restock(id) {
        Ok(log) => json_ok(StatusCode::OK, &log),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/restock-logs/{id}
async fn handle_restock_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_user(&state, &headers) {
        return resp;
    }
    match state.logs.delete_restock(id) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted"})),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            error_body("not_found", "restock log not found"),
        ),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenSigner;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let store = Arc::new(Store::in_memory().unwrap());
        let signer = TokenSigner::new("test-secret", 900, 604_800);
        AppState {
            store: store.clone(),
            directory: Arc::new(KitchenDirectory::new(store.clone())),
            auth: Arc::new(AuthService::new(store.clone(), signer)),
            ledger: Arc::new(InventoryLedger::new(store.clone())),
            logs: Arc::new(LogQuery::new(store)),
        }
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = if let Some(body) = body {
            builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Create a kitchen and a signed-in user; returns (kitchen, access token).
    async fn seed_user(app: &Router) -> (serde_json::Value, String) {
        let (status, kitchen) = call(
            app,
            "POST",
            "/api/kitchens",
            None,
            Some(serde_json::json!({"name": "Home"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let code = kitchen["code"].as_str().unwrap().to_string();
        let (status, registered) = call(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "Strong#123",
                "kitchen_code": code,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let token = registered["access_token"].as_str().unwrap().to_string();
        (kitchen, token)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(test_state());
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn register_login_and_me_round_trip() {
        let app = router(test_state());
        let (kitchen, token) = seed_user(&app).await;

        let (status, me) = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["display_name"], "Alice");
        assert_eq!(me["kitchen_code"], kitchen["code"]);
        assert!(me.get("password_hash").is_none());

        let (status, login) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "Strong#123",
                "kitchen_code": kitchen["code"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(login["access_token"].as_str().is_some());
    }

    #[tokio::test]
    async fn weak_password_is_rejected_with_field() {
        let app = router(test_state());
        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "weak",
                "kitchen_code": "123456",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["field"], "password");
    }

    #[tokio::test]
    async fn malformed_kitchen_code_is_rejected_before_lookup() {
        let app = router(test_state());
        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "Strong#123",
                "kitchen_code": "12ab56",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "kitchen_code");
    }

    #[tokio::test]
    async fn login_failures_are_unauthorized() {
        let app = router(test_state());
        let (kitchen, _) = seed_user(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "Wrong#123",
                "kitchen_code": kitchen["code"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "auth_invalid_credentials");
    }

    #[tokio::test]
    async fn refresh_yields_usable_access_token() {
        let app = router(test_state());
        let (kitchen, _) = seed_user(&app).await;

        let (_, login) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "Strong#123",
                "kitchen_code": kitchen["code"],
            })),
        )
        .await;

        let (status, refreshed) = call(
            &app,
            "POST",
            "/api/auth/refresh",
            None,
            Some(serde_json::json!({"refresh_token": login["refresh_token"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let new_access = refreshed["access_token"].as_str().unwrap();
        let (status, me) = call(&app, "GET", "/api/auth/me", Some(new_access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["display_name"], "Alice");
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let app = router(test_state());
        let (kitchen, _) = seed_user(&app).await;
        let (_, login) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "Strong#123",
                "kitchen_code": kitchen["code"],
            })),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/refresh",
            None,
            Some(serde_json::json!({"refresh_token": login["access_token"]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "token_invalid");
    }

    #[tokio::test]
    async fn kitchen_lookup_by_code() {
        let app = router(test_state());
        let (kitchen, _) = seed_user(&app).await;
        let code = kitchen["code"].as_str().unwrap();

        let (status, found) =
            call(&app, "GET", &format!("/api/kitchens/by-code/{code}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["id"], kitchen["id"]);

        let (status, _) = call(&app, "GET", "/api/kitchens/by-code/abc", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn items_require_bearer_token() {
        let app = router(test_state());
        let (status, body) = call(&app, "GET", "/api/items?kitchen_id=1", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "token_invalid");

        let (status, _) = call(
            &app,
            "POST",
            "/api/items",
            Some("not-a-jwt"),
            Some(serde_json::json!({"name": "Milk", "kitchen_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn item_create_validates_percent_range() {
        let app = router(test_state());
        let (kitchen, token) = seed_user(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/items",
            Some(&token),
            Some(serde_json::json!({
                "name": "Milk",
                "kitchen_id": kitchen["id"],
                "quantity_percent": 140.0,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "quantity_percent");
    }

    #[tokio::test]
    async fn full_consumption_and_restock_scenario() {
        let app = router(test_state());
        let (kitchen, token) = seed_user(&app).await;

        let (status, item) = call(
            &app,
            "POST",
            "/api/items",
            Some(&token),
            Some(serde_json::json!({"name": "Milk", "kitchen_id": kitchen["id"]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(item["quantity_percent"], 100.0);
        assert_eq!(item["status"], "in_stock");
        let item_id = item["id"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            "POST",
            "/api/consumption-logs",
            Some(&token),
            Some(serde_json::json!({"item_id": item_id, "percent_used": 40.0})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, item) =
            call(&app, "GET", &format!("/api/items/{item_id}"), Some(&token), None).await;
        assert_eq!(item["quantity_percent"], 60.0);
        assert_eq!(item["status"], "in_stock");

        // Over-consume: floors at zero and flips to needed.
        let (status, _) = call(
            &app,
            "POST",
            "/api/consumption-logs",
            Some(&token),
            Some(serde_json::json!({"item_id": item_id, "percent_used": 70.0})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, item) =
            call(&app, "GET", &format!("/api/items/{item_id}"), Some(&token), None).await;
        assert_eq!(item["quantity_percent"], 0.0);
        assert_eq!(item["status"], "needed");

        let (status, _) = call(
            &app,
            "POST",
            "/api/restock-logs",
            Some(&token),
            Some(serde_json::json!({"item_id": item_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, item) =
            call(&app, "GET", &format!("/api/items/{item_id}"), Some(&token), None).await;
        assert_eq!(item["quantity_percent"], 100.0);
        assert_eq!(item["status"], "in_stock");

        let (status, logs) = call(
            &app,
            "GET",
            &format!("/api/consumption-logs?item_id={item_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs.as_array().unwrap().len(), 2);
        // Newest first.
        assert_eq!(logs[0]["percent_used"], 70.0);
    }

    #[tokio::test]
    async fn consumption_rejects_out_of_range_percent() {
        let app = router(test_state());
        let (kitchen, token) = seed_user(&app).await;
        let (_, item) = call(
            &app,
            "POST",
            "/api/items",
            Some(&token),
            Some(serde_json::json!({"name": "Milk", "kitchen_id": kitchen["id"]})),
        )
        .await;
        let item_id = item["id"].as_i64().unwrap();

        let (status, body) = call(
            &app,
            "POST",
            "/api/consumption-logs",
            Some(&token),
            Some(serde_json::json!({"item_id": item_id, "percent_used": -5.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "percent_used");

        let (status, _) = call(
            &app,
            "POST",
            "/api/consumption-logs",
            Some(&token),
            Some(serde_json::json!({"item_id": item_id, "percent_used": 140.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn log_listing_requires_exactly_one_filter() {
        let app = router(test_state());
        let (_, token) = seed_user(&app).await;

        let (status, body) =
            call(&app, "GET", "/api/consumption-logs", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "missing_parameter");

        let (status, body) = call(
            &app,
            "GET",
            "/api/consumption-logs?item_id=1&user_id=1",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn quantity_patch_clamps_out_of_range_input() {
        let app = router(test_state());
        let (kitchen, token) = seed_user(&app).await;
        let (_, item) = call(
            &app,
            "POST",
            "/api/items",
            Some(&token),
            Some(serde_json::json!({"name": "Milk", "kitchen_id": kitchen["id"]})),
        )
        .await;
        let item_id = item["id"].as_i64().unwrap();

        let (status, item) = call(
            &app,
            "PATCH",
            &format!("/api/items/{item_id}/quantity"),
            Some(&token),
            Some(serde_json::json!({"quantity_percent": -10.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["quantity_percent"], 0.0);
        assert_eq!(item["status"], "needed");
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let app = router(test_state());
        let (_, token) = seed_user(&app).await;
        let (status, body) = call(&app, "GET", "/api/items/999", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn kitchen_rename_needs_token_and_keeps_code() {
        let app = router(test_state());
        let (kitchen, token) = seed_user(&app).await;
        let id = kitchen["id"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/kitchens/{id}"),
            None,
            Some(serde_json::json!({"name": "Shared Flat"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, renamed) = call(
            &app,
            "PUT",
            &format!("/api/kitchens/{id}"),
            Some(&token),
            Some(serde_json::json!({"name": "Shared Flat"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["name"], "Shared Flat");
        assert_eq!(renamed["code"], kitchen["code"]);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = router(test_state());
        let (kitchen, _) = seed_user(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "display_name": "Alice",
                "password": "Other#456",
                "kitchen_code": kitchen["code"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "conflict");
    }
}
