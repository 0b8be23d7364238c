//! Axum-based HTTP gateway for the employee auth service.
//!
//! Routes:
//! - `POST /employee/signup`        — create an employee account
//! - `POST /employee/login`         — authenticate and get a token
//! - `POST /employee/logout`        — revoke the token's session
//! - `GET  /employee_id`            — resolve the caller's employee id
//! - `GET  /employee_id_by_email`   — directory lookup by email
//! - `GET  /health`
//!
//! The bearer token travels in a custom header (`x-token` by default), not in
//! `Authorization`. Every response body is JSON.

use crate::auth::{AuthEngine, AuthError, SignupRequest};
use crate::config::Config;
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{HeaderMap, HeaderName, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuthEngine>,
    /// Header carrying the bearer token.
    pub token_header: HeaderName,
}

/// Concrete return type for handlers (avoids `impl IntoResponse` inference issues).
type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Build the router with body limit and timeout layers.
pub fn router(state: AppState, max_body_bytes: usize, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/employee/signup", post(handle_signup))
        .route("/employee/login", post(handle_login))
        .route("/employee/logout", post(handle_logout))
        .route("/employee_id", get(handle_employee_id))
        .route("/employee_id_by_email", get(handle_employee_id_by_email))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

/// Bind and serve until `shutdown` resolves.
pub async fn run_gateway(
    config: &Config,
    engine: Arc<AuthEngine>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let host = &config.gateway.host;
    let port = config.gateway.port;
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();

    let state = AppState {
        engine,
        token_header: config.token_header()?,
    };
    let app = router(
        state,
        config.gateway.max_body_bytes,
        Duration::from_secs(config.gateway.request_timeout_secs),
    );

    tracing::info!(
        "Employee auth gateway listening on {host}:{actual_port} (token header: {})",
        config.gateway.token_header
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Map a domain failure to its status and caller-facing message.
fn error_response(error: &AuthError) -> ApiResponse {
    let status = match error {
        AuthError::DuplicateIdentity | AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::Unverifiable(_)
        | AuthError::InvalidToken
        | AuthError::SessionExpiredOrInvalid => StatusCode::UNAUTHORIZED,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::debug!(kind = error.kind(), status = status.as_u16(), "Request rejected");
    (status, Json(serde_json::json!({ "error": error.to_string() })))
}

fn bad_request(message: String) -> ApiResponse {
    error_response(&AuthError::InvalidRequest(message))
}

/// Extract the bearer token from the configured header.
fn extract_token<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn require_token<'a>(state: &AppState, headers: &'a HeaderMap) -> Result<&'a str, ApiResponse> {
    extract_token(headers, &state.token_header).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": format!("Missing {} header", state.token_header)
            })),
        )
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Request body for signup.
#[derive(Deserialize)]
struct SignupBody {
    name: String,
    email: String,
    password: String,
    role: String,
}

/// Request body for login.
#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

/// Query string for the directory lookup.
#[derive(Deserialize)]
struct EmailQuery {
    email: String,
}

/// GET /health
async fn handle_health() -> ApiResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// POST /employee/signup — create a new employee account.
async fn handle_signup(
    State(state): State<AppState>,
    body: Result<Json<SignupBody>, JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(e.body_text()),
    };

    let request = SignupRequest {
        name: body.name,
        email: body.email,
        password: body.password,
        role: body.role,
    };
    match state.engine.signup(request).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Employee created successfully" })),
        ),
        Err(e) => error_response(&e),
    }
}

/// POST /employee/login — authenticate and get a token.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(e.body_text()),
    };

    match state.engine.login(&body.email, &body.password).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "employee": outcome.name,
                "token": outcome.token,
            })),
        ),
        Err(e) => error_response(&e),
    }
}

/// POST /employee/logout — revoke the presented token.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let token = match require_token(&state, &headers) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.engine.logout(token).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Logged out successfully" })),
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /employee_id — resolve the caller from the token header.
async fn handle_employee_id(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let token = match require_token(&state, &headers) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.engine.resolve(token).await {
        Ok(employee_id) => (
            StatusCode::OK,
            Json(serde_json::json!({ "employee_id": employee_id })),
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /employee_id_by_email?email=... — directory lookup.
async fn handle_employee_id_by_email(
    State(state): State<AppState>,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> ApiResponse {
    let query = match query {
        Ok(Query(q)) => q,
        Err(e) => return bad_request(e.body_text()),
    };

    match state.engine.employee_id_by_email(&query.email).await {
        Ok(employee_id) => (
            StatusCode::OK,
            Json(serde_json::json!({ "employee_id": employee_id })),
        ),
        Err(e) => error_response(&e),
    }
}
