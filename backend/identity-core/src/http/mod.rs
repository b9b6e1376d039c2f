/// Thin HTTP surface over the core
///
/// Public:
/// - `POST /api/auth/otp/send`, `POST /api/auth/otp/verify`, `GET /api/health`
///
/// Temporary token (second factor pending):
/// - `POST /api/auth/2fa/verify`, `POST /api/auth/2fa/recover`
///
/// Full token:
/// - `POST /api/auth/2fa/setup` (image/png), `POST /api/auth/2fa/enable`,
///   `GET /api/protected`
mod handlers;
mod middleware;

pub use middleware::GateGuard;

use crate::gate::{RequestGate, Requirement};
use crate::services::LoginService;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub login: LoginService,
    pub gate: RequestGate,
}

/// Build the HTTP router with all endpoints
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let pending = Router::new()
        .route("/api/auth/2fa/verify", post(handlers::verify_two_factor))
        .route("/api/auth/2fa/recover", post(handlers::recover))
        .route_layer(from_fn_with_state(
            GateGuard::new(state.gate.clone(), Requirement::SecondFactorPending),
            middleware::require,
        ));

    let authenticated = Router::new()
        .route("/api/auth/2fa/setup", post(handlers::setup_two_factor))
        .route("/api/auth/2fa/enable", post(handlers::enable_two_factor))
        .route("/api/protected", get(handlers::protected))
        .route_layer(from_fn_with_state(
            GateGuard::new(state.gate.clone(), Requirement::Authenticated),
            middleware::require,
        ));

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/auth/otp/send", post(handlers::send_otp))
        .route("/api/auth/otp/verify", post(handlers::verify_otp))
        .merge(pending)
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_http_server<S>(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting HTTP API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
