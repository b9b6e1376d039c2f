use crate::gate::{bearer_token, RequestGate, Requirement};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Gate plus the requirement a route group enforces
#[derive(Clone)]
pub struct GateGuard {
    gate: RequestGate,
    requirement: Requirement,
}

impl GateGuard {
    pub fn new(gate: RequestGate, requirement: Requirement) -> Self {
        Self { gate, requirement }
    }
}

/// Admit the request or answer 401/403/503; admitted claims go into extensions
pub async fn require(State(guard): State<GateGuard>, mut request: Request, next: Next) -> Response {
    // Owned copy: the request body is not Sync, so no borrow may cross the await
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let claims = match guard
        .gate
        .authorize(token.as_deref(), &guard.requirement)
        .await
    {
        Ok(claims) => claims,
        Err(err) => {
            warn!(path = %request.uri().path(), error = err.code(), "Request rejected");
            return err.into_response();
        }
    };

    request.extensions_mut().insert(claims);
    next.run(request).await
}
