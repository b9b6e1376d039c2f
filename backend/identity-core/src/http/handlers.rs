use super::AppState;
use crate::error::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use crypto_core::SessionClaims;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendOtpRequest>,
) -> Result<Json<Value>> {
    state.login.otp().send(&body.phone).await?;
    Ok(Json(json!({ "message": "OTP sent" })))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<Value>> {
    let outcome = state.login.verify_otp(&body.phone, &body.code).await?;

    let response = if outcome.two_factor_required {
        json!({
            "2fa_required": true,
            "temp_token": outcome.token,
            "expires_in": outcome.expires_in,
        })
    } else {
        json!({
            "token": outcome.token,
            "expires_in": outcome.expires_in,
        })
    };

    Ok(Json(response))
}

/// Returns the provisioning QR code as PNG
pub async fn setup_two_factor(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Response> {
    let enrollment = state.login.second_factor().enroll(claims.user_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], enrollment.qr_png).into_response())
}

pub async fn enable_two_factor(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<Value>> {
    let backup_codes = state
        .login
        .second_factor()
        .enable(claims.user_id, &body.code)
        .await?;

    Ok(Json(json!({
        "message": "2FA enabled",
        "backup_codes": backup_codes,
    })))
}

pub async fn verify_two_factor(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<Value>> {
    let issued = state.login.verify_second_factor(&claims, &body.code).await?;
    Ok(Json(json!({
        "token": issued.token,
        "expires_in": issued.expires_in,
    })))
}

pub async fn recover(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<Value>> {
    let issued = state.login.recover(&claims, &body.code).await?;
    Ok(Json(json!({
        "token": issued.token,
        "expires_in": issued.expires_in,
    })))
}

pub async fn protected(Extension(claims): Extension<SessionClaims>) -> Json<Value> {
    Json(json!({
        "message": "Access granted",
        "user_id": claims.user_id,
    }))
}
