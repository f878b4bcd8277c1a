//! HTTP handlers and router for the intake API.

pub mod build;
pub mod check;
pub mod credits;
pub mod health;
pub mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;

use metget_common::MetGetError;
use storage::AuthInfo;

use crate::ratelimit::Throttled;
use crate::state::AppState;

/// Error wrapper rendered as the API's JSON error envelope. Throttled
/// requests additionally carry the Retry-After delay.
pub struct ApiError {
    error: MetGetError,
    retry_after_secs: Option<u64>,
}

impl From<MetGetError> for ApiError {
    fn from(error: MetGetError) -> Self {
        ApiError {
            error,
            retry_after_secs: None,
        }
    }
}

impl From<Throttled> for ApiError {
    fn from(throttled: Throttled) -> Self {
        ApiError {
            error: MetGetError::RateLimited,
            retry_after_secs: Some(throttled.retry_after_secs),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "statusCode": status.as_u16(),
            "body": { "message": format!("ERROR: {}", self.error) },
        });

        let mut headers = HeaderMap::new();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = secs.to_string().parse() {
                headers.insert("Retry-After", value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Client identity attached to an authorized request.
pub struct Caller {
    pub auth: AuthInfo,
    pub source_ip: String,
}

/// Resolve the caller: rate limit, then authorize the x-api-key header.
pub async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    addr: &SocketAddr,
) -> Result<Caller, ApiError> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let source_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string());

    let limiter_key = if api_key.is_empty() {
        format!("ip:{}", source_ip)
    } else {
        format!("key:{}", api_key)
    };
    state.ratelimit.check(&limiter_key)?;

    let auth = state.apikeys.authorize(&api_key).await?;
    Ok(Caller { auth, source_ip })
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/build", post(build::post_build))
        .route("/check", post(check::post_check))
        .route("/credits", get(credits::get_credits))
        .route("/healthz/live", get(health::live))
        .route("/healthz/ready", get(health::ready))
        .layer(Extension(state))
}

/// Wrap a success payload in the response envelope with rate headers.
pub fn ok_response(state: &AppState, body: serde_json::Value) -> Response {
    let envelope = json!({ "statusCode": 200, "body": body });
    (StatusCode::OK, state.ratelimit.headers(), Json(envelope)).into_response()
}
