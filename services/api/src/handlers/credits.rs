//! GET /credits: credit balance for the calling key.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::ConnectInfo, http::HeaderMap, response::Response, Extension};
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::instrument;

use crate::handlers::{authorize, ok_response, ApiError};
use crate::state::AppState;

/// Usage is reported over a trailing 30-day window of completed and
/// running requests, alongside the ledger's hard counters.
#[instrument(skip_all)]
pub async fn get_credits(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = authorize(&state, &headers, &addr).await?;

    let window_start = Utc::now() - Duration::days(30);
    let credits_used = state
        .requests
        .credit_used_since(&caller.auth.key, window_start)
        .await?;

    let (credit_limit, credit_balance) = if caller.auth.unlimited() {
        (json!(-1), json!("unlimited"))
    } else {
        (
            json!(caller.auth.credit_limit),
            json!(caller.auth.credit_limit - credits_used),
        )
    };

    Ok(ok_response(
        &state,
        json!({
            "credit_limit": credit_limit,
            "credits_used": credits_used,
            "credit_balance": credit_balance,
        }),
    ))
}
