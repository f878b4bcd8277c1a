//! POST /check: report the state of a build request.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::ConnectInfo, http::HeaderMap, response::Response, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use metget_common::MetGetError;
use storage::{RequestStatus, StoragePath};

use crate::handlers::{authorize, ok_response, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckBody {
    pub request: String,
}

#[instrument(skip_all, fields(request_id = %body.request))]
pub async fn post_check(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<CheckBody>,
) -> Result<Response, ApiError> {
    authorize(&state, &headers, &addr).await?;

    let record = state
        .requests
        .get(&body.request)
        .await?
        .ok_or_else(|| MetGetError::RequestNotFound(body.request.clone()))?;

    let destination = if record.status == RequestStatus::Completed {
        let manifest_key = StoragePath::output(&record.request_id, "filelist.json");
        state
            .uploads
            .presign_get(&manifest_key, state.config.presign_ttl)
            .await
            .ok()
    } else {
        None
    };

    let snapshot: Value = json!({
        "request_id": record.request_id,
        "status": record.status.as_str(),
        "try_count": record.try_count,
        "start_date": record.start_date.to_rfc3339(),
        "last_date": record.last_date.to_rfc3339(),
        "credit_usage": record.credit_usage,
        "message": record.message,
        "destination": destination,
    });

    Ok(ok_response(&state, snapshot))
}
