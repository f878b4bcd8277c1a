//! POST /build: validate, account credit, persist, publish.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::ConnectInfo, http::HeaderMap, response::Response, Extension, Json};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use metget_common::{MetGetError, RequestSpec};
use selection::{DomainSelection, SelectionEngine, SelectionPlan};
use storage::{RequestEnvelope, StoragePath};

use crate::handlers::{authorize, ok_response, ApiError};
use crate::state::AppState;

#[instrument(skip_all)]
pub async fn post_build(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let caller = authorize(&state, &headers, &addr).await?;

    let spec = RequestSpec::parse(&body)?;
    caller.auth.permits(&spec.services())?;

    // A client-supplied request_id doubles as an idempotency key: replays
    // return the original acceptance without debiting or publishing again.
    if let Some(client_id) = &spec.request_id {
        if let Some(existing) = state.requests.get(client_id).await? {
            let manifest_key = StoragePath::output(&existing.request_id, "filelist.json");
            let request_url = state
                .uploads
                .presign_get(&manifest_key, state.config.presign_ttl)
                .await
                .unwrap_or_default();
            return Ok(ok_response(
                &state,
                json!({
                    "request_id": existing.request_id,
                    "request_url": request_url,
                    "credit_usage": existing.credit_usage,
                    "message": "Duplicate request",
                }),
            ));
        }
    }

    // Pre-validate against the catalog. Unmatched storms and windows with
    // no data at all are rejected here; partial gaps are left for the
    // worker, whose backfill policy decides their fate.
    let engine = SelectionEngine::new(&state.catalog);
    let plan = engine.plan(&spec).await?;
    reject_if_empty(&plan)?;

    let credit_usage = spec.credit_usage();

    if spec.dry_run {
        return Ok(ok_response(
            &state,
            json!({
                "message": "Dry run successful",
                "credit_usage": credit_usage,
            }),
        ));
    }

    state
        .apikeys
        .debit(
            &caller.auth.key,
            credit_usage,
            state.config.enforce_credit_limits,
        )
        .await?;

    let request_id = spec
        .request_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Canonicalize: the worker re-parses this envelope without access to
    // the API's memory.
    let mut input_data = spec.json.clone();
    if let Some(obj) = input_data.as_object_mut() {
        obj.insert("request_id".to_string(), json!(request_id));
        obj.insert("api_key".to_string(), json!(caller.auth.key));
        obj.insert("source_ip".to_string(), json!(caller.source_ip));
    }

    state
        .requests
        .add(
            &request_id,
            &caller.auth.key,
            &caller.source_ip,
            credit_usage,
            &input_data,
            "Request queued",
        )
        .await?;

    let envelope = RequestEnvelope {
        request_id: request_id.clone(),
        spec_json: input_data,
        api_key: caller.auth.key.clone(),
        submitted_at: Utc::now(),
    };
    {
        let mut queue = state.queue.lock().await;
        queue.publish(&envelope).await?;
    }

    let manifest_key = StoragePath::output(&request_id, "filelist.json");
    let request_url = match state
        .uploads
        .presign_get(&manifest_key, state.config.presign_ttl)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            // The request is queued regardless; the client can recover the
            // URL from /check.
            warn!(error = %e, "Failed to presign request URL");
            String::new()
        }
    };

    info!(
        request_id = %request_id,
        user = %caller.auth.username,
        credit = credit_usage,
        "Accepted build request"
    );

    Ok(ok_response(
        &state,
        json!({
            "request_id": request_id,
            "request_url": request_url,
            "credit_usage": credit_usage,
        }),
    ))
}

/// A domain with zero selectable data means the request can never build.
fn reject_if_empty(plan: &SelectionPlan) -> Result<(), MetGetError> {
    for domain in &plan.domains {
        if let DomainSelection::Fields(slots) = &domain.selection {
            if slots.iter().all(|s| s.is_hole()) {
                return Err(MetGetError::Validation(format!(
                    "No data available for domain {} ({}) in the requested window",
                    domain.domain_index, domain.service
                )));
            }
        }
    }
    Ok(())
}
