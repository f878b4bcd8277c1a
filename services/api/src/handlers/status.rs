//! GET /status: catalog coverage snapshot per service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query},
    http::HeaderMap,
    response::Response,
    Extension,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::instrument;

use metget_common::Service;

use crate::handlers::{authorize, ok_response, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Service name, or "all" (default).
    pub service: Option<String>,
    /// Older alias for `service`.
    pub model: Option<String>,
    /// Days of history to report.
    pub limit: Option<i64>,
}

#[instrument(skip_all)]
pub async fn get_status(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    authorize(&state, &headers, &addr).await?;

    let limit_days = query.limit.unwrap_or(7).clamp(1, 60);
    let since = Utc::now() - Duration::days(limit_days);

    let selected = query.service.as_deref().or(query.model.as_deref());
    let services: Vec<Service> = match selected {
        None | Some("all") => Service::ALL
            .into_iter()
            .filter(|s| !s.is_track())
            .collect(),
        Some(name) => vec![Service::from_name(name)?],
    };

    let mut body = Map::new();
    for service in services {
        if service.is_track() {
            continue;
        }
        let coverage = state.catalog.cycle_coverage(service, Some(since)).await?;

        let cycles: Vec<Value> = coverage
            .iter()
            .map(|c| {
                json!({
                    "cycle": c.cycle.to_rfc3339(),
                    "max_tau": c.max_tau,
                    "complete": c.max_tau >= service.nominal_horizon(),
                })
            })
            .collect();

        let latest_complete = coverage
            .iter()
            .find(|c| c.max_tau >= service.nominal_horizon())
            .map(|c| c.cycle.to_rfc3339());

        body.insert(
            service.name().to_string(),
            json!({
                "min_forecast_date": coverage.last().map(|c| c.cycle.to_rfc3339()),
                "max_forecast_date": coverage.first().map(|c| c.cycle.to_rfc3339()),
                "latest_complete_cycle": latest_complete,
                "cycles": cycles,
            }),
        );
    }

    Ok(ok_response(&state, Value::Object(body)))
}
