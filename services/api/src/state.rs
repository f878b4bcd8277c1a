//! Shared application state for the API service.

use std::time::Duration;

use tokio::sync::Mutex;

use storage::{ApiKeys, Catalog, ObjectStorage, RequestQueue, Requests};

use crate::ratelimit::RateLimitState;

/// Process-wide configuration, immutable after startup.
pub struct ApiConfig {
    pub enforce_credit_limits: bool,
    pub presign_ttl: Duration,
}

/// Shared state handed to every handler.
pub struct AppState {
    pub catalog: Catalog,
    pub requests: Requests,
    pub apikeys: ApiKeys,
    pub queue: Mutex<RequestQueue>,
    pub uploads: ObjectStorage,
    pub ratelimit: RateLimitState,
    pub config: ApiConfig,
}
