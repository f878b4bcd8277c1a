//! API key authorization and the credit ledger.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use metget_common::{MetGetError, MetGetResult, Service};

/// The result of authorizing an API key.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub key: String,
    pub username: String,
    pub credit_limit: i64,
    pub credit_used: i64,
    pub enabled: bool,
    pub expiration: Option<DateTime<Utc>>,
    /// Per-key service allow-list from the permissions JSON; None means
    /// all services are permitted.
    pub allowed_services: Option<Vec<String>>,
}

impl AuthInfo {
    pub fn unlimited(&self) -> bool {
        self.credit_limit < 0
    }

    pub fn remaining(&self) -> i64 {
        if self.unlimited() {
            i64::MAX
        } else {
            (self.credit_limit - self.credit_used).max(0)
        }
    }

    /// Check the allow-list against the services a request uses.
    pub fn permits(&self, services: &[Service]) -> MetGetResult<()> {
        if let Some(allowed) = &self.allowed_services {
            for svc in services {
                if !allowed.iter().any(|a| a == svc.name()) {
                    return Err(MetGetError::Forbidden(format!(
                        "API key is not permitted to use service '{}'",
                        svc
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(FromRow)]
struct ApiKeyRow {
    key: String,
    username: String,
    credit_limit: i64,
    credit_used: i64,
    enabled: bool,
    expiration: Option<DateTime<Utc>>,
    permissions: Option<Value>,
}

fn db_err(e: sqlx::Error) -> MetGetError {
    MetGetError::Database(e.to_string())
}

/// Operations on the apikeys table.
#[derive(Clone)]
pub struct ApiKeys {
    pool: PgPool,
}

impl ApiKeys {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Authorize an API key: it must exist, be enabled, and be unexpired.
    pub async fn authorize(&self, key: &str) -> MetGetResult<AuthInfo> {
        if key.is_empty() {
            return Err(MetGetError::Unauthorized);
        }

        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT key, username, credit_limit, credit_used, enabled, expiration, permissions \
             FROM apikeys WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(MetGetError::Unauthorized)?;

        if !row.enabled {
            return Err(MetGetError::Unauthorized);
        }
        if let Some(expiration) = row.expiration {
            if expiration < Utc::now() {
                return Err(MetGetError::Unauthorized);
            }
        }

        let allowed_services = row.permissions.as_ref().and_then(|p| {
            p.get("services").and_then(Value::as_array).map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_string())
                    .collect()
            })
        });

        Ok(AuthInfo {
            key: row.key,
            username: row.username,
            credit_limit: row.credit_limit,
            credit_used: row.credit_used,
            enabled: row.enabled,
            expiration: row.expiration,
            allowed_services,
        })
    }

    /// Atomically debit credit from a key. The update only applies when the
    /// key is unlimited or the debit fits within the remaining balance, so
    /// concurrent requests can never push usage past the limit.
    ///
    /// When enforcement is disabled the ledger is left untouched.
    pub async fn debit(&self, key: &str, amount: i64, enforce: bool) -> MetGetResult<()> {
        if !enforce {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE apikeys SET credit_used = credit_used + $2 \
             WHERE key = $1 AND (credit_limit < 0 OR credit_used + $2 <= credit_limit)",
        )
        .bind(key)
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Refused: report the remaining balance for the error.
        let auth = self.authorize(key).await?;
        Err(MetGetError::CreditDenied {
            requested: amount,
            remaining: auth.remaining(),
        })
    }
}
