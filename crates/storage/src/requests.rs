//! The request table: one row per client build request.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Row};

use metget_common::{MetGetError, MetGetResult};

/// Lifecycle states of a build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Queued,
    Running,
    Error,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Running => "running",
            RequestStatus::Error => "error",
            RequestStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> MetGetResult<Self> {
        match s {
            "queued" => Ok(RequestStatus::Queued),
            "running" => Ok(RequestStatus::Running),
            "error" => Ok(RequestStatus::Error),
            "completed" => Ok(RequestStatus::Completed),
            other => Err(MetGetError::Internal(format!(
                "Unknown request status: {}",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Error | RequestStatus::Completed)
    }
}

/// A request row snapshot.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub request_id: String,
    pub try_count: i32,
    pub status: RequestStatus,
    pub start_date: DateTime<Utc>,
    pub last_date: DateTime<Utc>,
    pub api_key: String,
    pub source_ip: String,
    pub credit_usage: i64,
    pub input_data: Value,
    pub message: Value,
}

#[derive(FromRow)]
struct RequestRowRaw {
    request_id: String,
    try_count: i32,
    status: String,
    start_date: DateTime<Utc>,
    last_date: DateTime<Utc>,
    api_key: String,
    source_ip: String,
    credit_usage: i64,
    input_data: Value,
    message: Value,
}

impl TryFrom<RequestRowRaw> for RequestRecord {
    type Error = MetGetError;

    fn try_from(raw: RequestRowRaw) -> Result<Self, Self::Error> {
        Ok(RequestRecord {
            status: RequestStatus::from_str(&raw.status)?,
            request_id: raw.request_id,
            try_count: raw.try_count,
            start_date: raw.start_date,
            last_date: raw.last_date,
            api_key: raw.api_key,
            source_ip: raw.source_ip,
            credit_usage: raw.credit_usage,
            input_data: raw.input_data,
            message: raw.message,
        })
    }
}

const COLUMNS: &str = "request_id, try AS try_count, status, start_date, last_date, \
                       api_key, source_ip, credit_usage, input_data, message";

fn db_err(e: sqlx::Error) -> MetGetError {
    MetGetError::Database(e.to_string())
}

/// Operations on the requests table.
#[derive(Clone)]
pub struct Requests {
    pool: PgPool,
}

impl Requests {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new queued request. A duplicate request id is a no-op.
    pub async fn add(
        &self,
        request_id: &str,
        api_key: &str,
        source_ip: &str,
        credit_usage: i64,
        input_data: &Value,
        message: &str,
    ) -> MetGetResult<()> {
        sqlx::query(
            "INSERT INTO requests \
             (request_id, try, status, api_key, source_ip, credit_usage, input_data, message) \
             VALUES ($1, 0, 'queued', $2, $3, $4, $5, $6) \
             ON CONFLICT (request_id) DO NOTHING",
        )
        .bind(request_id)
        .bind(api_key)
        .bind(source_ip)
        .bind(credit_usage)
        .bind(input_data)
        .bind(serde_json::json!({ "message": message }))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get(&self, request_id: &str) -> MetGetResult<Option<RequestRecord>> {
        let raw = sqlx::query_as::<_, RequestRowRaw>(&format!(
            "SELECT {} FROM requests WHERE request_id = $1",
            COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        raw.map(RequestRecord::try_from).transpose()
    }

    /// Conditionally transition a request to running, incrementing its try
    /// counter. Succeeds when the row is queued, or when a previous run has
    /// been silent longer than the visibility timeout. Returns the updated
    /// row, or None when the transition was refused (terminal row or an
    /// active run elsewhere).
    pub async fn claim_for_run(
        &self,
        request_id: &str,
        visibility_timeout_secs: i64,
    ) -> MetGetResult<Option<RequestRecord>> {
        let raw = sqlx::query_as::<_, RequestRowRaw>(&format!(
            "UPDATE requests SET status = 'running', try = try + 1, last_date = NOW() \
             WHERE request_id = $1 \
               AND (status = 'queued' \
                    OR (status = 'running' AND last_date < NOW() - ($2 * INTERVAL '1 second'))) \
             RETURNING {}",
            COLUMNS
        ))
        .bind(request_id)
        .bind(visibility_timeout_secs)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        raw.map(RequestRecord::try_from).transpose()
    }

    /// Move a request to a terminal or intermediate status with a message.
    pub async fn set_status(
        &self,
        request_id: &str,
        status: RequestStatus,
        message: &Value,
    ) -> MetGetResult<()> {
        sqlx::query(
            "UPDATE requests SET status = $2, message = $3, last_date = NOW() \
             WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Refresh last_date and progress message for a running request.
    pub async fn touch(&self, request_id: &str, message: &Value) -> MetGetResult<()> {
        sqlx::query(
            "UPDATE requests SET message = $2, last_date = NOW() WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Credit consumed by a key since the given instant, counting running
    /// and completed requests.
    pub async fn credit_used_since(
        &self,
        api_key: &str,
        since: DateTime<Utc>,
    ) -> MetGetResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(credit_usage), 0) AS used FROM requests \
             WHERE api_key = $1 AND last_date >= $2 \
               AND status IN ('completed', 'running')",
        )
        .bind(api_key)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get::<i64, _>("used"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            RequestStatus::Queued,
            RequestStatus::Running,
            RequestStatus::Error,
            RequestStatus::Completed,
        ] {
            assert_eq!(RequestStatus::from_str(s.as_str()).unwrap(), s);
        }
        assert!(RequestStatus::from_str("restore").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(RequestStatus::Error.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(!RequestStatus::Queued.is_terminal());
        assert!(!RequestStatus::Running.is_terminal());
    }
}
