//! Object storage interface for forecast fields and build outputs
//! (MinIO/S3 compatible).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::{aws::AmazonS3, aws::AmazonS3Builder, path::Path, signer::Signer, ObjectStore};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use metget_common::{MetGetError, MetGetResult, Service};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl ObjectStorageConfig {
    /// Build from environment, with the given bucket env var.
    pub fn from_env(bucket_var: &str) -> Self {
        let env = |k: &str, d: &str| std::env::var(k).unwrap_or_else(|_| d.to_string());
        Self {
            endpoint: env("METGET_S3_ENDPOINT", "http://minio:9000"),
            bucket: env(bucket_var, "metget-data"),
            access_key_id: env("METGET_S3_ACCESS_KEY", "minioadmin"),
            secret_access_key: env("METGET_S3_SECRET_KEY", "minioadmin"),
            region: env("METGET_S3_REGION", "us-east-1"),
            allow_http: env("METGET_S3_ALLOW_HTTP", "true") == "true",
        }
    }
}

/// Retry policy for storage operations: bounded attempts with exponential
/// backoff and jitter. Missing objects and permission failures are never
/// retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
        }
    }
}

fn is_fatal(err: &object_store::Error) -> bool {
    matches!(
        err,
        object_store::Error::NotFound { .. }
            | object_store::Error::InvalidPath { .. }
            | object_store::Error::AlreadyExists { .. }
            | object_store::Error::Precondition { .. }
            | object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. }
            | object_store::Error::NotSupported { .. }
    )
}

/// Object storage client.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<AmazonS3>,
    bucket: String,
    retry: RetryPolicy,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> MetGetResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| MetGetError::Storage(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn run_with_retry<T, F, Fut>(&self, what: &str, op: F) -> MetGetResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, object_store::Error>>,
    {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if is_fatal(&e) || attempt >= self.retry.max_attempts => {
                    return Err(MetGetError::Storage(format!("{}: {}", what, e)));
                }
                Err(e) => {
                    let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
                    let delay = backoff + Duration::from_millis(jitter);
                    warn!(
                        error = %e,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Storage operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    backoff = std::cmp::min(backoff * 2, self.retry.max_backoff);
                }
            }
        }
    }

    /// Write bytes to a path in the bucket. Idempotent for a given key.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> MetGetResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.run_with_retry("put", || {
            let data = data.clone();
            let location = location.clone();
            async move { self.store.put(&location, data.into()).await }
        })
        .await?;

        Ok(())
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> MetGetResult<Bytes> {
        let location = Path::from(path);

        let bytes = self
            .run_with_retry("get", || {
                let location = location.clone();
                async move {
                    let result = self.store.get(&location).await?;
                    result.bytes().await
                }
            })
            .await?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Delete an object.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn delete(&self, path: &str) -> MetGetResult<()> {
        let location = Path::from(path);

        match self.store.delete(&location).await {
            Ok(()) => Ok(()),
            // Already gone counts as deleted; retention sweeps re-run.
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(MetGetError::Storage(format!(
                "Failed to delete {}: {}",
                path, e
            ))),
        }
    }

    /// Generate a time-limited public GET URL for a path.
    pub async fn presign_get(&self, path: &str, ttl: Duration) -> MetGetResult<String> {
        let location = Path::from(path);
        let url = self
            .store
            .signed_url(http::Method::GET, &location, ttl)
            .await
            .map_err(|e| MetGetError::Storage(format!("Failed to presign {}: {}", path, e)))?;
        Ok(url.to_string())
    }
}

/// Path builder for the stable storage layout.
pub struct StoragePath;

impl StoragePath {
    /// Key for a raw forecast field:
    /// `{family}/{cycle-day}/{cycle-hour}/{identity-parts}/{valid-time}.bin`
    pub fn field(
        service: Service,
        cycle: DateTime<Utc>,
        identity_parts: &[&str],
        valid_time: DateTime<Utc>,
    ) -> String {
        let mut parts = String::new();
        for p in identity_parts {
            parts.push_str(p);
            parts.push('/');
        }
        format!(
            "{}/{}/{:02}/{}{}.bin",
            service.table(),
            cycle.format("%Y-%m-%d"),
            cycle.format("%H"),
            parts,
            valid_time.format("%Y%m%d%H%M")
        )
    }

    /// Key for a tropical track file.
    pub fn track(
        kind: &str,
        storm_year: i32,
        basin: &str,
        storm: i32,
        advisory: Option<&str>,
    ) -> String {
        match advisory {
            Some(adv) => format!(
                "nhc/{}/{}/{}/{:02}/advisory_{}.trk",
                kind, storm_year, basin, storm, adv
            ),
            None => format!("nhc/{}/{}/{}/{:02}/besttrack.trk", kind, storm_year, basin, storm),
        }
    }

    /// Key for a build output in the public upload bucket.
    pub fn output(request_id: &str, filename: &str) -> String {
        format!("{}/{}", request_id, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_field_paths() {
        let cycle = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let valid = Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap();

        assert_eq!(
            StoragePath::field(Service::GfsNcep, cycle, &[], valid),
            "gfs_ncep/2024-01-15/12/202401151800.bin"
        );
        assert_eq!(
            StoragePath::field(Service::GefsNcep, cycle, &["gep04"], valid),
            "gefs_fcst/2024-01-15/12/gep04/202401151800.bin"
        );
        assert_eq!(
            StoragePath::field(Service::HafsA, cycle, &["09l"], valid),
            "ncep_hafs_a/2024-01-15/12/09l/202401151800.bin"
        );
    }

    #[test]
    fn test_track_paths() {
        assert_eq!(
            StoragePath::track("btk", 2023, "al", 9, None),
            "nhc/btk/2023/al/09/besttrack.trk"
        );
        assert_eq!(
            StoragePath::track("fcst", 2023, "al", 9, Some("12")),
            "nhc/fcst/2023/al/09/advisory_12.trk"
        );
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            StoragePath::output("9f8e", "forcing.nc"),
            "9f8e/forcing.nc"
        );
    }
}
