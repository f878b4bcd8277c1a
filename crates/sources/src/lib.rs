//! Data source implementations for discovering and fetching forecast data.
//!
//! Each upstream service gets a [`SourceAdapter`]: `discover` enumerates
//! candidate files for a time window, `fetch` pulls the bytes. Adapters are
//! stateless; deduplication against the catalog happens in the downloader.

pub mod candidate;
pub mod nhc;
pub mod storm;
pub mod synoptic;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;

use metget_common::{MetGetError, MetGetResult, Service};

pub use candidate::{Candidate, FieldCandidate, TrackCandidate, TrackProduct};

/// The cycle window a discovery pass examines.
#[derive(Debug, Clone)]
pub struct DiscoveryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Trait for upstream sources that can list and fetch files.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The service this adapter feeds.
    fn service(&self) -> Service;

    /// List candidate files available upstream for the window.
    async fn discover(&self, window: &DiscoveryWindow) -> MetGetResult<Vec<Candidate>>;

    /// Download a candidate.
    async fn fetch(&self, candidate: &Candidate) -> MetGetResult<Bytes>;
}

/// Shared HTTP GET with upstream error mapping.
pub(crate) async fn http_get(client: &Client, url: &str) -> MetGetResult<Bytes> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MetGetError::Upstream(format!("GET {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(MetGetError::Upstream(format!(
            "GET {} returned {}",
            url,
            response.status()
        )));
    }

    response
        .bytes()
        .await
        .map_err(|e| MetGetError::Upstream(format!("GET {} body read failed: {}", url, e)))
}

/// List keys in a public S3 bucket under a prefix via the HTTP listing API.
///
/// Parses the ListObjectsV2 XML with plain string scanning; NOAA open-data
/// responses are flat enough that a full XML parser buys nothing.
pub(crate) async fn list_s3_prefix(
    client: &Client,
    bucket: &str,
    prefix: &str,
) -> MetGetResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let mut url = format!(
            "https://{}.s3.amazonaws.com/?list-type=2&prefix={}",
            bucket, prefix
        );
        if let Some(t) = &token {
            url.push_str("&continuation-token=");
            url.push_str(&urlencode(t));
        }

        let body = http_get(client, &url).await?;
        let body = String::from_utf8_lossy(&body).into_owned();

        for key_match in body.split("<Key>").skip(1) {
            if let Some(end) = key_match.find("</Key>") {
                keys.push(key_match[..end].to_string());
            }
        }

        token = body
            .split("<NextContinuationToken>")
            .nth(1)
            .and_then(|s| s.find("</NextContinuationToken>").map(|end| s[..end].to_string()));
        if token.is_none() {
            break;
        }
    }

    Ok(keys)
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// Create the adapter for a service.
pub fn adapter_for(service: Service, client: Client) -> Box<dyn SourceAdapter> {
    use metget_common::ModelFamily;

    match service.family() {
        ModelFamily::Synoptic | ModelFamily::SynopticEnsemble => {
            Box::new(synoptic::SynopticSource::new(service, client))
        }
        ModelFamily::Storm | ModelFamily::StormEnsemble => {
            Box::new(storm::StormSource::new(service, client))
        }
        ModelFamily::Track => Box::new(nhc::NhcSource::new(client)),
    }
}

/// Build a default HTTP client for source adapters.
pub fn default_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(600))
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("abc-123"), "abc-123");
        assert_eq!(urlencode("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn test_adapter_registry_covers_all_services() {
        let client = Client::new();
        for svc in Service::ALL {
            let adapter = adapter_for(svc, client.clone());
            assert_eq!(adapter.service().family(), svc.family());
        }
    }
}
