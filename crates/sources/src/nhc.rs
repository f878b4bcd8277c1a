//! NHC tropical cyclone track source.
//!
//! Best tracks come from the ATCF b-deck files, forecast tracks from the
//! a-deck OFCL lines. Track files are small and re-issued in place, so the
//! downloader dedupes on the md5 of the fetched bytes rather than on file
//! presence.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, Duration, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use metget_common::{MetGetError, MetGetResult, Service};

use crate::{
    candidate::{Candidate, TrackCandidate, TrackProduct},
    http_get,
    synoptic::parse_compact_datetime,
    DiscoveryWindow, SourceAdapter,
};

const ATCF_BASE: &str = "https://ftp.nhc.noaa.gov/atcf";
const BASINS: [&str; 2] = ["al", "ep"];
const MAX_STORM_NUMBER: i32 = 30;

/// Adapter for NHC best-track and forecast-advisory files.
pub struct NhcSource {
    client: Client,
}

impl NhcSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn head_exists(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl SourceAdapter for NhcSource {
    fn service(&self) -> Service {
        Service::Nhc
    }

    #[instrument(skip(self, window))]
    async fn discover(&self, window: &DiscoveryWindow) -> MetGetResult<Vec<Candidate>> {
        let year = window.end.year();
        let mut out = Vec::new();

        for basin in BASINS {
            for storm in 1..=MAX_STORM_NUMBER {
                let btk_url = format!("{}/btk/b{}{:02}{}.dat", ATCF_BASE, basin, storm, year);
                if !self.head_exists(&btk_url).await {
                    // Storm numbers are issued sequentially within a basin.
                    break;
                }

                out.push(Candidate::Track(TrackCandidate {
                    product: TrackProduct::BestTrack,
                    storm_year: year,
                    basin: basin.to_string(),
                    storm,
                    advisory: None,
                    issued: None,
                    url: btk_url,
                }));

                let adeck_url = format!("{}/aid_public/a{}{:02}{}.dat.gz", ATCF_BASE, basin, storm, year);
                if self.head_exists(&adeck_url).await {
                    out.push(Candidate::Track(TrackCandidate {
                        product: TrackProduct::Forecast,
                        storm_year: year,
                        basin: basin.to_string(),
                        storm,
                        advisory: None,
                        issued: None,
                        url: adeck_url,
                    }));
                }
            }
        }

        info!(count = out.len(), "NHC discovery complete");
        Ok(out)
    }

    async fn fetch(&self, candidate: &Candidate) -> MetGetResult<Bytes> {
        http_get(&self.client, candidate.url()).await
    }
}

/// Metadata extracted from an ATCF track file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMeta {
    pub advisory_start: DateTime<Utc>,
    pub advisory_end: DateTime<Utc>,
    pub advisory_duration_hr: i32,
    /// Cycle-derived advisory identifier ("%Y%m%d%H" of the newest line).
    pub advisory: String,
    pub bounds: TrackBounds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl TrackMeta {
    /// Geometry payload stored on the catalog row.
    pub fn geometry_json(&self) -> serde_json::Value {
        json!({
            "bounds": {
                "min_lat": self.bounds.min_lat,
                "max_lat": self.bounds.max_lat,
                "min_lon": self.bounds.min_lon,
                "max_lon": self.bounds.max_lon,
            }
        })
    }
}

/// Parse an ATCF deck file: advisory window, duration, and track bounds.
///
/// ATCF lines are comma-separated; field 2 is the base time (YYYYMMDDHH),
/// field 5 the lead time in hours, fields 6 and 7 latitude and longitude
/// in tenths of a degree with hemisphere suffix ("257N", "901W").
pub fn parse_atcf(data: &[u8]) -> MetGetResult<TrackMeta> {
    let text = String::from_utf8_lossy(data);

    let mut times: Vec<DateTime<Utc>> = Vec::new();
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lon = f64::MAX;
    let mut max_lon = f64::MIN;

    for line in text.lines() {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 8 {
            continue;
        }

        let Some(base) = parse_compact_datetime(fields[2]) else {
            continue;
        };
        let lead: i64 = fields[5].parse().unwrap_or(0);
        times.push(base + Duration::hours(lead));

        if let Some(lat) = parse_atcf_coordinate(fields[6]) {
            min_lat = min_lat.min(lat);
            max_lat = max_lat.max(lat);
        }
        if let Some(lon) = parse_atcf_coordinate(fields[7]) {
            min_lon = min_lon.min(lon);
            max_lon = max_lon.max(lon);
        }
    }

    if times.is_empty() {
        return Err(MetGetError::Upstream(
            "ATCF file contained no parseable track lines".to_string(),
        ));
    }

    let start = *times.iter().min().unwrap();
    let end = *times.iter().max().unwrap();

    Ok(TrackMeta {
        advisory_start: start,
        advisory_end: end,
        advisory_duration_hr: (end - start).num_hours() as i32,
        advisory: end.format("%Y%m%d%H").to_string(),
        bounds: TrackBounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        },
    })
}

/// Parse an ATCF coordinate like "257N" or "901W" into signed degrees.
fn parse_atcf_coordinate(field: &str) -> Option<f64> {
    if field.len() < 2 {
        return None;
    }
    let (digits, hemisphere) = field.split_at(field.len() - 1);
    let tenths: f64 = digits.parse().ok()?;
    let value = tenths / 10.0;
    match hemisphere {
        "N" => Some(value),
        "S" => Some(-value),
        "E" => Some(value),
        "W" => Some(-value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = "\
AL, 09, 2023082912,   , BEST,   0, 257N,  901W,  95,  961, HU\n\
AL, 09, 2023082918,   , BEST,   0, 266N,  898W, 105,  952, HU\n\
AL, 09, 2023083000,   , BEST,   0, 278N,  890W, 110,  949, HU\n";

    #[test]
    fn test_parse_atcf_window_and_bounds() {
        let meta = parse_atcf(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            meta.advisory_start,
            Utc.with_ymd_and_hms(2023, 8, 29, 12, 0, 0).unwrap()
        );
        assert_eq!(
            meta.advisory_end,
            Utc.with_ymd_and_hms(2023, 8, 30, 0, 0, 0).unwrap()
        );
        assert_eq!(meta.advisory_duration_hr, 12);
        assert_eq!(meta.advisory, "2023083000");
        assert!((meta.bounds.min_lat - 25.7).abs() < 1e-9);
        assert!((meta.bounds.max_lat - 27.8).abs() < 1e-9);
        assert!((meta.bounds.min_lon - -90.1).abs() < 1e-9);
        assert!((meta.bounds.max_lon - -89.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_atcf_forecast_leads() {
        let sample = "\
AL, 09, 2023082912, 03, OFCL,   0, 257N,  901W\n\
AL, 09, 2023082912, 03, OFCL,  12, 266N,  898W\n\
AL, 09, 2023082912, 03, OFCL, 120, 330N,  820W\n";
        let meta = parse_atcf(sample.as_bytes()).unwrap();
        assert_eq!(meta.advisory_duration_hr, 120);
    }

    #[test]
    fn test_parse_atcf_rejects_empty() {
        assert!(parse_atcf(b"no, track, data").is_err());
    }

    #[test]
    fn test_coordinate_parsing() {
        assert_eq!(parse_atcf_coordinate("257N"), Some(25.7));
        assert_eq!(parse_atcf_coordinate("901W"), Some(-90.1));
        assert_eq!(parse_atcf_coordinate("50S"), Some(-5.0));
        assert_eq!(parse_atcf_coordinate(""), None);
        assert_eq!(parse_atcf_coordinate("abcX"), None);
    }

    #[test]
    fn test_geometry_json_shape() {
        let meta = parse_atcf(SAMPLE.as_bytes()).unwrap();
        let geometry = meta.geometry_json();
        assert!(geometry["bounds"]["min_lat"].is_number());
        assert!(geometry["bounds"]["max_lon"].is_number());
    }
}
