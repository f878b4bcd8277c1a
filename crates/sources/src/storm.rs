//! Storm-scoped model sources: HWRF, HAFS-A/B, COAMPS-TC, and the CTCX
//! storm ensemble.
//!
//! These models spin up one run per active storm per cycle; the storm
//! identifier is parsed from the object key (e.g. "09l" in
//! "09l.2024011512.hfsa.parent.atm.f012.grb2").

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use tracing::{debug, info, instrument};

use metget_common::{time::cycles_in_window, MetGetResult, Service};

use crate::{
    candidate::{Candidate, FieldCandidate},
    http_get, list_s3_prefix, DiscoveryWindow, SourceAdapter,
};

struct StormLayout {
    bucket: &'static str,
    /// Prefix template with {date} and {cycle} placeholders.
    prefix: &'static str,
    /// Marker preceding the forecast-hour digits.
    fhr_marker: &'static str,
    fhr_digits: usize,
    must_contain: &'static str,
    max_tau: i32,
}

fn layout(service: Service) -> StormLayout {
    match service {
        Service::HafsA => StormLayout {
            bucket: "noaa-nws-hafs-pds",
            prefix: "hfsa/{date}/{cycle}/",
            fhr_marker: ".parent.atm.f",
            fhr_digits: 3,
            must_contain: ".parent.atm.f",
            max_tau: 126,
        },
        Service::HafsB => StormLayout {
            bucket: "noaa-nws-hafs-pds",
            prefix: "hfsb/{date}/{cycle}/",
            fhr_marker: ".parent.atm.f",
            fhr_digits: 3,
            must_contain: ".parent.atm.f",
            max_tau: 126,
        },
        Service::Hwrf => StormLayout {
            bucket: "noaa-nws-hwrf-pds",
            prefix: "hwrf.{date}{cycle}/",
            fhr_marker: ".hwrfprs.storm.0p015.f",
            fhr_digits: 3,
            must_contain: ".hwrfprs.storm.0p015.f",
            max_tau: 126,
        },
        Service::CoampsTc => StormLayout {
            bucket: "coamps-tc-data",
            prefix: "deterministic/realtime/{date}{cycle}/",
            fhr_marker: "_tau",
            fhr_digits: 3,
            must_contain: "_tau",
            max_tau: 126,
        },
        Service::Ctcx => StormLayout {
            bucket: "coamps-tc-data",
            prefix: "ensemble/realtime/{date}{cycle}/",
            fhr_marker: "_tau",
            fhr_digits: 3,
            must_contain: "_tau",
            max_tau: 126,
        },
        other => panic!("{} is not a storm-scoped service", other),
    }
}

/// Adapter for storm-scoped models on S3.
pub struct StormSource {
    service: Service,
    client: Client,
}

impl StormSource {
    pub fn new(service: Service, client: Client) -> Self {
        Self { service, client }
    }

    fn candidate_from_key(
        &self,
        layout: &StormLayout,
        cycle: DateTime<Utc>,
        key: &str,
    ) -> Option<FieldCandidate> {
        if !key.contains(layout.must_contain) || key.ends_with(".idx") {
            return None;
        }

        let filename = key.rsplit('/').next()?;
        let tau = crate::synoptic::parse_digits_after(filename, layout.fhr_marker, layout.fhr_digits)?;
        if tau > layout.max_tau {
            return None;
        }

        let storm = parse_storm_id(filename)?;

        // CTCX file names carry the member between storm and cycle:
        // "09l_e03_2024011512_tau003_...".
        let ensemble_member = if self.service.requires_ensemble_member() {
            Some(
                filename
                    .split('_')
                    .nth(1)
                    .filter(|m| m.starts_with('e'))?
                    .to_string(),
            )
        } else {
            None
        };

        Some(FieldCandidate {
            service: self.service,
            cycle,
            valid_time: cycle + Duration::hours(tau as i64),
            tau,
            url: format!("https://{}.s3.amazonaws.com/{}", layout.bucket, key),
            storm: Some(storm),
            ensemble_member,
        })
    }
}

#[async_trait]
impl SourceAdapter for StormSource {
    fn service(&self) -> Service {
        self.service
    }

    #[instrument(skip(self, window), fields(service = %self.service))]
    async fn discover(&self, window: &DiscoveryWindow) -> MetGetResult<Vec<Candidate>> {
        let layout = layout(self.service);
        let mut out = Vec::new();

        for cycle in cycles_in_window(self.service.cycles(), window.start, window.end) {
            let prefix = layout
                .prefix
                .replace("{date}", &cycle.format("%Y%m%d").to_string())
                .replace("{cycle}", &cycle.format("%H").to_string());

            let keys = list_s3_prefix(&self.client, layout.bucket, &prefix).await?;
            debug!(prefix = %prefix, count = keys.len(), "Listed cycle prefix");

            for key in keys {
                if let Some(candidate) = self.candidate_from_key(&layout, cycle, &key) {
                    out.push(Candidate::Field(candidate));
                }
            }
        }

        out.sort_by_key(|c| c.order_key());
        out.dedup_by_key(|c| c.url().to_string());
        info!(service = %self.service, count = out.len(), "Discovery complete");
        Ok(out)
    }

    async fn fetch(&self, candidate: &Candidate) -> MetGetResult<Bytes> {
        http_get(&self.client, candidate.url()).await
    }
}

/// Parse a storm identifier ("09l", "14e") from the front of a file name.
fn parse_storm_id(filename: &str) -> Option<String> {
    let head = filename.split(['.', '_']).next()?;
    if head.len() == 3
        && head[..2].chars().all(|c| c.is_ascii_digit())
        && head[2..].chars().all(|c| c.is_ascii_lowercase())
    {
        Some(head.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_storm_id() {
        assert_eq!(parse_storm_id("09l.2024011512.hfsa.parent.atm.f012.grb2"), Some("09l".to_string()));
        assert_eq!(parse_storm_id("14e_e03_2024011512_tau003"), Some("14e".to_string()));
        assert_eq!(parse_storm_id("gfs.t12z.pgrb2.0p25.f006"), None);
    }

    #[test]
    fn test_hafs_candidate() {
        let source = StormSource::new(Service::HafsA, Client::new());
        let layout = layout(Service::HafsA);
        let cycle = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        let c = source
            .candidate_from_key(
                &layout,
                cycle,
                "hfsa/20240115/12/09l.2024011512.hfsa.parent.atm.f012.grb2",
            )
            .unwrap();
        assert_eq!(c.storm.as_deref(), Some("09l"));
        assert_eq!(c.tau, 12);
        assert!(c.ensemble_member.is_none());
    }

    #[test]
    fn test_ctcx_member() {
        let source = StormSource::new(Service::Ctcx, Client::new());
        let layout = layout(Service::Ctcx);
        let cycle = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        let c = source
            .candidate_from_key(
                &layout,
                cycle,
                "ensemble/realtime/2024011512/09l_e03_2024011512_tau003_fields.nc",
            )
            .unwrap();
        assert_eq!(c.ensemble_member.as_deref(), Some("e03"));
        assert_eq!(c.tau, 3);
    }

    #[test]
    fn test_non_matching_key_skipped() {
        let source = StormSource::new(Service::HafsA, Client::new());
        let layout = layout(Service::HafsA);
        let cycle = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert!(source
            .candidate_from_key(&layout, cycle, "hfsa/20240115/12/09l.stats.txt")
            .is_none());
    }
}
