//! Synoptic model sources on the NOAA open-data S3 buckets, plus the WPC
//! precipitation product on its HTTP server.
//!
//! Discovery lists one prefix per candidate cycle and parses cycle, lead
//! time, and (for GEFS) the ensemble member out of the object key.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use tracing::{debug, info, instrument};

use metget_common::{time::cycles_in_window, MetGetResult, Service};

use crate::{
    candidate::{Candidate, FieldCandidate},
    http_get, list_s3_prefix, DiscoveryWindow, SourceAdapter,
};

/// Upstream layout for one synoptic service.
struct Layout {
    bucket: &'static str,
    /// Prefix template with {date} (YYYYMMDD) and {cycle} (HH) placeholders.
    prefix: &'static str,
    /// Marker preceding the forecast-hour digits in the file name.
    fhr_marker: &'static str,
    fhr_digits: usize,
    /// Substring every wanted key must contain; filters index files and
    /// other resolutions out of the listing.
    must_contain: &'static str,
    max_tau: i32,
}

fn layout(service: Service) -> Layout {
    match service {
        Service::GfsNcep => Layout {
            bucket: "noaa-gfs-bdp-pds",
            prefix: "gfs.{date}/{cycle}/atmos/",
            fhr_marker: ".pgrb2.0p25.f",
            fhr_digits: 3,
            must_contain: ".pgrb2.0p25.f",
            max_tau: 384,
        },
        Service::NamNcep => Layout {
            bucket: "noaa-nam-pds",
            prefix: "nam.{date}/",
            fhr_marker: ".awphys",
            fhr_digits: 2,
            must_contain: ".awphys",
            max_tau: 84,
        },
        Service::HrrrNcep => Layout {
            bucket: "noaa-hrrr-bdp-pds",
            prefix: "hrrr.{date}/conus/",
            fhr_marker: ".wrfsfcf",
            fhr_digits: 2,
            must_contain: ".wrfsfcf",
            max_tau: 48,
        },
        Service::HrrrAlaskaNcep => Layout {
            bucket: "noaa-hrrr-bdp-pds",
            prefix: "hrrr.{date}/alaska/",
            fhr_marker: ".wrfsfcf",
            fhr_digits: 2,
            must_contain: ".wrfsfcf",
            max_tau: 48,
        },
        Service::GefsNcep => Layout {
            bucket: "noaa-gefs-pds",
            prefix: "gefs.{date}/{cycle}/atmos/pgrb2ap5/",
            fhr_marker: ".pgrb2a.0p50.f",
            fhr_digits: 3,
            must_contain: ".pgrb2a.0p50.f",
            max_tau: 240,
        },
        Service::WpcNcep => Layout {
            bucket: "",
            prefix: "",
            fhr_marker: "f",
            fhr_digits: 3,
            must_contain: "p06m_",
            max_tau: 162,
        },
        other => panic!("{} is not a synoptic service", other),
    }
}

/// Adapter for NCEP synoptic models (and GEFS members) on open-data S3,
/// with a WPC special case on its HTTP directory server.
pub struct SynopticSource {
    service: Service,
    client: Client,
}

impl SynopticSource {
    pub fn new(service: Service, client: Client) -> Self {
        Self { service, client }
    }

    fn candidate_from_key(
        &self,
        layout: &Layout,
        cycle: DateTime<Utc>,
        key: &str,
    ) -> Option<FieldCandidate> {
        if !key.contains(layout.must_contain) || key.ends_with(".idx") {
            return None;
        }

        let filename = key.rsplit('/').next()?;
        let tau = parse_digits_after(filename, layout.fhr_marker, layout.fhr_digits)?;
        if tau > layout.max_tau {
            return None;
        }

        // NAM publishes several same-named cycles per day under one date
        // prefix; keep only keys for the cycle being examined.
        let cycle_tag = format!("t{:02}z", cycle.format("%H"));
        if !filename.contains(&cycle_tag) && self.service != Service::WpcNcep {
            return None;
        }

        let ensemble_member = if self.service.requires_ensemble_member() {
            // GEFS keys look like "gep04.t00z.pgrb2a.0p50.f012"
            Some(filename.split('.').next()?.to_string())
        } else {
            None
        };

        Some(FieldCandidate {
            service: self.service,
            cycle,
            valid_time: cycle + Duration::hours(tau as i64),
            tau,
            url: format!("https://{}.s3.amazonaws.com/{}", layout.bucket, key),
            storm: None,
            ensemble_member,
        })
    }

    async fn discover_s3(&self, window: &DiscoveryWindow) -> MetGetResult<Vec<Candidate>> {
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

    /// WPC QPF lives on an HTTP server with an HTML index; candidates come
    /// from the anchor list.
    async fn discover_wpc(&self, window: &DiscoveryWindow) -> MetGetResult<Vec<Candidate>> {
        const BASE: &str = "https://ftp.wpc.ncep.noaa.gov/2p5km_qpf";

        let body = http_get(&self.client, &format!("{}/", BASE)).await?;
        let body = String::from_utf8_lossy(&body).into_owned();

        let mut out = Vec::new();
        for line in body.lines() {
            let Some(name) = extract_href(line) else {
                continue;
            };
            // File names look like "p06m_2024010100f024.grb"
            if !name.starts_with("p06m_") || !name.ends_with(".grb") {
                continue;
            }
            let stamp = &name[5..];
            let Some(cycle) = parse_compact_datetime(&stamp[..10.min(stamp.len())]) else {
                continue;
            };
            let Some(tau) = parse_digits_after(name, "f", 3) else {
                continue;
            };
            if cycle < window.start || cycle > window.end || tau > layout(self.service).max_tau {
                continue;
            }
            out.push(Candidate::Field(FieldCandidate {
                service: self.service,
                cycle,
                valid_time: cycle + Duration::hours(tau as i64),
                tau,
                url: format!("{}/{}", BASE, name),
                storm: None,
                ensemble_member: None,
            }));
        }

        out.sort_by_key(|c| c.order_key());
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for SynopticSource {
    fn service(&self) -> Service {
        self.service
    }

    #[instrument(skip(self, window), fields(service = %self.service))]
    async fn discover(&self, window: &DiscoveryWindow) -> MetGetResult<Vec<Candidate>> {
        match self.service {
            Service::WpcNcep => self.discover_wpc(window).await,
            _ => self.discover_s3(window).await,
        }
    }

    async fn fetch(&self, candidate: &Candidate) -> MetGetResult<Bytes> {
        http_get(&self.client, candidate.url()).await
    }
}

/// Parse `digits` decimal digits following the last occurrence of `marker`.
pub(crate) fn parse_digits_after(name: &str, marker: &str, digits: usize) -> Option<i32> {
    let pos = name.rfind(marker)?;
    let start = pos + marker.len();
    let slice = name.get(start..start + digits)?;
    slice.parse::<i32>().ok()
}

/// Parse a "YYYYMMDDHH" timestamp.
pub(crate) fn parse_compact_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.len() < 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(&s[..8], "%Y%m%d").ok()?;
    let hour: u32 = s[8..10].parse().ok()?;
    Some(date.and_hms_opt(hour, 0, 0)?.and_utc())
}

/// Pull the target of the first href attribute on an HTML index line.
pub(crate) fn extract_href(line: &str) -> Option<&str> {
    let start = line.find("href=\"")? + 6;
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_digits_after() {
        assert_eq!(
            parse_digits_after("gfs.t12z.pgrb2.0p25.f006", ".pgrb2.0p25.f", 3),
            Some(6)
        );
        assert_eq!(
            parse_digits_after("hrrr.t00z.wrfsfcf18.grib2", ".wrfsfcf", 2),
            Some(18)
        );
        assert_eq!(parse_digits_after("no-marker-here", ".f", 3), None);
    }

    #[test]
    fn test_parse_compact_datetime() {
        assert_eq!(
            parse_compact_datetime("2024011512"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
        );
        assert_eq!(parse_compact_datetime("20240115"), None);
    }

    #[test]
    fn test_extract_href() {
        assert_eq!(
            extract_href("<a href=\"p06m_2024010100f024.grb\">link</a>"),
            Some("p06m_2024010100f024.grb")
        );
        assert_eq!(extract_href("plain text"), None);
    }

    #[test]
    fn test_gfs_candidate_from_key() {
        let source = SynopticSource::new(Service::GfsNcep, Client::new());
        let layout = layout(Service::GfsNcep);
        let cycle = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        let candidate = source
            .candidate_from_key(
                &layout,
                cycle,
                "gfs.20240115/12/atmos/gfs.t12z.pgrb2.0p25.f006",
            )
            .unwrap();
        assert_eq!(candidate.tau, 6);
        assert_eq!(
            candidate.valid_time,
            Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
        );
        assert!(candidate.ensemble_member.is_none());

        // Index sidecars and other cycles are skipped
        assert!(source
            .candidate_from_key(
                &layout,
                cycle,
                "gfs.20240115/12/atmos/gfs.t12z.pgrb2.0p25.f006.idx"
            )
            .is_none());
        assert!(source
            .candidate_from_key(
                &layout,
                cycle,
                "gfs.20240115/12/atmos/gfs.t06z.pgrb2.0p25.f006"
            )
            .is_none());
    }

    #[test]
    fn test_gefs_member_parsed() {
        let source = SynopticSource::new(Service::GefsNcep, Client::new());
        let layout = layout(Service::GefsNcep);
        let cycle = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        let candidate = source
            .candidate_from_key(
                &layout,
                cycle,
                "gefs.20240115/00/atmos/pgrb2ap5/gep04.t00z.pgrb2a.0p50.f012",
            )
            .unwrap();
        assert_eq!(candidate.ensemble_member.as_deref(), Some("gep04"));
        assert_eq!(candidate.tau, 12);
    }
}
