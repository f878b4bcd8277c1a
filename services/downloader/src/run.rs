//! One ingestion pass: discover, dedupe, fetch, store, index.

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};

use metget_common::{MetGetResult, Service};
use sources::{
    adapter_for, default_client, Candidate, DiscoveryWindow, FieldCandidate, TrackCandidate,
    TrackProduct,
};
use storage::{
    Catalog, FieldConstraints, NewField, NewTrack, ObjectStorage, StoragePath, TrackKind,
};

/// Counters reported per pass.
#[derive(Debug, Default)]
pub struct PassStats {
    pub discovered: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A configured ingestion pass for one service.
pub struct Ingest {
    pub catalog: Catalog,
    pub store: ObjectStorage,
    pub service: Service,
    pub lookback_hours: i64,
}

impl Ingest {
    /// Run a single pass. Candidates process in ascending
    /// (cycle, valid_time, tau) order; errors mark the candidate failed
    /// and the pass continues.
    #[instrument(skip(self), fields(service = %self.service))]
    pub async fn run_once(&self) -> MetGetResult<PassStats> {
        let now = Utc::now();
        let window = DiscoveryWindow {
            start: now - Duration::hours(self.lookback_hours),
            end: now,
        };

        let adapter = adapter_for(self.service, default_client());
        let mut candidates = adapter.discover(&window).await?;
        candidates.sort_by_key(|c| c.order_key());

        let mut stats = PassStats {
            discovered: candidates.len(),
            ..Default::default()
        };

        for candidate in &candidates {
            let outcome = match candidate {
                Candidate::Field(field) => self.ingest_field(&*adapter, candidate, field).await,
                Candidate::Track(track) => self.ingest_track(&*adapter, candidate, track).await,
            };

            match outcome {
                Ok(true) => stats.fetched += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(url = %candidate.url(), error = %e, "Candidate skipped");
                }
            }
        }

        Ok(stats)
    }

    /// Returns true when the candidate was fetched and catalogued, false
    /// when it was already present.
    async fn ingest_field(
        &self,
        adapter: &dyn sources::SourceAdapter,
        candidate: &Candidate,
        field: &FieldCandidate,
    ) -> MetGetResult<bool> {
        let constraints = FieldConstraints {
            storm: field.storm.clone(),
            ensemble_member: field.ensemble_member.clone(),
        };
        if self
            .catalog
            .has_field(field.service, field.cycle, field.valid_time, &constraints)
            .await?
        {
            debug!(url = %field.url, "Already catalogued");
            return Ok(false);
        }

        let data = adapter.fetch(candidate).await?;
        let size = data.len();

        let key = StoragePath::field(
            field.service,
            field.cycle,
            &field.identity_parts(),
            field.valid_time,
        );

        // Blob lands before the row so the catalog never references a
        // missing object.
        self.store.put(&key, data).await?;
        self.catalog
            .upsert_field(&NewField {
                service: field.service,
                forecastcycle: field.cycle,
                forecasttime: field.valid_time,
                tau: field.tau,
                filepath: key.clone(),
                url: Some(field.url.clone()),
                stormname: field.storm.clone(),
                ensemble_member: field.ensemble_member.clone(),
            })
            .await?;

        info!(key = %key, size = size, "Ingested field");
        Ok(true)
    }

    /// Track files are re-issued in place; md5 decides freshness.
    async fn ingest_track(
        &self,
        adapter: &dyn sources::SourceAdapter,
        candidate: &Candidate,
        track: &TrackCandidate,
    ) -> MetGetResult<bool> {
        let data = adapter.fetch(candidate).await?;
        let digest = format!("{:x}", md5::compute(&data));

        let kind = match track.product {
            TrackProduct::BestTrack => TrackKind::BestTrack,
            TrackProduct::Forecast => TrackKind::Forecast,
        };
        let meta = sources::nhc::parse_atcf(&data)?;
        let advisory = match track.product {
            TrackProduct::BestTrack => None,
            TrackProduct::Forecast => Some(meta.advisory.clone()),
        };

        let stored = self
            .catalog
            .track_md5(
                kind,
                track.storm_year,
                &track.basin,
                track.storm,
                advisory.as_deref(),
            )
            .await?;
        if stored.as_deref() == Some(digest.as_str()) {
            debug!(url = %track.url, "Track unchanged");
            return Ok(false);
        }

        let kind_tag = match kind {
            TrackKind::BestTrack => "btk",
            TrackKind::Forecast => "fcst",
        };
        let key = StoragePath::track(
            kind_tag,
            track.storm_year,
            &track.basin,
            track.storm,
            advisory.as_deref(),
        );

        self.store.put(&key, data).await?;
        self.catalog
            .upsert_track(&NewTrack {
                kind,
                storm_year: track.storm_year,
                basin: track.basin.clone(),
                storm: track.storm,
                advisory,
                advisory_start: meta.advisory_start,
                advisory_end: meta.advisory_end,
                advisory_duration_hr: meta.advisory_duration_hr,
                filepath: key.clone(),
                md5: digest,
                geometry_data: meta.geometry_json(),
            })
            .await?;

        info!(key = %key, "Ingested track");
        Ok(true)
    }
}
