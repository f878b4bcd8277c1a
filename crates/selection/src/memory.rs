//! In-memory catalog used to exercise the engine without a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use metget_common::{MetGetResult, Service};
use storage::{FieldConstraints, FieldRow, TrackRow};

use crate::CatalogReader;

#[derive(Debug, Clone)]
struct StoredField {
    service: Service,
    row: FieldRow,
    storm: Option<String>,
    member: Option<String>,
}

/// A catalog held in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    fields: Vec<StoredField>,
    tracks: Vec<TrackRow>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field row; the storage key is derived from identity so plans
    /// are easy to assert against.
    pub fn add_field(&mut self, service: Service, cycle: DateTime<Utc>, tau: i64) -> &mut Self {
        self.add_field_full(service, cycle, tau, None, None)
    }

    pub fn add_field_full(
        &mut self,
        service: Service,
        cycle: DateTime<Utc>,
        tau: i64,
        storm: Option<&str>,
        member: Option<&str>,
    ) -> &mut Self {
        let forecasttime = cycle + Duration::hours(tau);
        let filepath = format!(
            "{}/{}/f{:03}{}{}",
            service.table(),
            cycle.format("%Y%m%d%H"),
            tau,
            storm.map(|s| format!("/{}", s)).unwrap_or_default(),
            member.map(|m| format!("/{}", m)).unwrap_or_default(),
        );
        self.fields.push(StoredField {
            service,
            row: FieldRow {
                forecastcycle: cycle,
                forecasttime,
                tau: tau as i32,
                filepath,
            },
            storm: storm.map(str::to_string),
            member: member.map(str::to_string),
        });
        self
    }

    pub fn add_track(&mut self, row: TrackRow) -> &mut Self {
        self.tracks.push(row);
        self
    }

    fn matching<'a>(
        &'a self,
        service: Service,
        constraints: &'a FieldConstraints,
    ) -> impl Iterator<Item = &'a StoredField> {
        self.fields.iter().filter(move |f| {
            f.service == service
                && constraints
                    .storm
                    .as_ref()
                    .map(|s| f.storm.as_ref() == Some(s))
                    .unwrap_or(true)
                && constraints
                    .ensemble_member
                    .as_ref()
                    .map(|m| f.member.as_ref() == Some(m))
                    .unwrap_or(true)
        })
    }
}

fn sorted(mut rows: Vec<FieldRow>) -> Vec<FieldRow> {
    rows.sort_by(|a, b| {
        (a.forecasttime, a.tau, a.filepath.as_str())
            .cmp(&(b.forecasttime, b.tau, b.filepath.as_str()))
    });
    rows
}

#[async_trait]
impl CatalogReader for MemoryCatalog {
    async fn fields_in_window(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>> {
        Ok(sorted(
            self.matching(service, constraints)
                .filter(|f| {
                    f.row.forecasttime >= start
                        && f.row.forecasttime <= end
                        && f.row.tau >= tau_floor
                })
                .map(|f| f.row.clone())
                .collect(),
        ))
    }

    async fn fields_for_cycle(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        cycle: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>> {
        Ok(sorted(
            self.matching(service, constraints)
                .filter(|f| f.row.forecastcycle == cycle && f.row.tau >= tau_floor)
                .map(|f| f.row.clone())
                .collect(),
        ))
    }

    async fn find_track(
        &self,
        storm_year: i32,
        basin: &str,
        storm: i32,
        advisory: Option<&str>,
    ) -> MetGetResult<Option<TrackRow>> {
        Ok(self
            .tracks
            .iter()
            .find(|t| {
                t.storm_year == storm_year
                    && t.basin == basin
                    && t.storm == storm
                    && t.advisory.as_deref() == advisory
            })
            .cloned())
    }
}
