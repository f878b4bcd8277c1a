//! The deterministic selection rules.
//!
//! Given an identical catalog snapshot and request, the engine produces an
//! identical plan: rows arrive ordered, tie-breaks are total (lower tau,
//! then storage key), and cycle candidates are examined newest-first.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use metget_common::{Domain, MetGetError, MetGetResult, RequestSpec};
use storage::{FieldConstraints, FieldRow};

use crate::plan::{track_selection, DomainPlan, DomainSelection, PlanEntry, SelectionPlan, TimeSlot};
use crate::CatalogReader;

/// Selection engine over a catalog reader.
pub struct SelectionEngine<'a, C: CatalogReader> {
    catalog: &'a C,
}

impl<'a, C: CatalogReader> SelectionEngine<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Resolve a plan for the request.
    pub async fn plan(&self, spec: &RequestSpec) -> MetGetResult<SelectionPlan> {
        let times = spec.time_axis();
        let mut domains = Vec::with_capacity(spec.domains.len());

        for (index, domain) in spec.domains.iter().enumerate() {
            let selection = if domain.service.is_track() {
                self.select_track(domain).await?
            } else {
                self.select_fields(spec, domain, &times).await?
            };
            domains.push(DomainPlan {
                domain_index: index,
                level: domain.level,
                service: domain.service,
                selection,
            });
        }

        Ok(SelectionPlan { domains })
    }

    /// Reject plans whose holes cannot be resolved under the request's
    /// backfill policy, and enforce strict-mode purity rules.
    pub fn verify(&self, spec: &RequestSpec, plan: &SelectionPlan) -> MetGetResult<()> {
        // Strict single-forecast requests refuse plans that had to mix
        // cycles to reach full coverage.
        if spec.strict && !spec.multiple_forecasts && !spec.nowcast {
            for domain in &plan.domains {
                let mut cycles: Vec<DateTime<Utc>> = domain
                    .slots()
                    .iter()
                    .filter_map(|s| s.entry.as_ref().map(|e| e.forecast_cycle))
                    .collect();
                cycles.sort();
                cycles.dedup();
                if cycles.len() > 1 {
                    return Err(MetGetError::CoverageGap(format!(
                        "domain {} ({}) mixes {} forecast cycles in a strict \
                         single-forecast request",
                        domain.domain_index,
                        domain.service,
                        cycles.len()
                    )));
                }
            }
        }

        if spec.backfill {
            return Ok(());
        }
        for domain in &plan.domains {
            let holes = domain.holes();
            if !holes.is_empty() {
                let listed: Vec<String> = holes
                    .iter()
                    .take(8)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .collect();
                return Err(MetGetError::CoverageGap(format!(
                    "domain {} ({}) has no data for {} time step(s), first missing: [{}]",
                    domain.domain_index,
                    domain.service,
                    holes.len(),
                    listed.join(", ")
                )));
            }
        }
        Ok(())
    }

    async fn select_track(&self, domain: &Domain) -> MetGetResult<DomainSelection> {
        let storm: i32 = domain
            .storm
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|_| {
                MetGetError::Validation(format!(
                    "track storm must be a storm number, got '{}'",
                    domain.storm.as_deref().unwrap_or_default()
                ))
            })?;
        let year = domain
            .storm_year
            .ok_or_else(|| MetGetError::MissingField("storm_year".to_string()))?;
        let basin = domain.basin.as_deref().unwrap_or("al");

        let row = self
            .catalog
            .find_track(year, basin, storm, domain.advisory.as_deref())
            .await?
            .ok_or_else(|| {
                MetGetError::CoverageGap(format!(
                    "no track on file for {}{:02} ({}) advisory {}",
                    basin,
                    storm,
                    year,
                    domain.advisory.as_deref().unwrap_or("best-track")
                ))
            })?;

        Ok(track_selection(&row))
    }

    async fn select_fields(
        &self,
        spec: &RequestSpec,
        domain: &Domain,
        times: &[DateTime<Utc>],
    ) -> MetGetResult<DomainSelection> {
        let constraints = FieldConstraints {
            storm: domain.storm.clone(),
            ensemble_member: domain.ensemble_member.clone(),
        };
        let tau_floor = spec.tau_floor(domain);

        let window_rows = self
            .catalog
            .fields_in_window(
                domain.service,
                &constraints,
                times[0],
                *times.last().unwrap(),
                tau_floor,
            )
            .await?;

        let slots = if spec.nowcast {
            nowcast_slots(&window_rows, times, tau_floor)
        } else if spec.multiple_forecasts {
            min_tau_slots(&window_rows, times)
        } else {
            self.single_cycle_slots(domain, &constraints, &window_rows, times, tau_floor)
                .await?
        };

        Ok(DomainSelection::Fields(slots))
    }

    /// Single-forecast selection: the newest cycle that, together with the
    /// min-tau fallback for lead times below the floor, covers every time
    /// step. When no cycle covers everything, the best-covering newest
    /// cycle is used and the remaining steps become holes.
    async fn single_cycle_slots(
        &self,
        domain: &Domain,
        constraints: &FieldConstraints,
        window_rows: &[FieldRow],
        times: &[DateTime<Utc>],
        tau_floor: i32,
    ) -> MetGetResult<Vec<TimeSlot>> {
        let mut cycles: Vec<DateTime<Utc>> =
            window_rows.iter().map(|r| r.forecastcycle).collect();
        cycles.sort();
        cycles.dedup();
        cycles.reverse();

        // Fallback entries fill time steps the chosen cycle cannot reach,
        // which happens when the tau floor excludes its early hours.
        let fallback = if tau_floor > 0 {
            slot_map(&min_tau_slots(window_rows, times))
        } else {
            BTreeMap::new()
        };

        let mut best: Option<(usize, Vec<TimeSlot>)> = None;

        for cycle in cycles {
            let cycle_rows = self
                .catalog
                .fields_for_cycle(domain.service, constraints, cycle, tau_floor)
                .await?;
            let by_time = first_per_time(&cycle_rows);

            let slots: Vec<TimeSlot> = times
                .iter()
                .map(|t| TimeSlot {
                    valid_time: *t,
                    entry: by_time
                        .get(t)
                        .map(|r| entry_from(r))
                        .or_else(|| fallback.get(t).cloned()),
                })
                .collect();

            let covered = slots.iter().filter(|s| !s.is_hole()).count();
            if covered == times.len() {
                return Ok(slots);
            }
            // Cycles are examined newest-first, so strictly-better coverage
            // is required to displace an earlier candidate.
            if best.as_ref().map(|(c, _)| covered > *c).unwrap_or(true) {
                best = Some((covered, slots));
            }
        }

        Ok(best.map(|(_, slots)| slots).unwrap_or_else(|| {
            times
                .iter()
                .map(|t| TimeSlot {
                    valid_time: *t,
                    entry: None,
                })
                .collect()
        }))
    }
}

fn entry_from(row: &FieldRow) -> PlanEntry {
    PlanEntry {
        forecast_cycle: row.forecastcycle,
        tau: row.tau,
        storage_key: row.filepath.clone(),
    }
}

/// Nowcast: only rows at exactly the tau floor.
fn nowcast_slots(rows: &[FieldRow], times: &[DateTime<Utc>], tau_floor: i32) -> Vec<TimeSlot> {
    let filtered: Vec<&FieldRow> = rows.iter().filter(|r| r.tau == tau_floor).collect();
    let mut by_time: BTreeMap<DateTime<Utc>, &FieldRow> = BTreeMap::new();
    for row in filtered {
        by_time.entry(row.forecasttime).or_insert(row);
    }
    times
        .iter()
        .map(|t| TimeSlot {
            valid_time: *t,
            entry: by_time.get(t).map(|r| entry_from(r)),
        })
        .collect()
}

/// Multiple forecasts: per valid time, the row with the smallest tau --
/// i.e. the newest cycle covering it. Ties resolve on storage key, which
/// the incoming row order already guarantees.
fn min_tau_slots(rows: &[FieldRow], times: &[DateTime<Utc>]) -> Vec<TimeSlot> {
    let by_time = first_per_time_min_tau(rows);
    times
        .iter()
        .map(|t| TimeSlot {
            valid_time: *t,
            entry: by_time.get(t).map(|r| entry_from(r)),
        })
        .collect()
}

/// First row per valid time; callers pass rows pre-sorted by
/// (forecasttime, tau, filepath), so "first" is the deterministic winner.
fn first_per_time(rows: &[FieldRow]) -> BTreeMap<DateTime<Utc>, &FieldRow> {
    let mut map = BTreeMap::new();
    for row in rows {
        map.entry(row.forecasttime).or_insert(row);
    }
    map
}

fn first_per_time_min_tau(rows: &[FieldRow]) -> BTreeMap<DateTime<Utc>, &FieldRow> {
    let mut map: BTreeMap<DateTime<Utc>, &FieldRow> = BTreeMap::new();
    for row in rows {
        map.entry(row.forecasttime)
            .and_modify(|kept| {
                if (row.tau, row.filepath.as_str()) < (kept.tau, kept.filepath.as_str()) {
                    *kept = row;
                }
            })
            .or_insert(row);
    }
    map
}

fn slot_map(slots: &[TimeSlot]) -> BTreeMap<DateTime<Utc>, PlanEntry> {
    slots
        .iter()
        .filter_map(|s| s.entry.clone().map(|e| (s.valid_time, e)))
        .collect()
}
