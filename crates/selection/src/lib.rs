//! The selection engine: translates a validated build request into an
//! ordered, time-bucketed plan of catalog rows per domain.

pub mod engine;
pub mod memory;
pub mod plan;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use metget_common::{MetGetResult, Service};
use storage::{Catalog, FieldConstraints, FieldRow, TrackRow};

pub use engine::SelectionEngine;
pub use plan::{DomainPlan, DomainSelection, PlanEntry, SelectionPlan, TimeSlot};

/// Read-only catalog capability consumed by the engine.
///
/// The engine owns no catalog state; it reads through this seam so tests
/// can run against an in-memory catalog.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn fields_in_window(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>>;

    async fn fields_for_cycle(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        cycle: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>>;

    async fn find_track(
        &self,
        storm_year: i32,
        basin: &str,
        storm: i32,
        advisory: Option<&str>,
    ) -> MetGetResult<Option<TrackRow>>;
}

#[async_trait]
impl CatalogReader for Catalog {
    async fn fields_in_window(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>> {
        Catalog::fields_in_window(self, service, constraints, start, end, tau_floor).await
    }

    async fn fields_for_cycle(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        cycle: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>> {
        Catalog::fields_for_cycle(self, service, constraints, cycle, tau_floor).await
    }

    async fn find_track(
        &self,
        storm_year: i32,
        basin: &str,
        storm: i32,
        advisory: Option<&str>,
    ) -> MetGetResult<Option<TrackRow>> {
        Catalog::find_track(self, storm_year, basin, storm, advisory).await
    }
}
