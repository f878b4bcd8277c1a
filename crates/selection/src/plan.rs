//! Plan types produced by the selection engine.

use chrono::{DateTime, Utc};
use serde::Serialize;

use metget_common::Service;
use storage::TrackRow;

/// One catalog row chosen for a time slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub forecast_cycle: DateTime<Utc>,
    pub tau: i32,
    pub storage_key: String,
}

/// One output time step for a domain: a chosen entry or a hole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSlot {
    pub valid_time: DateTime<Utc>,
    pub entry: Option<PlanEntry>,
}

impl TimeSlot {
    pub fn is_hole(&self) -> bool {
        self.entry.is_none()
    }
}

/// What was selected for one domain.
#[derive(Debug, Clone, Serialize)]
pub enum DomainSelection {
    /// Gridded fields, one slot per output time step.
    Fields(Vec<TimeSlot>),
    /// A tropical cyclone track file.
    Track {
        storage_key: String,
        advisory: Option<String>,
    },
}

/// Per-domain slice of the plan.
#[derive(Debug, Clone, Serialize)]
pub struct DomainPlan {
    pub domain_index: usize,
    pub level: u32,
    pub service: Service,
    pub selection: DomainSelection,
}

impl DomainPlan {
    pub fn slots(&self) -> &[TimeSlot] {
        match &self.selection {
            DomainSelection::Fields(slots) => slots,
            DomainSelection::Track { .. } => &[],
        }
    }

    pub fn holes(&self) -> Vec<DateTime<Utc>> {
        self.slots()
            .iter()
            .filter(|s| s.is_hole())
            .map(|s| s.valid_time)
            .collect()
    }

    /// Distinct storage keys referenced by this domain, in slot order.
    pub fn storage_keys(&self) -> Vec<&str> {
        match &self.selection {
            DomainSelection::Fields(slots) => {
                let mut keys: Vec<&str> = slots
                    .iter()
                    .filter_map(|s| s.entry.as_ref().map(|e| e.storage_key.as_str()))
                    .collect();
                keys.dedup();
                keys
            }
            DomainSelection::Track { storage_key, .. } => vec![storage_key.as_str()],
        }
    }
}

/// The full plan for a request, domains ordered by ascending level.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionPlan {
    pub domains: Vec<DomainPlan>,
}

impl SelectionPlan {
    /// Domains in stacking order (ascending level, ties by domain index).
    pub fn stacking_order(&self) -> Vec<&DomainPlan> {
        let mut ordered: Vec<&DomainPlan> = self.domains.iter().collect();
        ordered.sort_by_key(|d| (d.level, d.domain_index));
        ordered
    }

    /// Summary of chosen cycles and holes, stored on the request row.
    pub fn coverage_summary(&self) -> serde_json::Value {
        let domains: Vec<serde_json::Value> = self
            .domains
            .iter()
            .map(|d| {
                let cycles: Vec<String> = {
                    let mut seen: Vec<DateTime<Utc>> = d
                        .slots()
                        .iter()
                        .filter_map(|s| s.entry.as_ref().map(|e| e.forecast_cycle))
                        .collect();
                    seen.dedup();
                    seen.iter().map(|c| c.to_rfc3339()).collect()
                };
                serde_json::json!({
                    "domain": d.domain_index,
                    "service": d.service.name(),
                    "cycles": cycles,
                    "holes": d.holes().iter().map(|t| t.to_rfc3339()).collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::json!({ "domains": domains })
    }
}

pub fn track_selection(row: &TrackRow) -> DomainSelection {
    DomainSelection::Track {
        storage_key: row.filepath.clone(),
        advisory: row.advisory.clone(),
    }
}
