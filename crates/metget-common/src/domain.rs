//! Request domains: one output grid bound to one upstream service.

use serde_json::Value;

use crate::error::{MetGetError, MetGetResult};
use crate::grid::GridSpec;
use crate::service::Service;

/// One domain of a build request.
///
/// Domains stack by `level`: level 0 is the base layer, higher levels
/// overlay it with finer data. Track domains (`nhc`) carry no grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub name: String,
    pub service: Service,
    pub level: u32,
    pub grid: Option<GridSpec>,
    /// Minimum forecast lead time in hours; excludes early spin-up hours.
    pub tau: u32,
    pub storm: Option<String>,
    pub storm_year: Option<i32>,
    pub basin: Option<String>,
    pub advisory: Option<String>,
    pub ensemble_member: Option<String>,
}

impl Domain {
    /// Parse a domain from its JSON object in the request spec.
    pub fn from_json(index: usize, json: &Value) -> MetGetResult<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| MetGetError::Validation(format!("domain {} is not an object", index)))?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| MetGetError::MissingField(format!("domains[{}].name", index)))?
            .to_string();

        let service_name = obj
            .get("service")
            .and_then(Value::as_str)
            .ok_or_else(|| MetGetError::MissingField(format!("domains[{}].service", index)))?;
        let service = Service::from_name(service_name)?;

        let level = obj.get("level").and_then(Value::as_u64).unwrap_or(0) as u32;
        let tau = obj.get("tau").and_then(Value::as_u64).unwrap_or(0) as u32;

        let grid = if service.is_track() {
            None
        } else {
            Some(Self::parse_grid(index, obj)?)
        };

        let storm = obj
            .get("storm")
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        let storm_year = obj.get("storm_year").and_then(Value::as_i64).map(|y| y as i32);
        let basin = obj
            .get("basin")
            .and_then(Value::as_str)
            .map(|s| s.to_lowercase());
        let advisory = obj.get("advisory").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let ensemble_member = obj
            .get("ensemble_member")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        let domain = Self {
            name,
            service,
            level,
            grid,
            tau,
            storm,
            storm_year,
            basin,
            advisory,
            ensemble_member,
        };
        domain.validate(index)?;
        Ok(domain)
    }

    fn parse_grid(index: usize, obj: &serde_json::Map<String, Value>) -> MetGetResult<GridSpec> {
        // Named preset takes priority when present.
        if let Some(preset) = obj.get("predefined_domain").and_then(Value::as_str) {
            return GridSpec::predefined(preset).ok_or_else(|| {
                MetGetError::Validation(format!(
                    "domains[{}]: unknown predefined domain '{}'",
                    index, preset
                ))
            });
        }

        let f = |key: &str| -> MetGetResult<f64> {
            obj.get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| MetGetError::MissingField(format!("domains[{}].{}", index, key)))
        };

        let x_init = f("x_init")?;
        let y_init = f("y_init")?;
        let di = f("di")?;
        let dj = f("dj")?;

        if !(-180.0..=180.0).contains(&x_init) || !(-90.0..=90.0).contains(&y_init) {
            return Err(MetGetError::Validation(format!(
                "domains[{}]: origin out of range",
                index
            )));
        }

        // Origin + extent form when ni/nj are present, corner form otherwise.
        if let (Some(ni), Some(nj)) = (
            obj.get("ni").and_then(Value::as_u64),
            obj.get("nj").and_then(Value::as_u64),
        ) {
            let rotation = obj.get("rotation").and_then(Value::as_f64).unwrap_or(0.0);
            GridSpec::from_origin(x_init, y_init, di, dj, ni as usize, nj as usize, rotation)
        } else {
            let x_end = f("x_end")?;
            let y_end = f("y_end")?;
            if !(-180.0..=180.0).contains(&x_end) || !(-90.0..=90.0).contains(&y_end) {
                return Err(MetGetError::Validation(format!(
                    "domains[{}]: corner out of range",
                    index
                )));
            }
            GridSpec::from_corners(x_init, y_init, x_end, y_end, di, dj)
        }
    }

    fn validate(&self, index: usize) -> MetGetResult<()> {
        if self.service.requires_storm() && self.storm.is_none() {
            return Err(MetGetError::Validation(format!(
                "domains[{}]: service '{}' requires a storm",
                index, self.service
            )));
        }
        if self.service.requires_ensemble_member() && self.ensemble_member.is_none() {
            return Err(MetGetError::Validation(format!(
                "domains[{}]: service '{}' requires an ensemble member",
                index, self.service
            )));
        }
        if self.service.is_track() && self.storm_year.is_none() {
            return Err(MetGetError::Validation(format!(
                "domains[{}]: track requests require storm_year",
                index
            )));
        }
        if let Some(basin) = &self.basin {
            if !["al", "ep", "wp"].contains(&basin.as_str()) {
                return Err(MetGetError::Validation(format!(
                    "domains[{}]: unknown basin '{}'",
                    index, basin
                )));
            }
        }
        Ok(())
    }

    /// Per-domain share of the request's credit cost.
    ///
    /// Gridded domains cost one credit per cell per time step; track
    /// domains carry a flat tariff.
    pub fn credit_usage(&self, num_time_steps: usize) -> i64 {
        match &self.grid {
            Some(grid) => (grid.n() * num_time_steps) as i64,
            None => 100 * 100 * 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_corner_domain() {
        let d = Domain::from_json(
            0,
            &json!({
                "name": "gulf",
                "service": "gfs-ncep",
                "level": 0,
                "x_init": -100.0, "y_init": 20.0,
                "x_end": -80.0, "y_end": 30.0,
                "di": 0.25, "dj": 0.25
            }),
        )
        .unwrap();
        assert_eq!(d.service, Service::GfsNcep);
        assert_eq!(d.grid.as_ref().unwrap().ni, 81);
    }

    #[test]
    fn test_origin_extent_domain() {
        let d = Domain::from_json(
            0,
            &json!({
                "name": "rot",
                "service": "nam-ncep",
                "level": 1,
                "x_init": -95.0, "y_init": 25.0,
                "di": 0.1, "dj": 0.1,
                "ni": 100, "nj": 80,
                "rotation": 15.0
            }),
        )
        .unwrap();
        let grid = d.grid.unwrap();
        assert_eq!((grid.ni, grid.nj), (100, 80));
        assert_eq!(grid.rotation, 15.0);
    }

    #[test]
    fn test_storm_required() {
        let err = Domain::from_json(
            0,
            &json!({
                "name": "storm",
                "service": "hafs-a",
                "x_init": -95.0, "y_init": 25.0,
                "x_end": -85.0, "y_end": 35.0,
                "di": 0.1, "dj": 0.1
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("requires a storm"));
    }

    #[test]
    fn test_ensemble_member_required() {
        let err = Domain::from_json(
            0,
            &json!({
                "name": "ens",
                "service": "gefs-ncep",
                "x_init": -95.0, "y_init": 25.0,
                "x_end": -85.0, "y_end": 35.0,
                "di": 0.5, "dj": 0.5
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ensemble member"));
    }

    #[test]
    fn test_track_domain_has_no_grid() {
        let d = Domain::from_json(
            0,
            &json!({
                "name": "track",
                "service": "nhc",
                "storm": "9",
                "basin": "al",
                "storm_year": 2023,
                "advisory": 12
            }),
        )
        .unwrap();
        assert!(d.grid.is_none());
        assert_eq!(d.advisory.as_deref(), Some("12"));
        assert_eq!(d.credit_usage(25), 240_000);
    }
}
