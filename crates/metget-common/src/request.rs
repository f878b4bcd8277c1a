//! Build request specification: parsing, validation, and credit accounting.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::domain::Domain;
use crate::error::{MetGetError, MetGetResult};
use crate::service::Service;
use crate::time::time_steps;

/// Output file formats supported by the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    OwiAscii,
    OwiNetcdf,
    RasNetcdf,
    Delft3d,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> MetGetResult<Self> {
        match name {
            "owi-ascii" | "ascii" => Ok(OutputFormat::OwiAscii),
            "owi-netcdf" => Ok(OutputFormat::OwiNetcdf),
            "ras-netcdf" | "hec-netcdf" => Ok(OutputFormat::RasNetcdf),
            "delft3d" => Ok(OutputFormat::Delft3d),
            other => Err(MetGetError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::OwiAscii => "owi-ascii",
            OutputFormat::OwiNetcdf => "owi-netcdf",
            OutputFormat::RasNetcdf => "ras-netcdf",
            OutputFormat::Delft3d => "delft3d",
        }
    }

    pub fn is_netcdf(&self) -> bool {
        matches!(self, OutputFormat::OwiNetcdf | OutputFormat::RasNetcdf)
    }
}

/// The meteorological variable group a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    WindPressure,
    Rain,
    Ice,
    Humidity,
    Temperature,
}

impl VariableKind {
    pub fn from_name(name: &str) -> MetGetResult<Self> {
        match name {
            "wind_pressure" => Ok(VariableKind::WindPressure),
            "rain" | "precipitation" => Ok(VariableKind::Rain),
            "ice" => Ok(VariableKind::Ice),
            "humidity" => Ok(VariableKind::Humidity),
            "temperature" => Ok(VariableKind::Temperature),
            other => Err(MetGetError::Validation(format!(
                "Invalid data type: {}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VariableKind::WindPressure => "wind_pressure",
            VariableKind::Rain => "rain",
            VariableKind::Ice => "ice",
            VariableKind::Humidity => "humidity",
            VariableKind::Temperature => "temperature",
        }
    }

    /// Number of scalar planes this variable group produces per time step.
    pub fn planes(&self) -> usize {
        match self {
            VariableKind::WindPressure => 3,
            _ => 1,
        }
    }

    /// Accumulated variables have no meaningful analysis field; tau 0 is
    /// skipped and the selection floor is raised to 1.
    pub fn is_accumulated(&self) -> bool {
        matches!(self, VariableKind::Rain)
    }
}

/// A fully parsed and validated build request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub version: String,
    pub creator: String,
    pub request_id: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub time_step: i64,
    pub filename: String,
    pub format: OutputFormat,
    pub data_type: VariableKind,
    pub domains: Vec<Domain>,
    pub background_pressure: f64,
    pub null_value: f64,
    pub epsg: u32,
    pub nowcast: bool,
    pub multiple_forecasts: bool,
    pub backfill: bool,
    pub strict: bool,
    pub dry_run: bool,
    pub compression: bool,
    /// The canonicalized input, persisted on the request row and carried in
    /// the queue envelope.
    pub json: Value,
}

impl RequestSpec {
    /// Parse and validate a request spec from JSON.
    pub fn parse(json: &Value) -> MetGetResult<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| MetGetError::Validation("request body is not an object".to_string()))?;

        let str_field = |key: &str| -> MetGetResult<String> {
            obj.get(key)
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .ok_or_else(|| MetGetError::MissingField(key.to_string()))
        };

        let version = str_field("version")?;
        let creator = str_field("creator")?;
        let request_id = obj
            .get("request_id")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        let start_date = parse_datetime(&str_field("start_date")?)?;
        let end_date = parse_datetime(&str_field("end_date")?)?;

        let time_step = obj
            .get("time_step")
            .and_then(Value::as_i64)
            .ok_or_else(|| MetGetError::MissingField("time_step".to_string()))?;
        if time_step <= 0 {
            return Err(MetGetError::Validation(
                "time_step must be positive".to_string(),
            ));
        }
        if start_date >= end_date {
            return Err(MetGetError::Validation(
                "start_date must be before end_date".to_string(),
            ));
        }

        let format = OutputFormat::from_name(&str_field("format")?)?;
        let mut filename = str_field("filename")?;
        if format.is_netcdf() && !filename.ends_with(".nc") {
            filename.push_str(".nc");
        }

        let data_type = match obj.get("data_type").and_then(Value::as_str) {
            Some(name) => VariableKind::from_name(name)?,
            None => VariableKind::WindPressure,
        };

        let domains_json = obj
            .get("domains")
            .and_then(Value::as_array)
            .ok_or_else(|| MetGetError::MissingField("domains".to_string()))?;
        if domains_json.is_empty() {
            return Err(MetGetError::Validation(
                "You must specify one or more domains".to_string(),
            ));
        }
        let mut domains = Vec::with_capacity(domains_json.len());
        for (i, d) in domains_json.iter().enumerate() {
            domains.push(Domain::from_json(i, d)?);
        }

        let bool_opt = |key: &str, default: bool| -> bool {
            obj.get(key).and_then(Value::as_bool).unwrap_or(default)
        };

        let spec = Self {
            version,
            creator,
            request_id,
            start_date,
            end_date,
            time_step,
            filename,
            format,
            data_type,
            domains,
            background_pressure: obj
                .get("background_pressure")
                .and_then(Value::as_f64)
                .unwrap_or(1013.0),
            null_value: obj
                .get("null_value")
                .and_then(Value::as_f64)
                .unwrap_or(-999.0),
            epsg: obj.get("epsg").and_then(Value::as_u64).unwrap_or(4326) as u32,
            nowcast: bool_opt("nowcast", false),
            multiple_forecasts: bool_opt("multiple_forecasts", true),
            backfill: bool_opt("backfill", false),
            strict: bool_opt("strict", false),
            dry_run: bool_opt("dry_run", false),
            compression: bool_opt("compression", false),
            json: json.clone(),
        };

        Ok(spec)
    }

    /// Output time axis, start through end inclusive.
    pub fn time_axis(&self) -> Vec<DateTime<Utc>> {
        time_steps(self.start_date, self.end_date, self.time_step)
    }

    pub fn num_time_steps(&self) -> usize {
        self.time_axis().len()
    }

    /// The tau floor for a domain: the larger of the domain's configured
    /// minimum lead time and the floor forced by accumulated variables.
    pub fn tau_floor(&self, domain: &Domain) -> i32 {
        let mut tau = domain.tau as i32;
        if self.data_type.is_accumulated() && tau == 0 && !domain.service.is_track() {
            tau = 1;
        }
        tau
    }

    /// Total credit cost of the request.
    pub fn credit_usage(&self) -> i64 {
        let steps = self.num_time_steps();
        self.domains.iter().map(|d| d.credit_usage(steps)).sum()
    }

    /// Services referenced by this request, deduplicated.
    pub fn services(&self) -> Vec<Service> {
        let mut out: Vec<Service> = self.domains.iter().map(|d| d.service).collect();
        out.sort_by_key(|s| s.name());
        out.dedup();
        out
    }
}

fn parse_datetime(s: &str) -> MetGetResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ndt.and_utc());
        }
    }
    Err(MetGetError::Validation(format!(
        "Unparseable timestamp: {}",
        s
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_request() -> Value {
        json!({
            "version": "0.0.1",
            "creator": "tests",
            "start_date": "2024-01-01 00:00:00",
            "end_date": "2024-01-02 00:00:00",
            "time_step": 3600,
            "filename": "forcing",
            "format": "owi-ascii",
            "domains": [{
                "name": "gulf",
                "service": "gfs-ncep",
                "level": 0,
                "x_init": -100.0, "y_init": 20.0,
                "x_end": -80.0, "y_end": 30.0,
                "di": 0.25, "dj": 0.25
            }]
        })
    }

    #[test]
    fn test_parse_defaults() {
        let spec = RequestSpec::parse(&base_request()).unwrap();
        assert_eq!(spec.format, OutputFormat::OwiAscii);
        assert_eq!(spec.data_type, VariableKind::WindPressure);
        assert!(!spec.nowcast);
        assert!(spec.multiple_forecasts);
        assert!(!spec.backfill);
        assert_eq!(spec.epsg, 4326);
        assert_eq!(spec.background_pressure, 1013.0);
        assert_eq!(spec.num_time_steps(), 25);
    }

    #[test]
    fn test_netcdf_extension_appended() {
        let mut req = base_request();
        req["format"] = json!("owi-netcdf");
        let spec = RequestSpec::parse(&req).unwrap();
        assert_eq!(spec.filename, "forcing.nc");
    }

    #[test]
    fn test_reversed_dates_rejected() {
        let mut req = base_request();
        req["start_date"] = json!("2024-01-03 00:00:00");
        let err = RequestSpec::parse(&req).unwrap_err();
        assert!(err.to_string().contains("before end_date"));
    }

    #[test]
    fn test_zero_time_step_rejected() {
        let mut req = base_request();
        req["time_step"] = json!(0);
        assert!(RequestSpec::parse(&req).is_err());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let mut req = base_request();
        req["format"] = json!("grib2");
        assert!(matches!(
            RequestSpec::parse(&req),
            Err(MetGetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_empty_domains_rejected() {
        let mut req = base_request();
        req["domains"] = json!([]);
        assert!(RequestSpec::parse(&req).is_err());
    }

    #[test]
    fn test_credit_usage_grid() {
        let spec = RequestSpec::parse(&base_request()).unwrap();
        // 81 x 41 cells, 25 steps
        assert_eq!(spec.credit_usage(), 81 * 41 * 25);
    }

    #[test]
    fn test_credit_usage_track_flat() {
        let mut req = base_request();
        req["domains"] = json!([{
            "name": "track",
            "service": "nhc",
            "storm": "9",
            "basin": "al",
            "storm_year": 2023
        }]);
        let spec = RequestSpec::parse(&req).unwrap();
        assert_eq!(spec.credit_usage(), 240_000);
    }

    #[test]
    fn test_tau_floor_accumulated() {
        let mut req = base_request();
        req["data_type"] = json!("rain");
        req["domains"][0]["service"] = json!("wpc-ncep");
        let spec = RequestSpec::parse(&req).unwrap();
        assert_eq!(spec.tau_floor(&spec.domains[0]), 1);

        let spec = RequestSpec::parse(&base_request()).unwrap();
        assert_eq!(spec.tau_floor(&spec.domains[0]), 0);
    }

    #[test]
    fn test_rfc3339_dates_accepted() {
        let mut req = base_request();
        req["start_date"] = json!("2024-01-01T00:00:00Z");
        req["end_date"] = json!("2024-01-01T06:00:00+00:00");
        let spec = RequestSpec::parse(&req).unwrap();
        assert_eq!(spec.num_time_steps(), 7);
    }
}
