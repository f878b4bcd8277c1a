//! The registry of upstream meteorological services.
//!
//! Each service maps to one catalog table and one family shape. The family
//! determines which identity columns participate in the uniqueness key and
//! which request fields are mandatory for a domain using the service.

use serde::{Deserialize, Serialize};

use crate::error::MetGetError;

/// The shape of a service's catalog identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    /// Deterministic synoptic model: unique on (cycle, valid_time).
    Synoptic,
    /// Ensemble synoptic model: unique on (cycle, valid_time, member).
    SynopticEnsemble,
    /// Storm-scoped deterministic model: unique on (cycle, valid_time, storm).
    Storm,
    /// Storm-scoped ensemble: unique on (cycle, valid_time, storm, member).
    StormEnsemble,
    /// Tropical cyclone track products: unique on storm identity + advisory.
    Track,
}

/// A supported upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Service {
    GfsNcep,
    NamNcep,
    HrrrNcep,
    HrrrAlaskaNcep,
    GefsNcep,
    WpcNcep,
    Hwrf,
    HafsA,
    HafsB,
    CoampsTc,
    Ctcx,
    Nhc,
}

impl Service {
    pub const ALL: [Service; 12] = [
        Service::GfsNcep,
        Service::NamNcep,
        Service::HrrrNcep,
        Service::HrrrAlaskaNcep,
        Service::GefsNcep,
        Service::WpcNcep,
        Service::Hwrf,
        Service::HafsA,
        Service::HafsB,
        Service::CoampsTc,
        Service::Ctcx,
        Service::Nhc,
    ];

    pub fn from_name(name: &str) -> Result<Self, MetGetError> {
        match name {
            "gfs-ncep" => Ok(Service::GfsNcep),
            "nam-ncep" => Ok(Service::NamNcep),
            "hrrr-ncep" => Ok(Service::HrrrNcep),
            "hrrr-alaska-ncep" => Ok(Service::HrrrAlaskaNcep),
            "gefs-ncep" => Ok(Service::GefsNcep),
            "wpc-ncep" => Ok(Service::WpcNcep),
            "hwrf" => Ok(Service::Hwrf),
            "hafs-a" => Ok(Service::HafsA),
            "hafs-b" => Ok(Service::HafsB),
            "coamps-tc" => Ok(Service::CoampsTc),
            "ctcx" => Ok(Service::Ctcx),
            "nhc" => Ok(Service::Nhc),
            other => Err(MetGetError::UnknownService(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Service::GfsNcep => "gfs-ncep",
            Service::NamNcep => "nam-ncep",
            Service::HrrrNcep => "hrrr-ncep",
            Service::HrrrAlaskaNcep => "hrrr-alaska-ncep",
            Service::GefsNcep => "gefs-ncep",
            Service::WpcNcep => "wpc-ncep",
            Service::Hwrf => "hwrf",
            Service::HafsA => "hafs-a",
            Service::HafsB => "hafs-b",
            Service::CoampsTc => "coamps-tc",
            Service::Ctcx => "ctcx",
            Service::Nhc => "nhc",
        }
    }

    /// Catalog table backing this service.
    pub fn table(&self) -> &'static str {
        match self {
            Service::GfsNcep => "gfs_ncep",
            Service::NamNcep => "nam_ncep",
            Service::HrrrNcep => "hrrr_ncep",
            Service::HrrrAlaskaNcep => "hrrr_alaska_ncep",
            Service::GefsNcep => "gefs_fcst",
            Service::WpcNcep => "wpc_ncep",
            Service::Hwrf => "hwrf",
            Service::HafsA => "ncep_hafs_a",
            Service::HafsB => "ncep_hafs_b",
            Service::CoampsTc => "coamps_tc",
            Service::Ctcx => "ctcx",
            // The track family splits into best-track and forecast tables;
            // this is the forecast table, the catalog handles the pair.
            Service::Nhc => "nhc_fcst",
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Service::GfsNcep
            | Service::NamNcep
            | Service::HrrrNcep
            | Service::HrrrAlaskaNcep
            | Service::WpcNcep => ModelFamily::Synoptic,
            Service::GefsNcep => ModelFamily::SynopticEnsemble,
            Service::Hwrf | Service::HafsA | Service::HafsB | Service::CoampsTc => {
                ModelFamily::Storm
            }
            Service::Ctcx => ModelFamily::StormEnsemble,
            Service::Nhc => ModelFamily::Track,
        }
    }

    pub fn requires_storm(&self) -> bool {
        matches!(
            self.family(),
            ModelFamily::Storm | ModelFamily::StormEnsemble | ModelFamily::Track
        )
    }

    pub fn requires_ensemble_member(&self) -> bool {
        matches!(
            self.family(),
            ModelFamily::SynopticEnsemble | ModelFamily::StormEnsemble
        )
    }

    pub fn is_track(&self) -> bool {
        self.family() == ModelFamily::Track
    }

    /// Model run initialization hours (UTC).
    pub fn cycles(&self) -> &'static [u32] {
        match self {
            Service::HrrrNcep => &[
                0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22,
                23,
            ],
            Service::HrrrAlaskaNcep => &[0, 3, 6, 9, 12, 15, 18, 21],
            Service::CoampsTc | Service::Ctcx => &[0, 6, 12, 18],
            _ => &[0, 6, 12, 18],
        }
    }

    /// Nominal forecast horizon in hours; a cycle whose maximum tau reaches
    /// this value is considered complete for the status snapshot.
    pub fn nominal_horizon(&self) -> i32 {
        match self {
            Service::GfsNcep => 384,
            Service::NamNcep => 84,
            Service::HrrrNcep => 48,
            Service::HrrrAlaskaNcep => 48,
            Service::GefsNcep => 240,
            Service::WpcNcep => 162,
            Service::Hwrf | Service::HafsA | Service::HafsB => 126,
            Service::CoampsTc | Service::Ctcx => 126,
            Service::Nhc => 120,
        }
    }
}

impl TryFrom<String> for Service {
    type Error = MetGetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Service::from_name(&value)
    }
}

impl From<Service> for String {
    fn from(value: Service) -> Self {
        value.name().to_string()
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for svc in Service::ALL {
            assert_eq!(Service::from_name(svc.name()).unwrap(), svc);
        }
    }

    #[test]
    fn test_unknown_service() {
        assert!(matches!(
            Service::from_name("ecmwf"),
            Err(MetGetError::UnknownService(_))
        ));
    }

    #[test]
    fn test_family_requirements() {
        assert!(Service::GefsNcep.requires_ensemble_member());
        assert!(!Service::GefsNcep.requires_storm());
        assert!(Service::HafsA.requires_storm());
        assert!(Service::Ctcx.requires_storm());
        assert!(Service::Ctcx.requires_ensemble_member());
        assert!(Service::Nhc.is_track());
        assert!(!Service::GfsNcep.requires_storm());
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&Service::HafsA).unwrap();
        assert_eq!(json, "\"hafs-a\"");
        let svc: Service = serde_json::from_str("\"gfs-ncep\"").unwrap();
        assert_eq!(svc, Service::GfsNcep);
    }
}
