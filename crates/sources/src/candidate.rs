//! Candidate files enumerated by source discovery.

use chrono::{DateTime, Utc};

use metget_common::Service;

/// A discovered upstream file, not yet catalogued.
#[derive(Debug, Clone)]
pub enum Candidate {
    Field(FieldCandidate),
    Track(TrackCandidate),
}

impl Candidate {
    /// Sort key giving the required processing order: ascending
    /// (cycle, valid_time, tau).
    pub fn order_key(&self) -> (DateTime<Utc>, DateTime<Utc>, i32) {
        match self {
            Candidate::Field(f) => (f.cycle, f.valid_time, f.tau),
            Candidate::Track(t) => {
                let epoch = DateTime::<Utc>::UNIX_EPOCH;
                (t.issued.unwrap_or(epoch), t.issued.unwrap_or(epoch), 0)
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Candidate::Field(f) => &f.url,
            Candidate::Track(t) => &t.url,
        }
    }
}

/// A gridded forecast field candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCandidate {
    pub service: Service,
    pub cycle: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub tau: i32,
    pub url: String,
    pub storm: Option<String>,
    pub ensemble_member: Option<String>,
}

impl FieldCandidate {
    /// Identity path segments between the cycle and valid time in the
    /// storage key: storm, then ensemble member, when present.
    pub fn identity_parts(&self) -> Vec<&str> {
        let mut parts = Vec::new();
        if let Some(storm) = &self.storm {
            parts.push(storm.as_str());
        }
        if let Some(member) = &self.ensemble_member {
            parts.push(member.as_str());
        }
        parts
    }
}

/// Which NHC track product a candidate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackProduct {
    BestTrack,
    Forecast,
}

/// A tropical cyclone track file candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCandidate {
    pub product: TrackProduct,
    pub storm_year: i32,
    pub basin: String,
    pub storm: i32,
    /// Advisory identifier; None until derived from the fetched file.
    pub advisory: Option<String>,
    pub issued: Option<DateTime<Utc>>,
    pub url: String,
}
