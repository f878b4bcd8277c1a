//! Common types and utilities shared across all metget services.

pub mod domain;
pub mod error;
pub mod grid;
pub mod request;
pub mod service;
pub mod time;

pub use domain::Domain;
pub use error::{MetGetError, MetGetResult};
pub use grid::GridSpec;
pub use request::{OutputFormat, RequestSpec, VariableKind};
pub use service::{ModelFamily, Service};
pub use time::time_steps;
