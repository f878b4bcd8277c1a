//! Field composition and output encoding for build requests.
//!
//! The worker hands this crate gridded fields per (time step, domain); it
//! resolves the domain stack (backfill), encodes the requested output
//! format, and produces the upload manifest. Re-gridding itself sits
//! behind the [`regrid::Regridder`] seam; the meteorological decoding is
//! an external collaborator.

pub mod composer;
pub mod field;
pub mod manifest;
pub mod output;
pub mod regrid;

pub use composer::{Layer, StackComposer};
pub use field::GriddedField;
pub use manifest::Manifest;
pub use output::{encode, EncoderContext, OutputFile, Snap};
pub use regrid::{ExternalRegridder, Regridder};
