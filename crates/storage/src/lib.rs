//! Storage abstractions for metget services.
//!
//! Provides unified interfaces for:
//! - PostgreSQL: the forecast catalog, request rows, and API keys
//! - Object storage (S3/MinIO) for raw fields and build outputs
//! - Redis Streams for the build request queue

pub mod apikeys;
pub mod catalog;
pub mod object_store;
pub mod queue;
pub mod requests;

pub use apikeys::{ApiKeys, AuthInfo};
pub use catalog::{Catalog, FieldConstraints, FieldRow, NewField, NewTrack, TrackKind, TrackRow};
pub use object_store::{ObjectStorage, ObjectStorageConfig, StoragePath};
pub use queue::{Delivery, RequestEnvelope, RequestQueue};
pub use requests::{RequestRecord, RequestStatus, Requests};
