//! Data models for depot metadata and object storage.
//!
//! Rows map to the read-only depot tables via `sqlx::FromRow`. Descriptors
//! serialize as JSON for the bulk presigned-url endpoint via `serde`.

pub mod descriptor;
pub mod instance;
pub mod patient;
