//! Represents a patient row in the depot.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A patient, used to translate an external identifier into the internal key.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Patient {
    /// Internal patient key referenced by instance rows.
    pub patient_id: String,

    /// External-facing identifier.
    pub identifier: Option<String>,

    pub gender: Option<String>,

    #[sqlx(rename = "managingorganization_id")]
    pub organization_id: Option<String>,

    #[serde(skip_serializing)]
    pub private_identifier: Option<String>,
}
