//! Imaging instance rows and the series keys derived from them.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which verified-instance table a query reads from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[value(name = "ct")]
    Ct,
    #[value(name = "xray")]
    XRay,
}

impl Modality {
    /// Fully qualified table holding this modality's instances.
    pub fn table(self) -> &'static str {
        match self {
            Modality::Ct => "de.ct_instances_verified",
            Modality::XRay => "de.xray_instances_verified",
        }
    }
}

/// One image (CT slice or X-ray) as recorded in the depot.
///
/// Only the columns shared by the CT and X-ray tables are mapped; the
/// descriptive columns of each table are never read.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ImagingInstance {
    /// Unique key of this instance.
    pub series_instance_uid: String,

    /// Internal patient key. Nullable in the depot schema.
    pub patient_id: Option<String>,

    /// Study key (`uid` in the depot schema).
    #[sqlx(rename = "uid")]
    pub study_uid: String,

    /// Series key within the study.
    pub series_uid: String,

    /// Location of the image in depot storage, `directory/objectKey`.
    #[sqlx(rename = "series_instance_content_url")]
    pub content_url: String,
}

/// A study + series pair; the unit every download fans out to.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq, Hash)]
pub struct SeriesRef {
    #[sqlx(rename = "uid")]
    pub study_uid: String,
    pub series_uid: String,
}

impl SeriesRef {
    pub fn new(study_uid: impl Into<String>, series_uid: impl Into<String>) -> Self {
        Self {
            study_uid: study_uid.into(),
            series_uid: series_uid.into(),
        }
    }
}

impl From<&ImagingInstance> for SeriesRef {
    fn from(instance: &ImagingInstance) -> Self {
        Self::new(&instance.study_uid, &instance.series_uid)
    }
}
