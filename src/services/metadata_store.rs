//! Read-only access to depot metadata.
//!
//! The depot owns these tables; nothing here creates, updates or deletes rows.

use crate::{
    errors::DepotResult,
    models::{
        instance::{ImagingInstance, Modality, SeriesRef},
        patient::Patient,
    },
};
use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::debug;

/// Queries the selectors need from the depot.
///
/// Series listings may repeat a series; callers deduplicate.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Every instance of one series.
    async fn instances_in_series(
        &self,
        modality: Modality,
        study_uid: &str,
        series_uid: &str,
    ) -> DepotResult<Vec<ImagingInstance>>;

    /// Series with at least one instance belonging to `patient_id`.
    async fn series_for_patient(
        &self,
        modality: Modality,
        patient_id: &str,
    ) -> DepotResult<Vec<SeriesRef>>;

    /// Series belonging to `study_uid`.
    async fn series_for_study(
        &self,
        modality: Modality,
        study_uid: &str,
    ) -> DepotResult<Vec<SeriesRef>>;

    /// First patient whose external identifier matches, if any.
    async fn find_patient_by_identifier(&self, identifier: &str) -> DepotResult<Option<Patient>>;
}

/// `MetadataStore` backed by the depot PostgreSQL database.
#[derive(Clone)]
pub struct PgMetadataStore {
    db: PgPool,
}

impl PgMetadataStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a pool against `database_url`.
    ///
    /// Calls are made one after another, so a single connection is usually enough.
    pub async fn connect(database_url: &str, max_connections: u32) -> DepotResult<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Ok(Self::new(db))
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn instances_in_series(
        &self,
        modality: Modality,
        study_uid: &str,
        series_uid: &str,
    ) -> DepotResult<Vec<ImagingInstance>> {
        let sql = format!(
            "SELECT series_instance_uid, patient_id, uid, series_uid, series_instance_content_url
             FROM {} WHERE uid = $1 AND series_uid = $2",
            modality.table()
        );
        let rows = sqlx::query_as::<_, ImagingInstance>(&sql)
            .bind(study_uid)
            .bind(series_uid)
            .fetch_all(&self.db)
            .await?;
        debug!(
            "{} instances in study {} series {}",
            rows.len(),
            study_uid,
            series_uid
        );
        Ok(rows)
    }

    async fn series_for_patient(
        &self,
        modality: Modality,
        patient_id: &str,
    ) -> DepotResult<Vec<SeriesRef>> {
        let sql = format!(
            "SELECT DISTINCT uid, series_uid FROM {} WHERE patient_id = $1
             ORDER BY uid, series_uid",
            modality.table()
        );
        Ok(sqlx::query_as::<_, SeriesRef>(&sql)
            .bind(patient_id)
            .fetch_all(&self.db)
            .await?)
    }

    async fn series_for_study(
        &self,
        modality: Modality,
        study_uid: &str,
    ) -> DepotResult<Vec<SeriesRef>> {
        let sql = format!(
            "SELECT DISTINCT uid, series_uid FROM {} WHERE uid = $1
             ORDER BY uid, series_uid",
            modality.table()
        );
        Ok(sqlx::query_as::<_, SeriesRef>(&sql)
            .bind(study_uid)
            .fetch_all(&self.db)
            .await?)
    }

    async fn find_patient_by_identifier(&self, identifier: &str) -> DepotResult<Option<Patient>> {
        Ok(sqlx::query_as::<_, Patient>(
            "SELECT patient_id, identifier, gender, managingorganization_id, private_identifier
             FROM de.patient WHERE identifier = $1 LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?)
    }
}
