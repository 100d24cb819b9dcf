//! Series, patient and study selectors.
//!
//! Each selector turns a metadata filter into a list of objects and local
//! destinations, then hands the batch to the `ObjectDownloader`. Layout on
//! disk:
//!
//! - series: `{dest}/{study}/{series}/{objectKey}`
//! - patient: `{dest}/{patient_id}/{study}/{series}/{objectKey}`
//! - identifier: `{dest}/{identifier}/{study}/{series}/{objectKey}`
//! - study: `{dest}/{study}/{series}/{objectKey}`

use crate::{
    errors::{DepotError, DepotResult},
    models::{
        descriptor::ObjectDescriptor,
        instance::{Modality, SeriesRef},
    },
    services::{metadata_store::MetadataStore, object_downloader::ObjectDownloader},
};
use std::{
    collections::HashSet,
    path::{self, Path, PathBuf},
    sync::Arc,
};
use tokio::fs;
use tracing::{debug, info};

const BANNER_RULE: &str = "************************************************************";

/// Ties the metadata store to the downloader.
#[derive(Clone)]
pub struct DepotService {
    /// Injected store; the service never opens connections itself.
    pub store: Arc<dyn MetadataStore>,

    pub downloader: ObjectDownloader,
}

impl DepotService {
    pub fn new(store: Arc<dyn MetadataStore>, downloader: ObjectDownloader) -> Self {
        Self { store, downloader }
    }

    /// Download one series into `{destination}/{study_uid}/{series_uid}`.
    ///
    /// Returns the number of files written.
    pub async fn download_series(
        &self,
        modality: Modality,
        study_uid: &str,
        series_uid: &str,
        destination: &Path,
    ) -> DepotResult<usize> {
        ensure_segment_safe(study_uid)?;
        ensure_segment_safe(series_uid)?;
        let series_dir = path::absolute(destination)?
            .join(study_uid)
            .join(series_uid);

        let instances = self
            .store
            .instances_in_series(modality, study_uid, series_uid)
            .await?;

        let (objects, destinations): (Vec<ObjectDescriptor>, Vec<PathBuf>) = instances
            .iter()
            .map(|instance| -> DepotResult<(ObjectDescriptor, PathBuf)> {
                let descriptor = ObjectDescriptor::from_content_url(&instance.content_url);
                ensure_segment_safe(&descriptor.object_key)?;
                let target = series_dir.join(&descriptor.object_key);
                Ok((descriptor, target))
            })
            .collect::<DepotResult<Vec<_>>>()?
            .into_iter()
            .unzip();

        fs::create_dir_all(&series_dir).await?;

        self.downloader
            .download_objects(&objects, &destinations)
            .await
    }

    /// Download every series of `patient_id` into `{destination}/{patient_id}`.
    pub async fn download_patient(
        &self,
        modality: Modality,
        patient_id: &str,
        destination: &Path,
    ) -> DepotResult<usize> {
        ensure_segment_safe(patient_id)?;
        let patient_dir = path::absolute(destination)?.join(patient_id);
        fs::create_dir_all(&patient_dir).await?;

        let series = self.store.series_for_patient(modality, patient_id).await?;
        self.download_each(modality, series, &patient_dir).await
    }

    /// Like `download_patient`, addressed by the external identifier.
    ///
    /// An unknown identifier fails with `PatientNotFound` before anything is
    /// created or downloaded.
    pub async fn download_patient_by_identifier(
        &self,
        modality: Modality,
        identifier: &str,
        destination: &Path,
    ) -> DepotResult<usize> {
        ensure_segment_safe(identifier)?;
        let patient = self
            .store
            .find_patient_by_identifier(identifier)
            .await?
            .ok_or_else(|| DepotError::PatientNotFound(identifier.to_string()))?;
        debug!(
            "identifier {} belongs to patient {}",
            identifier, patient.patient_id
        );

        let patient_dir = path::absolute(destination)?.join(identifier);
        fs::create_dir_all(&patient_dir).await?;

        let series = self
            .store
            .series_for_patient(modality, &patient.patient_id)
            .await?;
        self.download_each(modality, series, &patient_dir).await
    }

    /// Download every series of `study_uid` into `{destination}/{study_uid}`.
    pub async fn download_study(
        &self,
        modality: Modality,
        study_uid: &str,
        destination: &Path,
    ) -> DepotResult<usize> {
        let series = self.store.series_for_study(modality, study_uid).await?;
        self.download_each(modality, series, destination).await
    }

    async fn download_each(
        &self,
        modality: Modality,
        series: Vec<SeriesRef>,
        destination: &Path,
    ) -> DepotResult<usize> {
        let mut written = 0;
        for SeriesRef {
            study_uid,
            series_uid,
        } in distinct_series(series)
        {
            if self.downloader.is_verbose() {
                info!("{}", BANNER_RULE);
                info!("Downloading study {}, series {} . . .", study_uid, series_uid);
                info!("{}", BANNER_RULE);
            } else {
                debug!("Downloading study {}, series {}", study_uid, series_uid);
            }
            written += self
                .download_series(modality, &study_uid, &series_uid, destination)
                .await?;
        }
        Ok(written)
    }
}

/// Reject anything that would not stay a single directory or file name
/// below the destination root.
fn ensure_segment_safe(segment: &str) -> DepotResult<()> {
    let invalid = || DepotError::InvalidPathSegment(segment.to_string());
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(invalid());
    }
    if segment
        .chars()
        .any(|c| c.is_control() || c == '/' || c == '\\' || c == ':')
    {
        return Err(invalid());
    }
    if Path::new(segment).is_absolute() {
        return Err(invalid());
    }
    Ok(())
}

/// Drop repeated series, keeping the first occurrence of each.
pub fn distinct_series(series: Vec<SeriesRef>) -> Vec<SeriesRef> {
    let mut seen = HashSet::new();
    series
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
