//! Downloads depot objects to local files.
//!
//! One bulk resolution call turns the whole batch into presigned urls, then
//! every object is fetched and written in list order. The first failure
//! stops the batch: files already written stay on disk and the rest are
//! never attempted.

use crate::{
    errors::{DepotError, DepotResult},
    models::descriptor::{ObjectDescriptor, ResolvedObject},
    services::url_resolver::BulkUrlResolver,
};
use futures::StreamExt;
use reqwest::Client;
use std::path::{self, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, info, warn};

/// What to do when descriptors, destinations and resolved urls differ in length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Alignment {
    /// Fail with `DestinationMismatch` or `LengthMismatch` before anything is written.
    #[default]
    Strict,
    /// Keep the common prefix of all three lists and drop the rest.
    Truncate,
}

/// Pair descriptors, destinations and urls by position.
pub fn align(
    objects: &[ObjectDescriptor],
    destinations: &[PathBuf],
    urls: Vec<String>,
    alignment: Alignment,
) -> DepotResult<Vec<ResolvedObject>> {
    let mismatch = || DepotError::LengthMismatch {
        objects: objects.len(),
        destinations: destinations.len(),
        urls: urls.len(),
    };
    let aligned = objects.len() == destinations.len() && objects.len() == urls.len();
    if !aligned {
        match alignment {
            Alignment::Strict => return Err(mismatch()),
            Alignment::Truncate => warn!("{}; writing the common prefix only", mismatch()),
        }
    }

    Ok(destinations
        .iter()
        .zip(objects)
        .zip(urls)
        .map(|((destination, descriptor), presigned_url)| ResolvedObject {
            destination: destination.clone(),
            descriptor: descriptor.clone(),
            presigned_url,
        })
        .collect())
}

/// Resolves and fetches batches of depot objects, one at a time.
#[derive(Clone, Debug)]
pub struct ObjectDownloader {
    client: Client,
    resolver: BulkUrlResolver,
    alignment: Alignment,
    verbose: bool,
}

impl ObjectDownloader {
    pub fn new(client: Client, resolver: BulkUrlResolver) -> Self {
        Self {
            client,
            resolver,
            alignment: Alignment::default(),
            verbose: false,
        }
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Report every object written at `info` rather than `debug`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Download `objects[i]` into `destinations[i]` for every i.
    ///
    /// Parent directories must already exist. Existing files are truncated.
    /// Returns the number of files written.
    pub async fn download_objects(
        &self,
        objects: &[ObjectDescriptor],
        destinations: &[PathBuf],
    ) -> DepotResult<usize> {
        if self.alignment == Alignment::Strict && objects.len() != destinations.len() {
            return Err(DepotError::DestinationMismatch {
                objects: objects.len(),
                destinations: destinations.len(),
            });
        }

        let urls = self.resolver.resolve(objects).await?;
        let resolved = align(objects, destinations, urls, self.alignment)?;

        for (index, object) in resolved.iter().enumerate() {
            self.fetch_to_file(index, object).await?;
        }

        Ok(resolved.len())
    }

    async fn fetch_to_file(&self, index: usize, object: &ResolvedObject) -> DepotResult<()> {
        let out_path = path::absolute(&object.destination)?;
        let mut file = File::create(&out_path).await?;

        if self.verbose {
            info!(
                "Writing instance number {} to file at {}",
                index,
                out_path.display()
            );
        } else {
            debug!(
                "Writing instance number {} to file at {}",
                index,
                out_path.display()
            );
        }

        let response = self
            .client
            .get(&object.presigned_url)
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut size_bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(
            "wrote {} bytes of {}/{}",
            size_bytes, object.descriptor.directory, object.descriptor.object_key
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    fn descriptors(keys: &[&str]) -> Vec<ObjectDescriptor> {
        keys.iter()
            .map(|k| ObjectDescriptor::new("series/1", *k))
            .collect()
    }

    fn destinations(dir: &TempDir, keys: &[&str]) -> Vec<PathBuf> {
        keys.iter().map(|k| dir.path().join(k)).collect()
    }

    #[test]
    fn align_pairs_by_position() {
        let objects = descriptors(&["a", "b"]);
        let dests = vec![PathBuf::from("/out/a"), PathBuf::from("/out/b")];
        let resolved = align(
            &objects,
            &dests,
            vec!["u-a".into(), "u-b".into()],
            Alignment::Strict,
        )
        .unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].destination, PathBuf::from("/out/b"));
        assert_eq!(resolved[1].descriptor.object_key, "b");
        assert_eq!(resolved[1].presigned_url, "u-b");
    }

    #[test]
    fn align_strict_rejects_short_url_list() {
        let objects = descriptors(&["a", "b"]);
        let dests = vec![PathBuf::from("a"), PathBuf::from("b")];
        let err = align(&objects, &dests, vec!["u-a".into()], Alignment::Strict).unwrap_err();

        assert!(matches!(
            err,
            DepotError::LengthMismatch {
                objects: 2,
                destinations: 2,
                urls: 1
            }
        ));
    }

    #[test]
    fn align_truncate_keeps_shortest_prefix() {
        let objects = descriptors(&["a", "b", "c"]);
        let dests = vec![PathBuf::from("a"), PathBuf::from("b")];
        let urls = vec!["u-a".into(), "u-b".into(), "u-c".into()];
        let resolved = align(&objects, &dests, urls, Alignment::Truncate).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].presigned_url, "u-a");
    }

    #[tokio::test]
    async fn writes_single_object_from_presigned_url() {
        let server = MockServer::start().await;
        let out = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .and(path(BULK_PATH))
            .and(body_json(json!([{"directory": "a", "objectKey": "x.dcm"}])))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([format!("{}/x", server.uri())])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"DICM\x00\x01".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dest = out.path().join("x.dcm");
        let written = downloader_for(&server)
            .download_objects(&[ObjectDescriptor::new("a", "x.dcm")], &[dest.clone()])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(fs::read(dest).unwrap(), b"DICM\x00\x01");
    }

    #[tokio::test]
    async fn each_file_receives_bytes_for_its_own_index() {
        let server = MockServer::start().await;
        mount_depot(&server, Some(1)).await;
        let out = TempDir::new().unwrap();
        let keys = ["1.dcm", "2.dcm", "3.dcm", "1.dcm"];
        // Duplicate descriptor, distinct destination: fetched twice.
        let mut dests = destinations(&out, &keys[..3]);
        dests.push(out.path().join("again.dcm"));

        let written = downloader_for(&server)
            .download_objects(&descriptors(&keys), &dests)
            .await
            .unwrap();

        assert_eq!(written, 4);
        for (key, dest) in keys.iter().zip(&dests) {
            assert_eq!(
                fs::read(dest).unwrap(),
                body_for(&format!("/objects/series/1/{key}"))
            );
        }
    }

    #[tokio::test]
    async fn empty_batch_resolves_once_and_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BULK_PATH))
            .and(body_json(json!([])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        let out = TempDir::new().unwrap();

        let written = downloader_for(&server)
            .download_objects(&[], &[])
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn mismatched_inputs_fail_before_resolution() {
        let server = MockServer::start().await;
        mount_depot(&server, Some(0)).await;
        let out = TempDir::new().unwrap();

        let err = downloader_for(&server)
            .download_objects(
                &descriptors(&["a", "b"]),
                &destinations(&out, &["a"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DepotError::DestinationMismatch {
                objects: 2,
                destinations: 1
            }
        ));
        assert_eq!(
            err.to_string(),
            "object list misaligned: 2 objects, 1 destinations"
        );
    }

    #[tokio::test]
    async fn short_resolution_writes_nothing_when_strict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BULK_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([format!("{}/a", server.uri())])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .expect(0)
            .mount(&server)
            .await;
        let out = TempDir::new().unwrap();
        let keys = ["a", "b", "c"];

        let err = downloader_for(&server)
            .download_objects(&descriptors(&keys), &destinations(&out, &keys))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DepotError::LengthMismatch {
                objects: 3,
                destinations: 3,
                urls: 1
            }
        ));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn short_resolution_writes_common_prefix_when_truncating() {
        let server = MockServer::start().await;
        let uri = server.uri();
        Mock::given(method("POST"))
            .and(path(BULK_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([
                    format!("{uri}/objects/series/1/a"),
                    format!("{uri}/objects/series/1/b"),
                ])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ObjectEcho)
            .expect(2)
            .mount(&server)
            .await;
        let out = TempDir::new().unwrap();
        let keys = ["a", "b", "c"];
        let dests = destinations(&out, &keys);

        let written = downloader_for(&server)
            .with_alignment(Alignment::Truncate)
            .download_objects(&descriptors(&keys), &dests)
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert!(dests[0].exists());
        assert!(dests[1].exists());
        assert!(!dests[2].exists());
    }

    #[tokio::test]
    async fn failure_keeps_earlier_files_and_skips_later_ones() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BULK_PATH))
            .respond_with(PresignEcho { base: server.uri() })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/objects/series/1/b"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/objects/series/1/c"))
            .respond_with(ObjectEcho)
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/objects/series/1/a"))
            .respond_with(ObjectEcho)
            .expect(1)
            .mount(&server)
            .await;
        let out = TempDir::new().unwrap();
        let keys = ["a", "b", "c"];
        let dests = destinations(&out, &keys);

        let err = downloader_for(&server)
            .download_objects(&descriptors(&keys), &dests)
            .await
            .unwrap_err();

        assert!(matches!(err, DepotError::Transport(_)));
        assert_eq!(
            fs::read(&dests[0]).unwrap(),
            body_for("/objects/series/1/a")
        );
        assert!(!dests[2].exists());
    }

    #[tokio::test]
    async fn existing_files_are_truncated() {
        let server = MockServer::start().await;
        mount_depot(&server, None).await;
        let out = TempDir::new().unwrap();
        let dest = out.path().join("a");
        fs::write(&dest, vec![b'z'; 4096]).unwrap();

        downloader_for(&server)
            .download_objects(&descriptors(&["a"]), &[dest.clone()])
            .await
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), body_for("/objects/series/1/a"));
    }

    #[tokio::test]
    async fn missing_parent_directory_is_an_io_error() {
        let server = MockServer::start().await;
        mount_depot(&server, None).await;
        let out = TempDir::new().unwrap();

        let err = downloader_for(&server)
            .download_objects(
                &descriptors(&["a"]),
                &[out.path().join("absent").join("a")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DepotError::Io(_)));
    }

    #[tokio::test]
    async fn verbose_mode_only_changes_progress_output() {
        let server = MockServer::start().await;
        mount_depot(&server, Some(2)).await;
        let quiet = TempDir::new().unwrap();
        let loud = TempDir::new().unwrap();
        let keys = ["a", "b"];

        let quiet_logs = CapturedLogs::default();
        {
            let _guard = quiet_logs.install();
            downloader_for(&server)
                .download_objects(&descriptors(&keys), &destinations(&quiet, &keys))
                .await
                .unwrap();
        }
        let loud_logs = CapturedLogs::default();
        {
            let _guard = loud_logs.install();
            downloader_for(&server)
                .with_verbose(true)
                .download_objects(&descriptors(&keys), &destinations(&loud, &keys))
                .await
                .unwrap();
        }

        for key in keys {
            assert_eq!(
                fs::read(quiet.path().join(key)).unwrap(),
                fs::read(loud.path().join(key)).unwrap()
            );
        }

        assert!(!quiet_logs.contents().contains("Writing instance number"));
        let loud_output = loud_logs.contents();
        for (index, key) in keys.iter().enumerate() {
            let line = loud_output
                .lines()
                .find(|l| l.contains(&format!("Writing instance number {index} to file at")))
                .unwrap_or_else(|| panic!("no progress line for {index} in {loud_output:?}"));
            assert!(line.contains("INFO"), "{line}");
            assert!(line.ends_with(&loud.path().join(key).display().to_string()), "{line}");
        }
    }
}
