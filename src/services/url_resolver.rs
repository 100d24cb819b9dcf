//! Bulk presigned-url resolution against the depot API.

use crate::{errors::DepotResult, models::descriptor::ObjectDescriptor};
use reqwest::{Client, Url};
use tracing::debug;

/// Turns descriptors into time-limited download urls with one POST.
///
/// The endpoint answers with a JSON array of urls in request order. Nothing
/// in the response ties a url back to its descriptor, so order is the only
/// join key.
#[derive(Clone, Debug)]
pub struct BulkUrlResolver {
    client: Client,
    endpoint: Url,
}

impl BulkUrlResolver {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// Resolve every descriptor in a single request. No retries.
    pub async fn resolve(&self, objects: &[ObjectDescriptor]) -> DepotResult<Vec<String>> {
        debug!(
            "requesting {} presigned urls from {}",
            objects.len(),
            self.endpoint
        );
        let urls = self
            .client
            .post(self.endpoint.clone())
            .json(objects)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<String>>()
            .await?;
        debug!("received {} presigned urls", urls.len());
        Ok(urls)
    }
}
