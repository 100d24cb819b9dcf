//! Identifies one object in depot storage and where it lands locally.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One object in the depot bucket, in the shape the bulk presign endpoint expects.
///
/// No uniqueness is enforced: the same descriptor may appear several times in
/// a batch and is downloaded once per occurrence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// Directory of the object inside the bucket.
    pub directory: String,

    /// File name of the object inside `directory`.
    pub object_key: String,
}

impl ObjectDescriptor {
    pub fn new(directory: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            object_key: object_key.into(),
        }
    }

    /// Split a stored content url at its last `/`.
    ///
    /// Trailing slashes are trimmed from the directory unless it consists of
    /// slashes only. A url without any `/` has an empty directory.
    pub fn from_content_url(content_url: &str) -> Self {
        match content_url.rsplit_once('/') {
            Some((head, tail)) => {
                let trimmed = head.trim_end_matches('/');
                let directory = if trimmed.is_empty() {
                    // `/key` or `//key`: keep the root as written.
                    format!("{head}/")
                } else {
                    trimmed.to_string()
                };
                Self::new(directory, tail)
            }
            None => Self::new("", content_url),
        }
    }
}

/// A descriptor joined with its destination and presigned url.
///
/// Built once right after resolution so later stages never index into
/// parallel lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedObject {
    pub destination: PathBuf,
    pub descriptor: ObjectDescriptor,
    pub presigned_url: String,
}
