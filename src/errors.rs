//! Error types shared by the depot services.

use std::io;
use thiserror::Error;

/// Problems found while assembling configuration, before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(String),
    #[error("environment variable `{0}` is not valid unicode")]
    NotUnicode(String),
    #[error("`{name}` has invalid value `{value}`: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum DepotError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("object list misaligned: {objects} objects, {destinations} destinations")]
    DestinationMismatch {
        objects: usize,
        destinations: usize,
    },
    #[error(
        "object list misaligned: {objects} objects, {destinations} destinations, {urls} presigned urls"
    )]
    LengthMismatch {
        objects: usize,
        destinations: usize,
        urls: usize,
    },
    #[error("no patient with identifier `{0}`")]
    PatientNotFound(String),
    #[error("`{0}` cannot be used as a path segment")]
    InvalidPathSegment(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type DepotResult<T> = Result<T, DepotError>;
