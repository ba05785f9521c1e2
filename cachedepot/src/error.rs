use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use config::ConfigError;
use ociclient::{CanonicalReference, ManifestError, OciDigest, ReferenceError};
use thiserror::Error;

use crate::api::models::{ErrorInfo, ErrorResponse};
use crate::purge::PurgeFailure;

/// Errors reported by the cache store collaborators
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Blob unknown to repository: {0}")]
    BlobUnknown(OciDigest),

    #[error("Manifest unknown: {name}@{digest}")]
    ManifestUnknown { name: String, digest: OciDigest },

    #[error("Tag unknown: {name}:{tag}")]
    TagUnknown { name: String, tag: String },

    #[error("Invalid tag: {0}")]
    TagInvalid(String),

    #[error("Invalid repository name: {0}")]
    NameInvalid(#[from] ReferenceError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Storage error: {0}")]
    Storage(#[from] opendal::Error),

    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a manifest could not be fetched
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unsupported manifest type: {0}")]
    UnsupportedManifestType(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while purging an image from the cache
#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("Invalid reference: {0}")]
    ReferenceParse(#[from] ReferenceError),

    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(#[from] FetchError),

    #[error("Failed to evict blob {reference}: {source}")]
    BlobEviction {
        reference: CanonicalReference,
        #[source]
        source: StoreError,
    },

    #[error("Failed to reclaim storage for {digest}: {source}")]
    StorageReclamation {
        digest: OciDigest,
        #[source]
        source: StoreError,
    },

    #[error("Failed to evict manifest {reference}: {source}")]
    ManifestEviction {
        reference: CanonicalReference,
        #[source]
        source: StoreError,
    },
}

impl PurgeError {
    /// Whether this error aborts the purge
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PurgeError::BlobEviction { .. } | PurgeError::StorageReclamation { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] opendal::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Purge(#[from] PurgeFailure),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Clients only ever see one error kind; the detail carries the cause.
        let body = ErrorResponse {
            errors: vec![ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "unknown error".to_string(),
                detail: Some(serde_json::Value::String(self.to_string())),
            }],
        };

        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
