use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::digest::OciDigest;

pub const MEDIA_TYPE_DOCKER_MANIFEST_V2: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Error type for manifest decoding
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown manifest schema: version {schema_version}, media type {media_type:?}")]
    UnknownSchema {
        schema_version: i64,
        media_type: Option<String>,
    },
}

/// Represents a descriptor for a content blob in an OCI registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    pub media_type: String,
    /// Digest of the referenced content
    pub digest: OciDigest,
    /// Size of the referenced content in bytes
    pub size: i64,
}

/// Represents an image manifest (Docker schema 2 or OCI image manifest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version of the manifest
    pub schema_version: i32,
    /// Media type of the manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Descriptor for the config blob
    pub config: Descriptor,
    /// Descriptors for the layer blobs
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    /// Build a Docker schema 2 manifest
    pub fn schema2(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_DOCKER_MANIFEST_V2.to_string()),
            config,
            layers,
        }
    }

    /// Digest the cache files this manifest's revision under
    pub fn digest(&self) -> &OciDigest {
        &self.config.digest
    }
}

/// Represents a manifest list / image index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifestList {
    /// Schema version of the manifest list
    pub schema_version: i32,
    /// Media type of the manifest list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// List of manifests
    pub manifests: Vec<Descriptor>,
}

/// A decoded manifest, tagged by the schema it was written in
#[derive(Debug, Clone)]
pub enum ManifestVariant {
    /// Docker image manifest, schema version 1 (signed, not decoded further)
    Schema1,
    /// Docker image manifest, schema version 2
    Schema2(ImageManifest),
    /// OCI image manifest
    OciImage(ImageManifest),
    /// Docker manifest list
    List(ImageManifestList),
    /// OCI image index
    Index(ImageManifestList),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestHeader {
    schema_version: i64,
    #[serde(default)]
    media_type: Option<String>,
}

impl ManifestVariant {
    /// Decode a manifest payload, dispatching on its schema version and media type
    pub fn decode(payload: &[u8]) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_slice(payload)?;
        let header: ManifestHeader = serde_json::from_value(value.clone())?;

        let variant = match (header.schema_version, header.media_type.as_deref()) {
            (1, _) => ManifestVariant::Schema1,
            (2, Some(MEDIA_TYPE_DOCKER_MANIFEST_V2)) => {
                ManifestVariant::Schema2(serde_json::from_value(value)?)
            }
            (2, Some(MEDIA_TYPE_OCI_MANIFEST)) => {
                ManifestVariant::OciImage(serde_json::from_value(value)?)
            }
            (2, Some(MEDIA_TYPE_DOCKER_MANIFEST_LIST)) => {
                ManifestVariant::List(serde_json::from_value(value)?)
            }
            (2, Some(MEDIA_TYPE_OCI_INDEX)) => {
                ManifestVariant::Index(serde_json::from_value(value)?)
            }
            // OCI allows the media type to be omitted
            (2, None) if value.get("manifests").is_some() => {
                ManifestVariant::Index(serde_json::from_value(value)?)
            }
            (2, None) => ManifestVariant::OciImage(serde_json::from_value(value)?),
            (schema_version, media_type) => {
                return Err(ManifestError::UnknownSchema {
                    schema_version,
                    media_type: media_type.map(str::to_string),
                });
            }
        };

        Ok(variant)
    }

    /// Human readable name of the schema
    pub fn kind(&self) -> &'static str {
        match self {
            ManifestVariant::Schema1 => "docker schema1 manifest",
            ManifestVariant::Schema2(_) => "docker schema2 manifest",
            ManifestVariant::OciImage(_) => "oci image manifest",
            ManifestVariant::List(_) => "docker manifest list",
            ManifestVariant::Index(_) => "oci image index",
        }
    }
}
