use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ociclient::{Descriptor, ManifestVariant, OciDigest, is_valid_tag, validate_name};
use opendal::services::Fs;
use opendal::services::S3;
use opendal::Operator;
use tracing::{debug, warn};

use crate::config::{AppConfig, StorageBackend};
use crate::error::{AppError, Result, StoreError};
use crate::registry::{
    BlobService, ManifestOption, ManifestService, Registry, Repository, TagService,
};

// Layout:
//   blobs/{alg}/{hex}                                      blob data, shared
//   repositories/{name}/_layers/{alg}/{hex}                repository blob link
//   repositories/{name}/_manifests/revisions/{alg}/{hex}   manifest payload
//   repositories/{name}/_manifests/tags/{tag}              descriptor json

pub(crate) fn blob_data_path(digest: &OciDigest) -> String {
    format!("blobs/{}/{}", digest.algorithm(), digest.hex())
}

fn layer_link_path(name: &str, digest: &OciDigest) -> String {
    format!("repositories/{name}/_layers/{}/{}", digest.algorithm(), digest.hex())
}

fn revision_path(name: &str, digest: &OciDigest) -> String {
    format!(
        "repositories/{name}/_manifests/revisions/{}/{}",
        digest.algorithm(),
        digest.hex()
    )
}

fn tags_dir(name: &str) -> String {
    format!("repositories/{name}/_manifests/tags/")
}

fn tag_path(name: &str, tag: &str) -> String {
    format!("repositories/{name}/_manifests/tags/{tag}")
}

/// The local cache: blob data plus per-repository links, manifests and tags
#[derive(Debug, Clone)]
pub struct CacheStore {
    operator: Operator,
}

impl CacheStore {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let operator = match config.storage.backend {
            StorageBackend::Fs => {
                let root = config.storage.fs_root.clone()
                    .ok_or_else(|| AppError::Config("Missing fs_root configuration".to_string()))?;

                let mut builder = Fs::default();
                builder.root(&root.to_string_lossy());

                Operator::new(builder)
                    .map_err(AppError::Storage)?
                    .finish()
            }
            StorageBackend::S3 => {
                let bucket = config.storage.s3_bucket.clone()
                    .ok_or_else(|| AppError::Config("Missing s3_bucket configuration".to_string()))?;
                let region = config.storage.s3_region.clone()
                    .ok_or_else(|| AppError::Config("Missing s3_region configuration".to_string()))?;

                let mut builder = S3::default();
                builder.bucket(&bucket);
                builder.region(&region);

                if let Some(endpoint) = &config.storage.s3_endpoint {
                    builder.endpoint(endpoint);
                }

                if let Some(access_key) = &config.storage.s3_access_key {
                    builder.access_key_id(access_key);
                }

                if let Some(secret_key) = &config.storage.s3_secret_key {
                    builder.secret_access_key(secret_key);
                }

                Operator::new(builder)
                    .map_err(AppError::Storage)?
                    .finish()
            }
        };

        Ok(Self { operator })
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    fn open(&self, name: &str) -> CacheRepository {
        CacheRepository {
            name: name.to_string(),
            operator: self.operator.clone(),
        }
    }

    // Cache fill. The proxy path that normally populates the cache lives elsewhere.

    pub async fn put_blob(&self, content: Bytes) -> std::result::Result<OciDigest, StoreError> {
        let digest = OciDigest::from_content(&content);
        self.operator.write(&blob_data_path(&digest), content).await?;
        Ok(digest)
    }

    pub async fn link_blob(&self, name: &str, digest: &OciDigest) -> std::result::Result<(), StoreError> {
        validate_name(name)?;
        self.operator
            .write(&layer_link_path(name, digest), digest.to_string())
            .await?;
        Ok(())
    }

    /// Store a manifest revision and return the digest it is filed under.
    ///
    /// Image manifests are filed under their config digest, anything else under
    /// the digest of the payload. Two image manifests sharing a config therefore
    /// share a revision: the later write replaces the earlier one. An image
    /// manifest cannot be looked up by the digest of its own payload.
    pub async fn put_manifest(&self, name: &str, payload: Bytes) -> std::result::Result<OciDigest, StoreError> {
        validate_name(name)?;
        let digest = match ManifestVariant::decode(&payload)? {
            ManifestVariant::Schema2(manifest) | ManifestVariant::OciImage(manifest) => {
                manifest.config.digest
            }
            _ => OciDigest::from_content(&payload),
        };
        self.operator.write(&revision_path(name, &digest), payload).await?;
        Ok(digest)
    }

    pub async fn tag_manifest(&self, name: &str, tag: &str, digest: &OciDigest) -> std::result::Result<(), StoreError> {
        validate_name(name)?;
        if !is_valid_tag(tag) {
            return Err(StoreError::TagInvalid(tag.to_string()));
        }

        let path = revision_path(name, digest);
        if !self.operator.is_exist(&path).await? {
            return Err(StoreError::ManifestUnknown {
                name: name.to_string(),
                digest: digest.clone(),
            });
        }
        let payload = self.operator.read(&path).await?;
        let media_type = serde_json::from_slice::<serde_json::Value>(&payload)?
            .get("mediaType")
            .and_then(|v| v.as_str())
            .unwrap_or(ociclient::models::MEDIA_TYPE_OCI_MANIFEST)
            .to_string();

        let descriptor = Descriptor {
            media_type,
            digest: digest.clone(),
            size: payload.len() as i64,
        };
        self.operator
            .write(&tag_path(name, tag), serde_json::to_vec(&descriptor)?)
            .await?;
        Ok(())
    }

    // Inspection

    pub async fn blob_exists(&self, digest: &OciDigest) -> std::result::Result<bool, StoreError> {
        Ok(self.operator.is_exist(&blob_data_path(digest)).await?)
    }

    pub async fn blob_linked(&self, name: &str, digest: &OciDigest) -> std::result::Result<bool, StoreError> {
        Ok(self.operator.is_exist(&layer_link_path(name, digest)).await?)
    }

    pub async fn manifest_exists(&self, name: &str, digest: &OciDigest) -> std::result::Result<bool, StoreError> {
        Ok(self.operator.is_exist(&revision_path(name, digest)).await?)
    }

    pub async fn tag_exists(&self, name: &str, tag: &str) -> std::result::Result<bool, StoreError> {
        Ok(is_valid_tag(tag) && self.operator.is_exist(&tag_path(name, tag)).await?)
    }
}

#[async_trait]
impl Registry for CacheStore {
    async fn repository(&self, name: &str) -> std::result::Result<Arc<dyn Repository>, StoreError> {
        validate_name(name)?;
        Ok(Arc::new(self.open(name)))
    }
}

/// One repository inside the [`CacheStore`]
#[derive(Debug, Clone)]
pub struct CacheRepository {
    name: String,
    operator: Operator,
}

impl CacheRepository {
    fn manifest_unknown(&self, digest: &OciDigest) -> StoreError {
        StoreError::ManifestUnknown {
            name: self.name.clone(),
            digest: digest.clone(),
        }
    }

    /// Drop every tag that points at `digest`.
    ///
    /// Tags that vanish underneath us or don't decode are skipped; they can't
    /// point at `digest` anyway.
    async fn untag(&self, digest: &OciDigest) -> std::result::Result<(), StoreError> {
        let dir = tags_dir(&self.name);
        if !self.operator.is_exist(&dir).await? {
            return Ok(());
        }

        for entry in self.operator.list(&dir).await? {
            if entry.metadata().is_dir() {
                continue;
            }
            let path = tag_path(&self.name, entry.name());
            let data = match self.operator.read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == opendal::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let descriptor: Descriptor = match serde_json::from_slice(&data) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Skipping unreadable tag {}:{}: {}", self.name, entry.name(), e);
                    continue;
                }
            };
            if &descriptor.digest == digest {
                debug!("Removing tag {}:{}", self.name, entry.name());
                self.operator.delete(&path).await?;
            }
        }
        Ok(())
    }
}

impl Repository for CacheRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn manifests(&self) -> Arc<dyn ManifestService> {
        Arc::new(self.clone())
    }

    fn tags(&self) -> Arc<dyn TagService> {
        Arc::new(self.clone())
    }

    fn blobs(&self) -> Arc<dyn BlobService> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ManifestService for CacheRepository {
    async fn get(
        &self,
        digest: &OciDigest,
        options: &[ManifestOption],
    ) -> std::result::Result<ManifestVariant, StoreError> {
        for option in options {
            match option {
                ManifestOption::WithTag(tag) => {
                    debug!("Fetching {}@{} on behalf of tag {}", self.name, digest, tag)
                }
            }
        }

        let path = revision_path(&self.name, digest);
        if !self.operator.is_exist(&path).await? {
            return Err(self.manifest_unknown(digest));
        }
        let payload = self.operator.read(&path).await?;
        Ok(ManifestVariant::decode(&payload)?)
    }

    async fn delete(&self, digest: &OciDigest) -> std::result::Result<(), StoreError> {
        let path = revision_path(&self.name, digest);
        if !self.operator.is_exist(&path).await? {
            return Err(self.manifest_unknown(digest));
        }
        // Tags go first so a failure here leaves the revision in place.
        self.untag(digest).await?;
        self.operator.delete(&path).await?;
        Ok(())
    }
}

#[async_trait]
impl TagService for CacheRepository {
    async fn get(&self, tag: &str) -> std::result::Result<Descriptor, StoreError> {
        let unknown = || StoreError::TagUnknown {
            name: self.name.clone(),
            tag: tag.to_string(),
        };
        if !is_valid_tag(tag) {
            return Err(unknown());
        }

        let path = tag_path(&self.name, tag);
        if !self.operator.is_exist(&path).await? {
            return Err(unknown());
        }
        let data = self.operator.read(&path).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[async_trait]
impl BlobService for CacheRepository {
    async fn delete(&self, digest: &OciDigest) -> std::result::Result<(), StoreError> {
        let path = layer_link_path(&self.name, digest);
        if !self.operator.is_exist(&path).await? {
            return Err(StoreError::BlobUnknown(digest.clone()));
        }
        self.operator.delete(&path).await?;
        Ok(())
    }
}
