//! Interfaces the purge path consumes from the cache registry.
//!
//! The purge logic only ever talks to these traits; [`crate::storage::CacheStore`]
//! is the opendal-backed implementation the daemon wires in.

use std::sync::Arc;

use async_trait::async_trait;
use ociclient::{Descriptor, ManifestVariant, OciDigest};

use crate::error::StoreError;

/// Options passed along with a manifest lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOption {
    /// The manifest is being fetched on behalf of this tag
    WithTag(String),
}

#[async_trait]
pub trait ManifestService: Send + Sync {
    async fn get(
        &self,
        digest: &OciDigest,
        options: &[ManifestOption],
    ) -> Result<ManifestVariant, StoreError>;

    async fn delete(&self, digest: &OciDigest) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TagService: Send + Sync {
    /// Descriptor of the manifest currently tagged `tag`
    async fn get(&self, tag: &str) -> Result<Descriptor, StoreError>;
}

#[async_trait]
pub trait BlobService: Send + Sync {
    /// Remove the blob from this repository's index; backing data is left alone
    async fn delete(&self, digest: &OciDigest) -> Result<(), StoreError>;
}

/// A named repository in the cache
pub trait Repository: Send + Sync {
    fn name(&self) -> &str;
    fn manifests(&self) -> Arc<dyn ManifestService>;
    fn tags(&self) -> Arc<dyn TagService>;
    fn blobs(&self) -> Arc<dyn BlobService>;
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn repository(&self, name: &str) -> Result<Arc<dyn Repository>, StoreError>;
}

/// Frees the backing storage of a blob once nothing links to it
#[async_trait]
pub trait BlobReclaimer: Send + Sync {
    async fn reclaim_blob(&self, digest: &OciDigest) -> Result<(), StoreError>;
}
