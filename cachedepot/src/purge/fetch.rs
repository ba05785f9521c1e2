use ociclient::{ImageManifest, ManifestVariant, OciDigest, Reference};
use tracing::debug;

use crate::error::FetchError;
use crate::registry::{ManifestOption, Repository};

/// Digest of the manifest `tag` currently points at
pub async fn resolve_tag(repository: &dyn Repository, tag: &str) -> Result<OciDigest, FetchError> {
    let descriptor = repository.tags().get(tag).await?;
    debug!("Tag {}:{} resolved to {}", repository.name(), tag, descriptor.digest);
    Ok(descriptor.digest)
}

/// Fetch the image manifest `reference` names.
///
/// Only Docker schema 2 manifests carry a layer list we know how to walk; every
/// other kind is rejected.
pub async fn fetch_manifest(
    repository: &dyn Repository,
    reference: &Reference,
) -> Result<ImageManifest, FetchError> {
    let (digest, options) = match reference {
        Reference::Tag(tag) => (
            resolve_tag(repository, tag).await?,
            vec![ManifestOption::WithTag(tag.clone())],
        ),
        Reference::Digest(digest) => (digest.clone(), Vec::new()),
    };

    match repository.manifests().get(&digest, &options).await? {
        ManifestVariant::Schema2(manifest) => Ok(manifest),
        other => Err(FetchError::UnsupportedManifestType(other.kind())),
    }
}
