use ociclient::CanonicalReference;
use tracing::{debug, info};

use crate::error::PurgeError;
use crate::registry::{BlobReclaimer, Registry};

/// Unlink a blob from its repository, then reclaim its backing data.
///
/// Reclamation is skipped when the unlink fails: the blob may still be reachable.
pub async fn evict_blob(
    registry: &dyn Registry,
    reclaimer: &dyn BlobReclaimer,
    reference: &CanonicalReference,
) -> Result<(), PurgeError> {
    let eviction_failed = |source| PurgeError::BlobEviction {
        reference: reference.clone(),
        source,
    };

    let repository = registry
        .repository(reference.name())
        .await
        .map_err(eviction_failed)?;
    repository
        .blobs()
        .delete(reference.digest())
        .await
        .map_err(eviction_failed)?;
    debug!("Unlinked blob {}", reference);

    reclaimer
        .reclaim_blob(reference.digest())
        .await
        .map_err(|source| PurgeError::StorageReclamation {
            digest: reference.digest().clone(),
            source,
        })
}

/// Delete a manifest revision. There is no way back from this one.
pub async fn evict_manifest(
    registry: &dyn Registry,
    reference: &CanonicalReference,
) -> Result<(), PurgeError> {
    let eviction_failed = |source| PurgeError::ManifestEviction {
        reference: reference.clone(),
        source,
    };

    let repository = registry
        .repository(reference.name())
        .await
        .map_err(eviction_failed)?;
    repository
        .manifests()
        .delete(reference.digest())
        .await
        .map_err(eviction_failed)?;

    info!("Deleted manifest {}", reference);
    Ok(())
}
