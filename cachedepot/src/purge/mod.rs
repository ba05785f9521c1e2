//! Cascading delete of a cached image: layers first, then the manifest.
//!
//! Layer evictions are best effort. A layer that is already gone, or whose data
//! could not be reclaimed, is recorded and skipped; the manifest is still
//! evicted afterwards. A failed manifest eviction fails the whole purge, but
//! the layers evicted before it stay evicted.

pub mod evict;
pub mod fetch;

#[cfg(test)]
pub(crate) mod fakes;

use std::fmt;

use ociclient::{CanonicalReference, OciDigest, Reference, RepositoryName};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::error::PurgeError;
use crate::registry::{BlobReclaimer, Registry};

pub use evict::{evict_blob, evict_manifest};
pub use fetch::{fetch_manifest, resolve_tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeState {
    Idle,
    Resolving,
    Fetching,
    EvictingLayers,
    EvictingManifest,
    Done,
    Failed,
}

impl fmt::Display for PurgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PurgeState::Idle => "idle",
            PurgeState::Resolving => "resolving",
            PurgeState::Fetching => "fetching",
            PurgeState::EvictingLayers => "evicting layers",
            PurgeState::EvictingManifest => "evicting manifest",
            PurgeState::Done => "done",
            PurgeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to one layer
#[derive(Debug)]
pub struct LayerOutcome {
    pub digest: OciDigest,
    pub result: Result<(), PurgeError>,
}

impl LayerOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A purge that reached the end
#[derive(Debug)]
pub struct PurgeReport {
    pub repository: String,
    pub manifest_digest: OciDigest,
    pub layers: Vec<LayerOutcome>,
}

impl PurgeReport {
    pub fn failed_layers(&self) -> usize {
        self.layers.iter().filter(|l| !l.is_ok()).count()
    }
}

/// A purge that stopped early
#[derive(Debug, Error)]
#[error("purge failed while {state}: {source}")]
pub struct PurgeFailure {
    /// Stage the fatal error happened in
    pub state: PurgeState,
    /// Layer outcomes recorded before the failure
    pub layers: Vec<LayerOutcome>,
    pub source: PurgeError,
}

/// Drives one purge against an explicitly supplied registry.
pub struct DeleteOrchestrator<'a> {
    registry: &'a dyn Registry,
    reclaimer: &'a dyn BlobReclaimer,
    state: PurgeState,
}

impl<'a> DeleteOrchestrator<'a> {
    pub fn new(registry: &'a dyn Registry, reclaimer: &'a dyn BlobReclaimer) -> Self {
        Self {
            registry,
            reclaimer,
            state: PurgeState::Idle,
        }
    }

    pub fn state(&self) -> PurgeState {
        self.state
    }

    fn transition(&mut self, next: PurgeState) {
        debug!("Purge state {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, layers: Vec<LayerOutcome>, source: PurgeError) -> PurgeFailure {
        let failure = PurgeFailure {
            state: self.state,
            layers,
            source,
        };
        error!("{}", failure);
        self.transition(PurgeState::Failed);
        failure
    }

    /// Purge the image `name` referenced by `reference` (a tag or a digest).
    #[instrument(name = "purge", skip(self))]
    pub async fn purge(&mut self, name: &str, reference: &str) -> Result<PurgeReport, PurgeFailure> {
        self.transition(PurgeState::Resolving);
        let repository_name: RepositoryName = match name.parse() {
            Ok(repository_name) => repository_name,
            Err(e) => return Err(self.fail(Vec::new(), PurgeError::ReferenceParse(e))),
        };
        let reference = Reference::resolve(reference);

        self.transition(PurgeState::Fetching);
        let repository = match self.registry.repository(name).await {
            Ok(repository) => repository,
            Err(e) => return Err(self.fail(Vec::new(), PurgeError::ManifestFetch(e.into()))),
        };
        let manifest = match fetch_manifest(repository.as_ref(), &reference).await {
            Ok(manifest) => manifest,
            Err(e) => return Err(self.fail(Vec::new(), e.into())),
        };

        self.transition(PurgeState::EvictingLayers);
        info!("Evicting {} layers of {}:{}", manifest.layers.len(), name, reference);
        let mut layers = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            info!("Layer digest: {}", layer.digest);
            let blob = CanonicalReference::from_parts(repository_name.clone(), layer.digest.clone());
            let result = evict_blob(self.registry, self.reclaimer, &blob).await;
            if let Err(e) = &result {
                warn!("Skipping layer {}: {}", layer.digest, e);
            }
            layers.push(LayerOutcome {
                digest: layer.digest.clone(),
                result,
            });
        }

        self.transition(PurgeState::EvictingManifest);
        let manifest_digest = manifest.digest().clone();
        let target = CanonicalReference::from_parts(repository_name, manifest_digest.clone());
        if let Err(e) = evict_manifest(self.registry, &target).await {
            return Err(self.fail(layers, e));
        }

        self.transition(PurgeState::Done);
        let report = PurgeReport {
            repository: name.to_string(),
            manifest_digest,
            layers,
        };
        info!(
            "Purged {}:{} ({} layers, {} skipped)",
            name,
            reference,
            report.layers.len(),
            report.failed_layers()
        );
        Ok(report)
    }
}
