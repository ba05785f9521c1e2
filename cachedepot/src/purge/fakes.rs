//! In-memory registry that records every call made against it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ociclient::models::{MEDIA_TYPE_DOCKER_CONFIG, MEDIA_TYPE_DOCKER_LAYER, MEDIA_TYPE_OCI_INDEX};
use ociclient::{Descriptor, ImageManifest, ImageManifestList, ManifestVariant, OciDigest};

use crate::error::StoreError;
use crate::registry::{
    BlobReclaimer, BlobService, ManifestOption, ManifestService, Registry, Repository, TagService,
};

pub fn digest(fill: char) -> OciDigest {
    format!("sha256:{}", fill.to_string().repeat(64)).parse().unwrap()
}

fn descriptor(fill: char, media_type: &str) -> Descriptor {
    Descriptor {
        media_type: media_type.to_string(),
        digest: digest(fill),
        size: 1,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Repository(String),
    TagGet(String),
    ManifestGet(OciDigest, Vec<ManifestOption>),
    ManifestDelete(OciDigest),
    BlobDelete(OciDigest),
    Reclaim(OciDigest),
}

#[derive(Default)]
struct State {
    manifests: HashMap<OciDigest, ManifestVariant>,
    tags: HashMap<String, OciDigest>,
    blobs: HashSet<OciDigest>,
    fail_reclaim: HashSet<OciDigest>,
    fail_manifest_delete: bool,
    calls: Vec<Call>,
}

#[derive(Default, Clone)]
pub struct FakeRegistry {
    state: Arc<Mutex<State>>,
}

impl FakeRegistry {
    /// Add a schema 2 image with the given layers, filed under its config digest and tagged `tag`
    pub fn add_image(&self, tag: &str, layers: &[char], config: char) {
        let manifest = ImageManifest::schema2(
            descriptor(config, MEDIA_TYPE_DOCKER_CONFIG),
            layers
                .iter()
                .map(|&c| descriptor(c, MEDIA_TYPE_DOCKER_LAYER))
                .collect(),
        );
        let mut state = self.state.lock().unwrap();
        state.blobs.extend(layers.iter().map(|&c| digest(c)));
        state.tags.insert(tag.to_string(), digest(config));
        state
            .manifests
            .insert(digest(config), ManifestVariant::Schema2(manifest));
    }

    pub fn add_index(&self, tag: &str, fill: char) {
        let index = ImageManifestList {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_INDEX.to_string()),
            manifests: vec![],
        };
        let mut state = self.state.lock().unwrap();
        state.tags.insert(tag.to_string(), digest(fill));
        state.manifests.insert(digest(fill), ManifestVariant::Index(index));
    }

    pub fn remove_blob(&self, digest: &OciDigest) {
        self.state.lock().unwrap().blobs.remove(digest);
    }

    pub fn fail_reclaim(&self, digest: OciDigest) {
        self.state.lock().unwrap().fail_reclaim.insert(digest);
    }

    pub fn fail_manifest_delete(&self) {
        self.state.lock().unwrap().fail_manifest_delete = true;
    }

    pub fn has_blob(&self, digest: &OciDigest) -> bool {
        self.state.lock().unwrap().blobs.contains(digest)
    }

    pub fn has_manifest(&self, digest: &OciDigest) -> bool {
        self.state.lock().unwrap().manifests.contains_key(digest)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Digests passed to blob deletes, in call order
    pub fn blob_deletes(&self) -> Vec<OciDigest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::BlobDelete(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn manifest_deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::ManifestDelete(_)))
            .count()
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn repository(&self, name: &str) -> Result<Arc<dyn Repository>, StoreError> {
        drop(self.record(Call::Repository(name.to_string())));
        Ok(Arc::new(FakeRepository {
            name: name.to_string(),
            registry: self.clone(),
        }))
    }
}

#[async_trait]
impl BlobReclaimer for FakeRegistry {
    async fn reclaim_blob(&self, digest: &OciDigest) -> Result<(), StoreError> {
        let state = self.record(Call::Reclaim(digest.clone()));
        if state.fail_reclaim.contains(digest) {
            return Err(StoreError::Storage(opendal::Error::new(
                opendal::ErrorKind::Unexpected,
                "disk on fire",
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
struct FakeRepository {
    name: String,
    registry: FakeRegistry,
}

impl Repository for FakeRepository {
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
impl ManifestService for FakeRepository {
    async fn get(
        &self,
        digest: &OciDigest,
        options: &[ManifestOption],
    ) -> Result<ManifestVariant, StoreError> {
        let state = self
            .registry
            .record(Call::ManifestGet(digest.clone(), options.to_vec()));
        state
            .manifests
            .get(digest)
            .cloned()
            .ok_or_else(|| StoreError::ManifestUnknown {
                name: self.name.clone(),
                digest: digest.clone(),
            })
    }

    async fn delete(&self, digest: &OciDigest) -> Result<(), StoreError> {
        let mut state = self.registry.record(Call::ManifestDelete(digest.clone()));
        if state.fail_manifest_delete || state.manifests.remove(digest).is_none() {
            return Err(StoreError::ManifestUnknown {
                name: self.name.clone(),
                digest: digest.clone(),
            });
        }
        state.tags.retain(|_, d| *d != *digest);
        Ok(())
    }
}

#[async_trait]
impl TagService for FakeRepository {
    async fn get(&self, tag: &str) -> Result<Descriptor, StoreError> {
        let state = self.registry.record(Call::TagGet(tag.to_string()));
        state
            .tags
            .get(tag)
            .map(|d| Descriptor {
                media_type: ociclient::models::MEDIA_TYPE_DOCKER_MANIFEST_V2.to_string(),
                digest: d.clone(),
                size: 1,
            })
            .ok_or_else(|| StoreError::TagUnknown {
                name: self.name.clone(),
                tag: tag.to_string(),
            })
    }
}

#[async_trait]
impl BlobService for FakeRepository {
    async fn delete(&self, digest: &OciDigest) -> Result<(), StoreError> {
        let mut state = self.registry.record(Call::BlobDelete(digest.clone()));
        if state.blobs.remove(digest) {
            Ok(())
        } else {
            Err(StoreError::BlobUnknown(digest.clone()))
        }
    }
}
