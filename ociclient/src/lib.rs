pub mod digest;
pub mod models;
pub mod reference;

// Re-export the common types for convenience
pub use digest::{DigestError, OciDigest};
pub use models::{Descriptor, ImageManifest, ImageManifestList, ManifestError, ManifestVariant};
pub use reference::{
    CanonicalReference, Reference, ReferenceError, RepositoryName, is_valid_tag, validate_name,
};
