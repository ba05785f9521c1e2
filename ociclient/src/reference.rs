use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::digest::{DigestError, OciDigest};

/// Longest repository name accepted by the distribution grammar
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

/// Error type for image reference parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Invalid image reference format: {0}")]
    InvalidFormat(String),
    #[error("Invalid repository name: {0}")]
    InvalidName(String),
    #[error("Repository name exceeds {NAME_TOTAL_LENGTH_MAX} characters")]
    NameTooLong,
    #[error("Invalid digest in reference: {0}")]
    InvalidDigest(#[from] DigestError),
}

/// What a client asked for: a tag or a manifest digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(OciDigest),
}

impl Reference {
    /// Interpret `input` as a digest when it parses as one, otherwise as a tag.
    ///
    /// Tags are not validated here; a bogus tag simply won't resolve later on.
    pub fn resolve(input: &str) -> Self {
        match OciDigest::from_str(input) {
            Ok(digest) => Reference::Digest(digest),
            Err(_) => Reference::Tag(input.to_string()),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Reference::Tag(tag) => Some(tag),
            Reference::Digest(_) => None,
        }
    }

    pub fn digest(&self) -> Option<&OciDigest> {
        match self {
            Reference::Tag(_) => None,
            Reference::Digest(digest) => Some(digest),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Tag(tag) => f.write_str(tag),
            Reference::Digest(digest) => write!(f, "{digest}"),
        }
    }
}

/// Check a repository name against the distribution path grammar.
///
/// Components are lowercase alphanumerics joined by `.`, `_`, `__` or runs of `-`,
/// separated by `/`.
pub fn validate_name(name: &str) -> Result<(), ReferenceError> {
    if name.len() > NAME_TOTAL_LENGTH_MAX {
        return Err(ReferenceError::NameTooLong);
    }
    if name.is_empty() || !name.split('/').all(valid_component) {
        return Err(ReferenceError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn valid_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    match (bytes.first(), bytes.last()) {
        (Some(&first), Some(&last)) if is_alnum(first) && is_alnum(last) => {}
        _ => return false,
    }

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if is_alnum(b) {
            i += 1;
            continue;
        }
        // separator run: one '.', one or two '_', or any number of '-'
        let start = i;
        while i < bytes.len() && !is_alnum(bytes[i]) {
            i += 1;
        }
        let sep = &component[start..i];
        let ok = sep == "."
            || sep == "_"
            || sep == "__"
            || sep.bytes().all(|c| c == b'-');
        if !ok {
            return false;
        }
    }
    true
}

/// Check a tag against `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// A repository name that has passed [`validate_name`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryName(String);

impl RepositoryName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RepositoryName {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_name(s)?;
        Ok(RepositoryName(s.to_string()))
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image-qualified digest reference, `name@algorithm:hex`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalReference {
    name: RepositoryName,
    digest: OciDigest,
}

impl CanonicalReference {
    pub fn new(name: &str, digest: OciDigest) -> Result<Self, ReferenceError> {
        Ok(Self::from_parts(name.parse()?, digest))
    }

    /// Pair an already validated name with a digest
    pub fn from_parts(name: RepositoryName, digest: OciDigest) -> Self {
        Self { name, digest }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn digest(&self) -> &OciDigest {
        &self.digest
    }
}

impl FromStr for CanonicalReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, digest) = s
            .split_once('@')
            .ok_or_else(|| ReferenceError::InvalidFormat(s.to_string()))?;
        let digest = OciDigest::from_str(digest)?;
        CanonicalReference::new(name, digest)
    }
}

impl fmt::Display for CanonicalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.digest)
    }
}
