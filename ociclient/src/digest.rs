use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Error type for OCI digest operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("Invalid digest format: {0}")]
    InvalidFormat(String),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Invalid digest length for {algorithm}: expected {expected} hex characters, got {actual}")]
    InvalidLength {
        algorithm: String,
        expected: usize,
        actual: usize,
    },
}

/// Represents an OCI content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciDigest {
    algorithm: String,
    hex: String,
}

impl OciDigest {
    /// Create a new OciDigest with the given algorithm and hex value
    pub fn new(algorithm: String, hex: String) -> Self {
        Self { algorithm, hex }
    }

    /// Compute the sha256 digest of `content`
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self {
            algorithm: "sha256".to_string(),
            hex: hex::encode(hasher.finalize()),
        }
    }

    /// Get the algorithm part of the digest
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Get the hex part of the digest
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

fn expected_hex_len(algorithm: &str) -> Option<usize> {
    match algorithm {
        "sha256" => Some(64),
        "sha384" => Some(96),
        "sha512" => Some(128),
        _ => None,
    }
}

impl fmt::Display for OciDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for OciDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| DigestError::InvalidFormat(s.to_string()))?;

        if algorithm.is_empty() || hex.is_empty() || hex.contains(':') {
            return Err(DigestError::InvalidFormat(s.to_string()));
        }

        let expected = expected_hex_len(algorithm)
            .ok_or_else(|| DigestError::UnsupportedAlgorithm(algorithm.to_string()))?;

        if !hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(DigestError::InvalidFormat(s.to_string()));
        }

        if hex.len() != expected {
            return Err(DigestError::InvalidLength {
                algorithm: algorithm.to_string(),
                expected,
                actual: hex.len(),
            });
        }

        Ok(OciDigest {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }
}

impl serde::Serialize for OciDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for OciDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        OciDigest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str =
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_parse_sha256() {
        let digest = OciDigest::from_str(EMPTY_SHA256).unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.to_string(), EMPTY_SHA256);
    }

    #[test]
    fn test_from_content_matches_known_digest() {
        assert_eq!(OciDigest::from_content(b"").to_string(), EMPTY_SHA256);
    }

    #[test]
    fn test_parse_other_algorithms() {
        let sha384 = format!("sha384:{}", "a".repeat(96));
        assert_eq!(OciDigest::from_str(&sha384).unwrap().algorithm(), "sha384");
        let sha512 = format!("sha512:{}", "b".repeat(128));
        assert_eq!(OciDigest::from_str(&sha512).unwrap().hex().len(), 128);
        assert!(matches!(
            OciDigest::from_str(&format!("sha384:{}", "a".repeat(64))),
            Err(DigestError::InvalidLength { expected: 96, actual: 64, .. })
        ));
    }

    #[test]
    fn test_rejects_tags_and_bad_input() {
        assert!(matches!(
            OciDigest::from_str("latest"),
            Err(DigestError::InvalidFormat(_))
        ));
        assert!(matches!(
            OciDigest::from_str("md5:abcd"),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            OciDigest::from_str("sha256:abcd"),
            Err(DigestError::InvalidLength { expected: 64, actual: 4, .. })
        ));
        assert!(OciDigest::from_str(&EMPTY_SHA256.to_uppercase().replace("SHA", "sha")).is_err());
    }
}
