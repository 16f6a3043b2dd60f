//! Credential map snapshots.
//!
//! The credential map lives outside the process (a file here, but anything
//! that can produce the document works) and may change at any time without
//! notifying the gateway. Each successful read is parsed into an immutable
//! [`ConfigSnapshot`] whose content hash decides whether anything actually
//! changed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Errors reading or parsing the credential map.
///
/// These are recovered locally: the previous snapshot is retained and the
/// read is retried on the next refresh tick. They never reach a session.
#[derive(Debug, thiserror::Error)]
pub enum ConfigReadError {
    #[error("failed to read credential map: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse credential map: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("credential map must be a JSON object of string to string")]
    Shape,
}

/// Immutable point-in-time view of the identifier → credential mapping.
///
/// Replaced atomically on each detected change, never mutated in place.
/// The hash always reflects the last successfully parsed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Content hash over the canonical serialization of the mapping.
    pub hash: String,

    /// Identifier → connection credential string.
    pub credentials: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    /// An empty snapshot, used before the first successful read.
    pub fn empty() -> Self {
        Self {
            hash: String::new(),
            credentials: BTreeMap::new(),
        }
    }

    /// Parse a raw document. The top-level shape must be a JSON object
    /// mapping strings to strings; anything else is a read failure.
    pub fn parse(raw: &str) -> Result<Self, ConfigReadError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let object = value.as_object().ok_or(ConfigReadError::Shape)?;

        let mut credentials = BTreeMap::new();
        for (key, entry) in object {
            let credential = entry.as_str().ok_or(ConfigReadError::Shape)?;
            credentials.insert(key.clone(), credential.to_string());
        }

        let hash = hash_credentials(&credentials);
        Ok(Self { hash, credentials })
    }
}

/// Content hash over a canonical, order-independent serialization.
///
/// A `BTreeMap` serializes with sorted keys, so two documents with the
/// same entries in different order hash identically.
fn hash_credentials(credentials: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in credentials {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Source of the raw credential map document.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<String, ConfigReadError>;
}

/// File-backed credential map source.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn fetch(&self) -> Result<String, ConfigReadError> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_object() {
        let snap = ConfigSnapshot::parse(r#"{"a":"postgres://one","b":"postgres://two"}"#)
            .unwrap();
        assert_eq!(snap.credentials.len(), 2);
        assert_eq!(snap.credentials["a"], "postgres://one");
        assert!(!snap.hash.is_empty());
    }

    #[test]
    fn hash_is_order_independent() {
        let a = ConfigSnapshot::parse(r#"{"x":"1","y":"2"}"#).unwrap();
        let b = ConfigSnapshot::parse(r#"{"y":"2","x":"1"}"#).unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn hash_changes_with_content() {
        let a = ConfigSnapshot::parse(r#"{"x":"1"}"#).unwrap();
        let b = ConfigSnapshot::parse(r#"{"x":"2"}"#).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn rejects_non_object_documents() {
        assert!(matches!(
            ConfigSnapshot::parse(r#"["a","b"]"#),
            Err(ConfigReadError::Shape)
        ));
        assert!(matches!(
            ConfigSnapshot::parse(r#"{"a":{"nested":true}}"#),
            Err(ConfigReadError::Shape)
        ));
        assert!(matches!(
            ConfigSnapshot::parse("not json"),
            Err(ConfigReadError::Parse(_))
        ));
    }
}
