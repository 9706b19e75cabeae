//! Object-store adapters for index documents and their raw sources.
//!
//! The store is the only shared mutable resource. Index documents are never
//! patched remotely: every write replaces the whole document, guarded by a
//! [`Precondition`] on the version the writer last read.

pub mod fs;
pub mod http;
#[cfg(test)]
pub mod memory;

use crate::error::StoreError;
use crate::skywatch::config::StoreConfig;
use crate::skywatch::paths::SkywatchPaths;
use crate::skywatch::record::Collection;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

const CONTENT_HASH_PREFIX: &str = "sha256:";

/// Opaque version token: an ETag for remote stores, a content hash locally
/// or when a remote store sends no ETag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(pub String);

impl Version {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{CONTENT_HASH_PREFIX}{:x}", hasher.finalize()))
    }

    /// True when the token was computed from the document body rather than
    /// issued by the store, so the store cannot evaluate it itself.
    pub fn is_content_hash(&self) -> bool {
        self.0.starts_with(CONTENT_HASH_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub collection: Collection,
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Write only if the document does not exist yet.
    Absent,
    /// Write only if the stored version still equals this one.
    Matches(Version),
    /// Unconditional replace.
    Any,
}

impl Precondition {
    pub fn from_snapshot(snapshot: Option<&Snapshot>) -> Self {
        match snapshot {
            Some(s) => Self::Matches(s.version.clone()),
            None => Self::Absent,
        }
    }

    pub fn admits(&self, stored: Option<&Version>) -> bool {
        match (self, stored) {
            (Self::Any, _) => true,
            (Self::Absent, None) => true,
            (Self::Absent, Some(_)) => false,
            (Self::Matches(want), Some(have)) => want == have,
            (Self::Matches(_), None) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub location: String,
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub reference: String,
    pub observed_at_epoch_secs: u64,
}

pub trait IndexStore {
    /// Human-readable backend name for status output.
    fn describe(&self) -> String;

    /// `Ok(None)` only when the store reports the document absent. Transport
    /// failures and unparseable documents are errors, never "empty".
    fn fetch_current(&self, index_path: &str) -> Result<Option<Snapshot>, StoreError>;

    fn persist(
        &self,
        index_path: &str,
        collection: &Collection,
        precondition: &Precondition,
    ) -> Result<Receipt, StoreError>;

    fn list_sources(&self, prefix: &str) -> Result<Vec<SourceRef>, StoreError>;

    fn fetch_source(&self, reference: &str) -> Result<Vec<u8>, StoreError>;
}

pub fn encode_collection(collection: &Collection) -> Result<Vec<u8>, StoreError> {
    let mut data = serde_json::to_vec_pretty(collection).map_err(|source| StoreError::Corrupt {
        location: collection.name.clone(),
        source,
    })?;
    data.push(b'\n');
    Ok(data)
}

pub fn decode_collection(location: &str, bytes: &[u8]) -> Result<Collection, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        location: location.to_string(),
        source,
    })
}

/// Open the backend named by the config. The local backend defaults to
/// the resolved store directory.
pub fn open(cfg: &StoreConfig, paths: &SkywatchPaths) -> Result<Box<dyn IndexStore>, StoreError> {
    match cfg.backend.as_str() {
        "http" => {
            let url = cfg.url.as_deref().unwrap_or_default();
            Ok(Box::new(http::HttpStore::new(url, cfg.token.clone())?))
        }
        _ => {
            let root = cfg
                .dir
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| paths.store_dir.clone());
            Ok(Box::new(fs::FsStore::new(root)))
        }
    }
}
