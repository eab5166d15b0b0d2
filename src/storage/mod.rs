//! Local persistent cache of previously retrieved records

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Record, RecordKind};

pub mod database_manager;
pub mod index;
pub mod redb_cache;

pub use database_manager::DatabaseManager;
pub use index::IndexRegistry;
pub use redb_cache::RedbCache;

/// Key-value store of serialized records, one keyspace per record kind
///
/// Concurrent writers to the same key race; the last write wins.
pub trait CacheStore: Send + Sync {
    /// Store a blob; returns `false` when the key existed and `overwrite` is off
    fn store(&self, kind: RecordKind, key: &str, blob: &[u8], overwrite: bool) -> Result<bool>;

    /// Every blob stored for a kind
    fn retrieve_all(&self, kind: RecordKind) -> Result<Vec<Vec<u8>>>;

    /// Drop every blob stored for a kind
    fn clear(&self, kind: RecordKind) -> Result<()>;
}

/// Typed view over a [`CacheStore`]: serializes records and keys them by identity
#[derive(Clone)]
pub struct RecordCache {
    store: Arc<dyn CacheStore>,
    index: Arc<IndexRegistry>,
}

impl RecordCache {
    pub fn new(store: Arc<dyn CacheStore>, index: Arc<IndexRegistry>) -> Self {
        Self { store, index }
    }

    pub fn index(&self) -> &IndexRegistry {
        &self.index
    }

    /// Persist a record under its identity key
    pub fn put<R: Record>(&self, record: &R, overwrite: bool) -> Result<bool> {
        let key = self.index.key(record)?;
        let blob = serde_json::to_vec(record)?;
        let written = self.store.store(R::KIND, &key, &blob, overwrite)?;
        debug!("Cached {} {} (written: {})", R::KIND, key, written);
        Ok(written)
    }

    /// Every cached record of a kind; undecodable blobs are skipped
    pub fn load_all<R: Record>(&self) -> Result<Vec<R>> {
        let blobs = self.store.retrieve_all(R::KIND)?;
        let mut records = Vec::with_capacity(blobs.len());
        for blob in blobs {
            match serde_json::from_slice::<R>(&blob) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping undecodable cached {}: {}", R::KIND, e),
            }
        }
        Ok(records)
    }

    pub fn clear<R: Record>(&self) -> Result<()> {
        self.store.clear(R::KIND)
    }
}
