use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use super::{CacheStore, DatabaseManager};
use crate::error::{Result, RetrieveError};
use crate::models::RecordKind;

const PATIENT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("patient");
const STUDY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("study");
const SERIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("series");
const IMAGE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("image");

fn table(kind: RecordKind) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match kind {
        RecordKind::Patient => PATIENT_TABLE,
        RecordKind::Study => STUDY_TABLE,
        RecordKind::Series => SERIES_TABLE,
        RecordKind::Image => IMAGE_TABLE,
    }
}

fn cache_err<E: Display>(context: &'static str) -> impl FnOnce(E) -> RetrieveError {
    move |e| RetrieveError::cache(format!("{}: {}", context, e))
}

/// Cache store backed by a redb file shared through [`DatabaseManager`]
pub struct RedbCache {
    path: PathBuf,
    db: Arc<Database>,
}

impl RedbCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let manager = DatabaseManager::global();
        let db = manager.get_or_create_database(&path)?;
        manager.initialize_tables(&db, &[PATIENT_TABLE, STUDY_TABLE, SERIES_TABLE, IMAGE_TABLE])?;
        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for RedbCache {
    fn store(&self, kind: RecordKind, key: &str, blob: &[u8], overwrite: bool) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(cache_err("Failed to begin write transaction"))?;

        let written = {
            let mut table = write_txn
                .open_table(table(kind))
                .map_err(cache_err("Failed to open table"))?;
            let exists = table
                .get(key)
                .map_err(cache_err("Failed to read entry"))?
                .is_some();
            if exists && !overwrite {
                false
            } else {
                table
                    .insert(key, blob)
                    .map_err(cache_err("Failed to write entry"))?;
                true
            }
        };

        write_txn
            .commit()
            .map_err(cache_err("Failed to commit write transaction"))?;
        Ok(written)
    }

    fn retrieve_all(&self, kind: RecordKind) -> Result<Vec<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(cache_err("Failed to begin read transaction"))?;

        let table = match read_txn.open_table(table(kind)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(cache_err("Failed to open table")(e)),
        };

        let mut blobs = Vec::new();
        for item in table.iter().map_err(cache_err("Failed to iterate table"))? {
            let (_key, value) = item.map_err(cache_err("Failed to read entry"))?;
            blobs.push(value.value().to_vec());
        }
        Ok(blobs)
    }

    fn clear(&self, kind: RecordKind) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(cache_err("Failed to begin write transaction"))?;
        write_txn
            .delete_table(table(kind))
            .map_err(cache_err("Failed to delete table"))?;
        write_txn
            .commit()
            .map_err(cache_err("Failed to commit write transaction"))?;
        tracing::info!("🧹 Cleared cached {} records", kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_respects_overwrite_flag() {
        let temp_dir = TempDir::new().unwrap();
        let cache = RedbCache::open(temp_dir.path().join("cache.redb")).unwrap();

        assert!(cache.store(RecordKind::Patient, "1", b"first", false).unwrap());
        assert!(!cache.store(RecordKind::Patient, "1", b"second", false).unwrap());
        assert_eq!(cache.retrieve_all(RecordKind::Patient).unwrap(), vec![b"first".to_vec()]);

        assert!(cache.store(RecordKind::Patient, "1", b"third", true).unwrap());
        assert_eq!(cache.retrieve_all(RecordKind::Patient).unwrap(), vec![b"third".to_vec()]);

        DatabaseManager::global().close_database(cache.path()).unwrap();
    }

    #[test]
    fn test_kinds_are_separate_and_clearable() {
        let temp_dir = TempDir::new().unwrap();
        let cache = RedbCache::open(temp_dir.path().join("cache.redb")).unwrap();

        cache.store(RecordKind::Study, "1.2", b"study", true).unwrap();
        cache.store(RecordKind::Series, "1.2.3", b"series", true).unwrap();

        cache.clear(RecordKind::Study).unwrap();
        assert!(cache.retrieve_all(RecordKind::Study).unwrap().is_empty());
        assert_eq!(cache.retrieve_all(RecordKind::Series).unwrap().len(), 1);

        // a cleared kind accepts writes again
        assert!(cache.store(RecordKind::Study, "1.2", b"again", false).unwrap());

        DatabaseManager::global().close_database(cache.path()).unwrap();
    }
}
