use once_cell::sync::OnceCell;
use redb::{Database, TableDefinition, TableHandle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Result, RetrieveError};

/// Global database manager for handling shared database instances
/// This prevents database lock contention by reusing database instances per path
static GLOBAL_DB_MANAGER: OnceCell<DatabaseManager> = OnceCell::new();

/// Database manager that maintains shared database instances
/// Maps database file paths to their respective Arc<Database> instances
pub struct DatabaseManager {
    databases: Mutex<HashMap<PathBuf, Arc<Database>>>,
}

impl DatabaseManager {
    fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// Get the global database manager instance
    pub fn global() -> &'static DatabaseManager {
        GLOBAL_DB_MANAGER.get_or_init(DatabaseManager::new)
    }

    /// Get or create a shared database instance for a specific path
    pub fn get_or_create_database(&self, db_path: &Path) -> Result<Arc<Database>> {
        let db_path_buf = db_path.to_path_buf();

        let mut map = self
            .databases
            .lock()
            .map_err(|e| RetrieveError::cache(format!("Failed to lock database map: {}", e)))?;

        if let Some(existing_db) = map.get(&db_path_buf) {
            tracing::debug!(
                "🔄 Reusing existing cache database for: {}",
                db_path_buf.display()
            );
            Ok(existing_db.clone())
        } else {
            let db = Self::create_database(&db_path_buf)?;
            map.insert(db_path_buf, db.clone());
            Ok(db)
        }
    }

    fn create_database(db_path: &Path) -> Result<Arc<Database>> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RetrieveError::cache(format!("Failed to create database directory: {}", e))
            })?;
        }

        tracing::info!("🗄️  Opening cache database: {}", db_path.display());

        let db = Database::create(db_path)
            .map_err(|e| RetrieveError::cache(format!("Failed to create database: {}", e)))?;

        Ok(Arc::new(db))
    }

    /// Create the given tables if they do not exist yet
    pub fn initialize_tables(
        &self,
        db: &Database,
        table_definitions: &[TableDefinition<'static, &'static str, &'static [u8]>],
    ) -> Result<()> {
        let write_txn = db
            .begin_write()
            .map_err(|e| RetrieveError::cache(format!("Failed to begin write transaction: {}", e)))?;

        for table_def in table_definitions {
            write_txn.open_table(*table_def).map_err(|e| {
                RetrieveError::cache(format!("Failed to open table {}: {}", table_def.name(), e))
            })?;
        }

        write_txn.commit().map_err(|e| {
            RetrieveError::cache(format!("Failed to commit table initialization: {}", e))
        })?;

        tracing::debug!("✅ Initialized {} tables", table_definitions.len());
        Ok(())
    }

    /// Forget a database instance (tests and shutdown)
    pub fn close_database(&self, db_path: &Path) -> Result<bool> {
        let mut map = self
            .databases
            .lock()
            .map_err(|e| RetrieveError::cache(format!("Failed to lock database map: {}", e)))?;

        let removed = map.remove(db_path).is_some();
        if removed {
            tracing::info!("🗑️  Closed cache database: {}", db_path.display());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_manager_singleton() {
        let manager1 = DatabaseManager::global();
        let manager2 = DatabaseManager::global();
        assert!(std::ptr::eq(manager1, manager2));
    }

    #[test]
    fn test_database_creation_and_reuse() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("cache.redb");

        let manager = DatabaseManager::global();
        let db1 = manager.get_or_create_database(&db_path).unwrap();
        let db2 = manager.get_or_create_database(&db_path).unwrap();
        assert!(Arc::ptr_eq(&db1, &db2));

        assert!(manager.close_database(&db_path).unwrap());
        assert!(!manager.close_database(&db_path).unwrap());
    }
}
