//! Redb-based persistent key-value store.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{KVError, KVResult, KVStore, WriteOp};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("facelink");

fn storage<E: std::fmt::Display>(e: E) -> KVError {
    KVError::Storage(e.to_string())
}

/// A persistent key-value store backed by a single redb file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        let db = Database::create(path).map_err(storage)?;

        // Create the table up front so read transactions never see it missing.
        let tx = db.begin_write().map_err(storage)?;
        {
            let _ = tx.open_table(TABLE).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        Ok(Self { db })
    }

    fn write<F>(&self, f: F) -> KVResult<()>
    where
        F: FnOnce(&mut redb::Table<'_, &str, &[u8]>) -> KVResult<()>,
    {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(TABLE).map_err(storage)?;
            f(&mut table)?;
        }
        tx.commit().map_err(storage)
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(TABLE).map_err(storage)?;
        Ok(table
            .get(key)
            .map_err(storage)?
            .map(|value| value.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.write(|table| {
            table.insert(key, value).map_err(storage)?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> KVResult<()> {
        self.write(|table| {
            table.remove(key).map_err(storage)?;
            Ok(())
        })
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        self.scan_page(prefix, None, usize::MAX)
    }

    fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> KVResult<Vec<(String, Vec<u8>)>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(TABLE).map_err(storage)?;

        let start = match after {
            Some(after) if after >= prefix => after,
            _ => prefix,
        };

        let mut results = Vec::new();
        for item in table.range(start..).map_err(storage)? {
            if results.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(storage)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            if after == Some(key) {
                continue;
            }
            results.push((key.to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    fn apply(&self, ops: &[WriteOp]) -> KVResult<()> {
        self.write(|table| {
            for op in ops {
                match op {
                    WriteOp::Put { key, value } => {
                        table.insert(key.as_str(), value.as_slice()).map_err(storage)?;
                    }
                    WriteOp::Delete { key } => {
                        table.remove(key.as_str()).map_err(storage)?;
                    }
                }
            }
            Ok(())
        })
    }
}
