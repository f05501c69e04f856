//! Collection-scoped record storage with file locking.
//!
//! Each named collection lives in its own JSON file under the data
//! directory, holding an id -> record object. Reads take a shared lock;
//! writes go through a locked temp file and an atomic rename, so each
//! operation is individually durable. There is no multi-collection
//! transaction: callers performing multi-step operations (cascade
//! deletes) must tolerate partial completion.

use crate::{Error, Result};
use fs2::FileExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Collection names are part of the storage contract
pub const COLLECTIONS: [&str; 4] = ["people", "medications", "doseLogs", "settings"];

/// File-backed store of named record collections
pub struct CollectionStore {
    dir: PathBuf,
}

impl CollectionStore {
    /// Open the store, performing setup.
    ///
    /// Creates the data directory and any missing collection files
    /// without touching existing ones, so opening an older data
    /// directory upgrades it in place.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        for name in COLLECTIONS {
            let path = dir.join(format!("{name}.json"));
            if !path.exists() {
                std::fs::write(&path, b"{}")?;
                tracing::debug!("Created collection file {:?}", path);
            }
        }

        tracing::debug!("Opened collection store at {:?}", dir);
        Ok(Self { dir })
    }

    /// Path to a collection's backing file
    ///
    /// Fails with `NotInitialized` for names outside the contract or
    /// when setup never created the file.
    fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        if !COLLECTIONS.contains(&collection) {
            return Err(Error::NotInitialized(collection.to_string()));
        }
        let path = self.dir.join(format!("{collection}.json"));
        if !path.exists() {
            return Err(Error::NotInitialized(collection.to_string()));
        }
        Ok(path)
    }

    fn read_records(&self, collection: &str) -> Result<BTreeMap<String, Value>> {
        let path = self.collection_path(collection)?;
        let file = File::open(&path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        let read_result = reader.read_to_string(&mut contents);
        file.unlock()?;
        read_result?;

        match serde_json::from_str::<BTreeMap<String, Value>>(&contents) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    "Corrupted collection file for '{}': {}. Treating as empty.",
                    collection,
                    e
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_records(&self, collection: &str, records: &BTreeMap<String, Value>) -> Result<()> {
        let path = self.collection_path(collection)?;
        let parent = path
            .parent()
            .ok_or_else(|| Error::Other("collection path missing parent".into()))?;

        // Unique temp file in the same directory for atomic rename
        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(records)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Wrote {} records to '{}'", records.len(), collection);
        Ok(())
    }

    /// All records in a collection
    pub fn list(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self.read_records(collection)?.into_values().collect())
    }

    /// A single record by key
    pub fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.read_records(collection)?.remove(key))
    }

    /// Insert a new record; fails with `DuplicateKey` if the key exists
    pub fn insert(&self, collection: &str, key: &str, record: Value) -> Result<()> {
        let mut records = self.read_records(collection)?;
        if records.contains_key(key) {
            return Err(Error::DuplicateKey {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        records.insert(key.to_string(), record);
        self.write_records(collection, &records)
    }

    /// Upsert a record, overwriting any existing one with the same key
    pub fn put(&self, collection: &str, key: &str, record: Value) -> Result<()> {
        let mut records = self.read_records(collection)?;
        records.insert(key.to_string(), record);
        self.write_records(collection, &records)
    }

    /// Remove a record by key; succeeds even if the key is absent
    pub fn remove(&self, collection: &str, key: &str) -> Result<()> {
        let mut records = self.read_records(collection)?;
        if records.remove(key).is_some() {
            self.write_records(collection, &records)?;
        }
        Ok(())
    }

    /// Remove every record in a collection
    pub fn clear(&self, collection: &str) -> Result<()> {
        self.write_records(collection, &BTreeMap::new())
    }
}
