// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deduplication index — tracks every record identity ever accepted.
//!
//! The index holds composite keys (`identifier|source|period|date`) and
//! grows monotonically: entries are never removed by this crate. The period
//! is part of the key, so the same identifier can be "new" again in a later
//! period. `classify` must only be called from one execution context at a
//! time against a given index; the pipeline is single-threaded, so the
//! check-and-insert pair cannot race.

use crate::models::Record;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

/// Unique identity of one record across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub identifier: String,
    pub source_code: String,
    pub period: u8,
    pub observed_on: chrono::NaiveDate,
}

impl CompositeKey {
    pub fn from_record(record: &Record) -> Self {
        Self {
            identifier: record.identifier.clone(),
            source_code: record.source_code.clone(),
            period: record.period,
            observed_on: record.observed_on,
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.identifier, self.source_code, self.period, self.observed_on
        )
    }
}

/// Persistent storage for the key set. The byte format is owned here, not
/// by the index.
pub trait KeyStore: Send + Sync {
    fn load_keys(&self) -> Result<HashSet<String>>;
    fn save_keys(&self, keys: &HashSet<String>) -> Result<()>;
}

/// Key store backed by a SQLite table.
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyStore {
    /// Open (or create) the key database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store dir: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open key store: {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS seen_keys (
                key TEXT PRIMARY KEY
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyStore for SqliteKeyStore {
    fn load_keys(&self) -> Result<HashSet<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("key store lock poisoned"))?;
        let mut stmt = conn.prepare("SELECT key FROM seen_keys")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = HashSet::new();
        for row in rows {
            keys.insert(row?);
        }
        Ok(keys)
    }

    fn save_keys(&self, keys: &HashSet<String>) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("key store lock poisoned"))?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO seen_keys (key) VALUES (?1)")?;
            for key in keys {
                stmt.execute(rusqlite::params![key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-memory key store for tests and single-shot runs.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashSet<String>>,
}

impl KeyStore for MemoryKeyStore {
    fn load_keys(&self) -> Result<HashSet<String>> {
        Ok(self
            .keys
            .lock()
            .map_err(|_| anyhow::anyhow!("key store lock poisoned"))?
            .clone())
    }

    fn save_keys(&self, keys: &HashSet<String>) -> Result<()> {
        let mut guard = self
            .keys
            .lock()
            .map_err(|_| anyhow::anyhow!("key store lock poisoned"))?;
        guard.extend(keys.iter().cloned());
        Ok(())
    }
}

/// The in-process index: a key set plus its backing store.
pub struct DedupIndex {
    keys: HashSet<String>,
    /// Keys added since the last persist. The history grows monotonically,
    /// so only this delta ever needs writing.
    pending: HashSet<String>,
    store: Box<dyn KeyStore>,
}

impl DedupIndex {
    /// Load the index from its store at process start.
    pub fn load(store: Box<dyn KeyStore>) -> Result<Self> {
        let keys = store.load_keys()?;
        tracing::debug!("dedup index loaded: {} keys", keys.len());
        Ok(Self {
            keys,
            pending: HashSet::new(),
            store,
        })
    }

    /// Classify records as new or duplicate, in input order.
    ///
    /// A record is new iff its key is absent at classification time; the
    /// key is inserted in the same step, so a second record with the same
    /// key later in the batch classifies as duplicate.
    pub fn classify(&mut self, records: Vec<Record>) -> (Vec<Record>, Vec<Record>) {
        let mut new = Vec::new();
        let mut duplicate = Vec::new();

        for record in records {
            let key = CompositeKey::from_record(&record).to_string();
            if self.keys.insert(key.clone()) {
                self.pending.insert(key);
                new.push(record);
            } else {
                duplicate.push(record);
            }
        }

        (new, duplicate)
    }

    /// Persist the keys added since the last persist.
    pub fn persist(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.store.save_keys(&self.pending)?;
        tracing::debug!("dedup index persisted: {} new keys", self.pending.len());
        self.pending.clear();
        Ok(())
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_record(identifier: &str, source: &str, period: u8) -> Record {
        Record {
            name: "Cola".to_string(),
            description: String::new(),
            identifier: identifier.to_string(),
            observed_on: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            price: 3.99,
            ounces: 144.0,
            price_per_ounce: Some(0.0277),
            promotion: None,
            period,
            source_code: source.to_string(),
        }
    }

    #[test]
    fn test_classify_new_then_duplicate() {
        let mut index = DedupIndex::load(Box::new(MemoryKeyStore::default())).unwrap();
        let (new, dup) = index.classify(vec![make_record("A", "0423", 2)]);
        assert_eq!(new.len(), 1);
        assert!(dup.is_empty());

        let (new, dup) = index.classify(vec![make_record("A", "0423", 2)]);
        assert!(new.is_empty());
        assert_eq!(dup.len(), 1);
    }

    #[test]
    fn test_same_key_twice_in_one_batch() {
        let mut index = DedupIndex::load(Box::new(MemoryKeyStore::default())).unwrap();
        let (new, dup) = index.classify(vec![
            make_record("A", "0423", 2),
            make_record("A", "0423", 2),
        ]);
        assert_eq!(new.len(), 1);
        assert_eq!(dup.len(), 1);
    }

    #[test]
    fn test_period_is_part_of_the_key() {
        let mut index = DedupIndex::load(Box::new(MemoryKeyStore::default())).unwrap();
        index.classify(vec![make_record("A", "0423", 2)]);
        let (new, _) = index.classify(vec![make_record("A", "0423", 3)]);
        assert_eq!(new.len(), 1);
    }

    #[test]
    fn test_sqlite_roundtrip_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("keys.db");

        {
            let store = SqliteKeyStore::open(&db).unwrap();
            let mut index = DedupIndex::load(Box::new(store)).unwrap();
            let (new, _) = index.classify(vec![
                make_record("A", "0423", 2),
                make_record("B", "0423", 2),
            ]);
            assert_eq!(new.len(), 2);
            index.persist().unwrap();
        }

        // Fresh process: the same records must all classify as duplicate.
        let store = SqliteKeyStore::open(&db).unwrap();
        let mut index = DedupIndex::load(Box::new(store)).unwrap();
        assert_eq!(index.len(), 2);
        let (new, dup) = index.classify(vec![
            make_record("A", "0423", 2),
            make_record("B", "0423", 2),
        ]);
        assert!(new.is_empty());
        assert_eq!(dup.len(), 2);
    }

    /// Store double that records the size of every save.
    struct CountingStore {
        saved: std::sync::Arc<Mutex<Vec<usize>>>,
    }

    impl KeyStore for CountingStore {
        fn load_keys(&self) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        fn save_keys(&self, keys: &HashSet<String>) -> Result<()> {
            self.saved.lock().unwrap().push(keys.len());
            Ok(())
        }
    }

    #[test]
    fn test_persist_writes_only_new_keys() {
        let saved = std::sync::Arc::new(Mutex::new(Vec::new()));
        let mut index = DedupIndex::load(Box::new(CountingStore {
            saved: std::sync::Arc::clone(&saved),
        }))
        .unwrap();

        index.classify(vec![
            make_record("A", "0423", 2),
            make_record("B", "0423", 2),
        ]);
        index.persist().unwrap();

        // A is already known; only C is new since the last persist.
        index.classify(vec![
            make_record("A", "0423", 2),
            make_record("C", "0423", 2),
        ]);
        index.persist().unwrap();

        // Nothing new: no store write at all.
        index.persist().unwrap();

        assert_eq!(*saved.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_persist_is_additive() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("keys.db");

        let store = SqliteKeyStore::open(&db).unwrap();
        store
            .save_keys(&HashSet::from(["old|0423|1|2026-02-01".to_string()]))
            .unwrap();
        store
            .save_keys(&HashSet::from(["new|0423|2|2026-03-01".to_string()]))
            .unwrap();
        assert_eq!(store.load_keys().unwrap().len(), 2);
    }
}
