//! Persistence layer for the versioned KV store

use crate::error::StorageError;
use crate::store::transaction::Transaction;
use crate::store::{
    client_key, decode, user_key, ClientRecord, UserValue, PENDING_PREFIX, USER_PREFIX,
    VERSION_KEY,
};
use crate::types::{ClientId, Version};
use parking_lot::Mutex;
use sled;
use std::path::Path;
use tracing::debug;

const TREE_KV: &str = "kv";

/// Committed store state as shown by `status`
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub version: Version,
    pub pending: usize,
    pub values: usize,
    pub clients: Vec<(ClientId, ClientRecord)>,
}

/// Sled-backed store holding GlobalVersion, client records, user values and
/// the pending mutation queue.
///
/// All writes go through a [`Transaction`]. Only one transaction can be open
/// at a time, which serializes frames against each other. Single-key reads
/// hit sled directly; anything that scans more than one key runs under the
/// writer lock through [`VersionedStore::read`], since a sled iterator that
/// overlaps a batch can see part of it.
pub struct VersionedStore {
    db: sled::Db,
    kv: sled::Tree,
    writer: Mutex<()>,
    flush_on_commit: bool,
}

impl VersionedStore {
    /// Open (or create) a store at the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database at {:?}: {}", path.as_ref(), e),
            ))
        })?;
        Self::from_db(db)
    }

    /// Wrap an already opened sled database
    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let kv = db.open_tree(TREE_KV)?;
        Ok(Self {
            db,
            kv,
            writer: Mutex::new(()),
            flush_on_commit: false,
        })
    }

    /// In-memory store that is discarded on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Flush to disk after every successful commit
    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.kv
    }

    pub(crate) fn flushes_on_commit(&self) -> bool {
        self.flush_on_commit
    }

    /// Begin a transaction, blocking until any other open transaction ends.
    pub fn begin(&self) -> Transaction<'_> {
        let guard = self.writer.lock();
        debug!("Transaction started");
        Transaction::new(self, guard)
    }

    /// Run `body` inside a transaction.
    ///
    /// Commits when `body` returns `Ok`. On `Err` the transaction is rolled
    /// back and the body's error is returned unchanged.
    pub fn transact<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut tx = self.begin();
        match body(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    /// Run a read-only `body` under the writer lock, so it observes one
    /// consistent committed state. Nothing written by `body` is kept.
    pub fn read<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    {
        let tx = self.begin();
        let result = body(&tx);
        tx.rollback();
        result
    }

    /// Committed GlobalVersion (0 on a fresh store)
    pub fn version(&self) -> Result<Version, StorageError> {
        match self.kv.get(VERSION_KEY.as_bytes())? {
            Some(raw) => decode(VERSION_KEY, &raw),
            None => Ok(0),
        }
    }

    /// Committed record for a client
    pub fn client_record(&self, client_id: &str) -> Result<Option<ClientRecord>, StorageError> {
        let key = client_key(client_id);
        match self.kv.get(key.as_bytes())? {
            Some(raw) => Ok(Some(decode(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Committed value for an application key
    pub fn user_value(&self, key: &str) -> Result<Option<UserValue>, StorageError> {
        let key = user_key(key);
        match self.kv.get(key.as_bytes())? {
            Some(raw) => Ok(Some(decode(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// All committed client records, ordered by client id
    pub fn clients(&self) -> Result<Vec<(ClientId, ClientRecord)>, StorageError> {
        self.read(|tx| tx.clients())
    }

    /// Number of committed application values
    pub fn user_value_count(&self) -> Result<usize, StorageError> {
        self.read(|tx| Ok(tx.scan_prefix(USER_PREFIX)?.len()))
    }

    /// Version, counts and client records read from one committed state
    pub fn summary(&self) -> Result<StoreSummary, StorageError> {
        self.read(|tx| {
            Ok(StoreSummary {
                version: tx.version()?,
                pending: tx.scan_prefix(PENDING_PREFIX)?.len(),
                values: tx.scan_prefix(USER_PREFIX)?.len(),
                clients: tx.clients()?,
            })
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to flush database: {}", e),
            ))
        })?;
        Ok(())
    }
}
