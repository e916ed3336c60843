//! Scoped atomic transactions over the versioned store
//!
//! Writes are buffered in an ordered write set and only reach sled on
//! [`Transaction::commit`], as one atomic batch. Reads see the transaction's
//! own writes first, then committed state.

use crate::error::StorageError;
use crate::store::persistence::VersionedStore;
use crate::store::{
    client_key, decode, encode, validate_key, ClientRecord, KvStore, CLIENT_PREFIX, VERSION_KEY,
};
use crate::types::{ClientId, Version};
use parking_lot::MutexGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// An open transaction. Holds the store's writer lock until it is committed,
/// rolled back or dropped. Dropping without commit discards all writes.
pub struct Transaction<'s> {
    store: &'s VersionedStore,
    _writer: MutexGuard<'s, ()>,
    /// `None` marks a deletion
    writes: BTreeMap<String, Option<Vec<u8>>>,
    finished: bool,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(store: &'s VersionedStore, writer: MutexGuard<'s, ()>) -> Self {
        Self {
            store,
            _writer: writer,
            writes: BTreeMap::new(),
            finished: false,
        }
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(staged) = self.writes.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.store.tree().get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Read and decode a typed value
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and stage a typed value
    pub fn put_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        validate_key(key)?;
        let raw = encode(key, value)?;
        self.writes.insert(key.to_string(), Some(raw));
        Ok(())
    }

    /// Current GlobalVersion as seen by this transaction (0 on a fresh store)
    pub fn version(&self) -> Result<Version, StorageError> {
        Ok(self.get_json(VERSION_KEY)?.unwrap_or(0))
    }

    pub fn set_version(&mut self, version: Version) -> Result<(), StorageError> {
        self.put_json(VERSION_KEY, &version)
    }

    pub fn client_record(&self, client_id: &str) -> Result<Option<ClientRecord>, StorageError> {
        self.get_json(&client_key(client_id))
    }

    pub fn put_client_record(
        &mut self,
        client_id: &str,
        record: &ClientRecord,
    ) -> Result<(), StorageError> {
        self.put_json(&client_key(client_id), record)
    }

    /// Every client record, ordered by client id
    pub fn clients(&self) -> Result<Vec<(ClientId, ClientRecord)>, StorageError> {
        self.scan_prefix(CLIENT_PREFIX)?
            .into_iter()
            .map(|(key, raw)| {
                let record: ClientRecord = decode(&key, &raw)?;
                Ok::<_, StorageError>((key[CLIENT_PREFIX.len()..].to_string(), record))
            })
            .collect()
    }

    /// Keys and raw values under `prefix`, merging staged writes over
    /// committed state. Ordered by key.
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let committed = self.store.tree().scan_prefix(prefix.as_bytes());
        let staged = self
            .writes
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix));
        Self::merge(committed, staged)
    }

    /// Keys and raw values in `[start, end)`, merging staged writes over
    /// committed state. Ordered by key.
    pub fn scan_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let committed = self.store.tree().range(start.as_bytes()..end.as_bytes());
        let staged = self.writes.range(start.to_string()..end.to_string());
        Self::merge(committed, staged)
    }

    fn merge<'w>(
        committed: sled::Iter,
        staged: impl Iterator<Item = (&'w String, &'w Option<Vec<u8>>)>,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut merged: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for item in committed {
            let (key, value) = item?;
            merged.insert(String::from_utf8_lossy(&key).into_owned(), value.to_vec());
        }
        for (key, write) in staged {
            match write {
                Some(raw) => {
                    merged.insert(key.clone(), raw.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Apply every staged write atomically.
    ///
    /// Once the batch is applied the transaction has committed. A failing
    /// flush after that point is logged and does not turn the commit into an
    /// error; the data is visible and sled persists it on its next flush.
    pub fn commit(mut self) -> Result<(), StorageError> {
        self.finished = true;
        if self.writes.is_empty() {
            debug!("Transaction committed with no writes");
            return Ok(());
        }

        let mut batch = sled::Batch::default();
        let count = self.writes.len();
        for (key, staged) in std::mem::take(&mut self.writes) {
            match staged {
                Some(raw) => batch.insert(key.as_bytes(), raw),
                None => batch.remove(key.as_bytes()),
            }
        }

        self.store.tree().apply_batch(batch).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to apply transaction batch: {}", e),
            ))
        })?;
        if self.store.flushes_on_commit() {
            if let Err(err) = self.store.flush() {
                warn!(error = %err, writes = count, "Committed batch not flushed to disk");
            }
        }
        debug!(writes = count, "Transaction committed");
        Ok(())
    }

    /// Discard every staged write.
    pub fn rollback(mut self) {
        self.finished = true;
        if !self.writes.is_empty() {
            debug!(writes = self.writes.len(), "Transaction rolled back");
        }
        self.writes.clear();
    }
}

impl KvStore for Transaction<'_> {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.get_json(key)
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.put_json(key, &value)
    }

    fn del(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.writes.insert(key.to_string(), None);
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            warn!(
                writes = self.writes.len(),
                "Transaction dropped without commit; discarding writes"
            );
        }
    }
}
