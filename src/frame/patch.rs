//! Write interception for patch building
//!
//! Mutators see a [`PatchTracker`], which implements the same [`KvStore`]
//! interface as the transaction. It maps application keys into the `user/`
//! namespace, stamps each written value with the frame's cookie, and records
//! the key-level effect in a [`PatchLog`].

use crate::error::StorageError;
use crate::frame::PatchOp;
use crate::store::{user_key, validate_key, KvStore, Transaction, UserValue};
use crate::types::Version;
use serde_json::Value;
use std::collections::HashMap;

/// Net effect per key, in order of first touch. Later writes to a key
/// replace earlier ones.
#[derive(Debug, Default)]
pub struct PatchLog {
    order: Vec<String>,
    /// `None` means deleted
    latest: HashMap<String, Option<Value>>,
}

impl PatchLog {
    fn record(&mut self, key: &str, value: Option<Value>) {
        if self.latest.insert(key.to_string(), value).is_none() {
            self.order.push(key.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_patch(mut self) -> Vec<PatchOp> {
        self.order
            .into_iter()
            .filter_map(|key| {
                let value = self.latest.remove(&key)?;
                Some(match value {
                    Some(value) => PatchOp::Put { key, value },
                    None => PatchOp::Del { key },
                })
            })
            .collect()
    }
}

pub struct PatchTracker<'t, 's> {
    tx: &'t mut Transaction<'s>,
    version: Version,
    log: &'t mut PatchLog,
}

impl<'t, 's> PatchTracker<'t, 's> {
    pub fn new(tx: &'t mut Transaction<'s>, version: Version, log: &'t mut PatchLog) -> Self {
        Self { tx, version, log }
    }
}

impl KvStore for PatchTracker<'_, '_> {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let stored: Option<UserValue> = self.tx.get_json(&user_key(key))?;
        Ok(stored.map(|v| v.value))
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        validate_key(key)?;
        let stored = UserValue {
            value: value.clone(),
            version: self.version,
        };
        self.tx.put_json(&user_key(key), &stored)?;
        self.log.record(key, Some(value));
        Ok(())
    }

    fn del(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.tx.del(&user_key(key))?;
        self.log.record(key, None);
        Ok(())
    }
}
