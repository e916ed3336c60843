//! Versioned KV Storage
//!
//! One flat key namespace on top of sled. The processor-owned entries
//! (GlobalVersion, client records) and the mutator-owned user values share
//! the namespace and are told apart by key prefix:
//!
//! - `meta/version`: GlobalVersion
//! - `client/<id>`: [`ClientRecord`]
//! - `user/<key>`: [`UserValue`]
//! - `pending/<timestamp>/<seq>`: queued client mutations

pub mod persistence;
pub mod transaction;

pub use persistence::{StoreSummary, VersionedStore};
pub use transaction::Transaction;

use crate::error::StorageError;
use crate::types::{MutationId, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VERSION_KEY: &str = "meta/version";
pub const CLIENT_PREFIX: &str = "client/";
pub const USER_PREFIX: &str = "user/";
pub const PENDING_PREFIX: &str = "pending/";

/// Storage interface shared by the transaction and the patch-recording
/// decorator handed to mutators.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn put(&mut self, key: &str, value: Value) -> Result<(), StorageError>;
    fn del(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Per-client sync cursor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    /// Highest mutation id ever applied for this client
    #[serde(rename = "lastMutationID")]
    pub last_mutation_id: MutationId,
    /// GlobalVersion at which the client's last mutation was applied
    pub last_version: Option<Version>,
}

/// Application value together with the version that last wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserValue {
    pub value: Value,
    pub version: Version,
}

pub fn client_key(client_id: &str) -> String {
    format!("{CLIENT_PREFIX}{client_id}")
}

pub fn user_key(key: &str) -> String {
    format!("{USER_PREFIX}{key}")
}

pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    key: &str,
    raw: &[u8],
) -> Result<T, StorageError> {
    serde_json::from_slice(raw).map_err(|source| StorageError::Corrupt {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}
