//! Pull: full-state resynchronisation
//!
//! A client that missed pokes, or connects for the first time, asks for the
//! whole committed state. The read runs under the store's writer lock so it
//! can never observe half of a frame.

use crate::error::StorageError;
use crate::frame::PatchOp;
use crate::store::{decode, UserValue, VersionedStore, USER_PREFIX};
use crate::types::{MutationId, Version};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub cookie: Version,
    #[serde(rename = "lastMutationID")]
    pub last_mutation_id: MutationId,
    /// One `put` per live key, ordered by key
    pub patch: Vec<PatchOp>,
}

pub fn pull(store: &VersionedStore, client_id: &str) -> Result<PullResponse, StorageError> {
    store.read(|tx| {
        let cookie = tx.version()?;
        let last_mutation_id = tx
            .client_record(client_id)?
            .map(|r| r.last_mutation_id)
            .unwrap_or(0);

        let mut patch = Vec::new();
        for (key, raw) in tx.scan_prefix(USER_PREFIX)? {
            let stored: UserValue = decode(&key, &raw)?;
            patch.push(PatchOp::Put {
                key: key[USER_PREFIX.len()..].to_string(),
                value: stored.value,
            });
        }

        debug!(client_id, cookie, keys = patch.len(), "Pull served");
        Ok(PullResponse {
            cookie,
            last_mutation_id,
            patch,
        })
    })
}
