//! Durable pending-mutation queue
//!
//! Submitted mutations wait under `pending/<timestamp>/<seq>` in the same
//! store the frames write to. [`QueuedMutationSource`] deletes the entries
//! it consumes inside the frame transaction, so a mutation leaves the queue
//! exactly when the frame that applied (or skipped) it commits.

use crate::error::StorageError;
use crate::mutation::source::MutationSource;
use crate::mutation::ClientMutation;
use crate::store::{decode, KvStore, Transaction, VersionedStore, PENDING_PREFIX};
use crate::types::Timestamp;
use std::collections::VecDeque;
use tracing::debug;

const SEQ_KEY: &str = "meta/pending_seq";
const KEY_PAD: usize = 20;

fn pending_key(timestamp: u64, seq: u64) -> String {
    format!("{PENDING_PREFIX}{timestamp:0KEY_PAD$}/{seq:0KEY_PAD$}")
}

/// Append one mutation to the queue within an open transaction.
pub fn enqueue(tx: &mut Transaction<'_>, mutation: &ClientMutation) -> Result<(), StorageError> {
    let seq: u64 = tx.get_json(SEQ_KEY)?.unwrap_or(0);
    tx.put_json(&pending_key(mutation.timestamp, seq), mutation)?;
    tx.put_json(SEQ_KEY, &(seq + 1))
}

/// Ingest side of the queue
pub struct PendingQueue<'s> {
    store: &'s VersionedStore,
}

impl<'s> PendingQueue<'s> {
    pub fn new(store: &'s VersionedStore) -> Self {
        Self { store }
    }

    /// Enqueue mutations atomically. Returns how many were added.
    pub fn push(
        &self,
        mutations: impl IntoIterator<Item = ClientMutation>,
    ) -> Result<usize, StorageError> {
        self.store.transact(|tx| {
            let mut count = 0usize;
            for mutation in mutations {
                enqueue(tx, &mutation)?;
                count += 1;
            }
            debug!(count, "Mutations enqueued");
            Ok(count)
        })
    }

    /// Committed pending mutations in delivery order
    pub fn list(&self) -> Result<Vec<ClientMutation>, StorageError> {
        self.store.read(|tx| {
            tx.scan_prefix(PENDING_PREFIX)?
                .into_iter()
                .map(|(key, raw)| decode(&key, &raw))
                .collect()
        })
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        self.store
            .read(|tx| Ok(tx.scan_prefix(PENDING_PREFIX)?.len()))
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// Pending entries stamped before `until`, in delivery order.
pub fn due_entries(
    tx: &Transaction<'_>,
    until: Timestamp,
) -> Result<Vec<(String, ClientMutation)>, StorageError> {
    tx.scan_range(PENDING_PREFIX, &pending_key(until, 0))?
        .into_iter()
        .map(|(key, raw)| {
            let mutation: ClientMutation = decode(&key, &raw)?;
            Ok::<_, StorageError>((key, mutation))
        })
        .collect()
}

/// Mutation source reading from the durable queue.
///
/// Each [`MutationSource::begin`] loads only the entries due before the
/// frame's end; peeking before a frame transaction is open yields nothing.
#[derive(Debug, Default)]
pub struct QueuedMutationSource {
    pending: VecDeque<(String, ClientMutation)>,
    consumed: Vec<String>,
}

impl QueuedMutationSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MutationSource for QueuedMutationSource {
    fn begin(&mut self, tx: &Transaction<'_>, until: Timestamp) -> Result<(), StorageError> {
        self.consumed.clear();
        self.pending = due_entries(tx, until)?.into();
        debug!(due = self.pending.len(), until, "Pending queue loaded");
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<&ClientMutation>, StorageError> {
        Ok(self.pending.front().map(|(_, m)| m))
    }

    fn next(&mut self) -> Result<Option<ClientMutation>, StorageError> {
        let Some((key, mutation)) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.consumed.push(key);
        Ok(Some(mutation))
    }

    fn stage(&mut self, tx: &mut Transaction<'_>) -> Result<(), StorageError> {
        for key in &self.consumed {
            tx.del(key)?;
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.consumed.clear();
    }

    fn rollback(&mut self) {
        // Durable entries were never deleted; the next `begin` reloads them.
        self.consumed.clear();
        self.pending.clear();
    }
}
