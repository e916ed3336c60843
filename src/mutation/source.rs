//! Peekable mutation sources
//!
//! The frame processor looks at the next mutation before deciding whether it
//! belongs to the current frame, so `peek` must be side-effect free and
//! repeatable. Everything handed out by `next` stays provisional until
//! `commit`; `rollback` puts it back in its original order, which keeps the
//! source's consumption boundary aligned with the frame transaction.

use crate::error::StorageError;
use crate::mutation::ClientMutation;
use crate::store::Transaction;
use crate::types::Timestamp;
use std::collections::VecDeque;

pub trait MutationSource {
    /// Called once the frame transaction is open, before the first `peek`.
    /// Nothing stamped at or after `until` is due in this frame, so a source
    /// may leave such mutations unloaded.
    fn begin(&mut self, _tx: &Transaction<'_>, _until: Timestamp) -> Result<(), StorageError> {
        Ok(())
    }

    /// Next pending mutation, without consuming it.
    fn peek(&mut self) -> Result<Option<&ClientMutation>, StorageError>;

    /// Consume and return the next pending mutation.
    fn next(&mut self) -> Result<Option<ClientMutation>, StorageError>;

    /// Record everything consumed so far into the frame transaction.
    fn stage(&mut self, _tx: &mut Transaction<'_>) -> Result<(), StorageError> {
        Ok(())
    }

    /// The frame committed; consumed mutations are gone for good.
    fn commit(&mut self);

    /// The frame rolled back; consumed mutations become pending again.
    fn rollback(&mut self);
}

/// In-memory queue, ordered by timestamp.
#[derive(Debug, Default)]
pub struct MemoryMutationSource {
    pending: VecDeque<ClientMutation>,
    consumed: Vec<ClientMutation>,
}

impl MemoryMutationSource {
    pub fn new(mutations: impl IntoIterator<Item = ClientMutation>) -> Self {
        let mut pending: Vec<ClientMutation> = mutations.into_iter().collect();
        // Stable: equal timestamps keep submission order.
        pending.sort_by_key(|m| m.timestamp);
        Self {
            pending: pending.into(),
            consumed: Vec::new(),
        }
    }

    /// Enqueue a mutation behind every pending one with the same or an
    /// earlier timestamp.
    pub fn push(&mut self, mutation: ClientMutation) {
        let at = self
            .pending
            .iter()
            .rposition(|m| m.timestamp <= mutation.timestamp)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.pending.insert(at, mutation);
    }

    /// Pending (not yet consumed) mutations
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ClientMutation> {
        self.pending.iter()
    }
}

impl MutationSource for MemoryMutationSource {
    fn peek(&mut self) -> Result<Option<&ClientMutation>, StorageError> {
        Ok(self.pending.front())
    }

    fn next(&mut self) -> Result<Option<ClientMutation>, StorageError> {
        let Some(mutation) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.consumed.push(mutation.clone());
        Ok(Some(mutation))
    }

    fn commit(&mut self) {
        self.consumed.clear();
    }

    fn rollback(&mut self) {
        for mutation in self.consumed.drain(..).rev() {
            self.pending.push_front(mutation);
        }
    }
}
