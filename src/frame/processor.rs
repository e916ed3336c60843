//! Frame Processor
//!
//! Drains the mutation source for one time window, applies each due
//! mutation through the registry with an idempotency check against the
//! client's record, advances GlobalVersion at most once, and fans the net
//! patch out to every connected client.

use crate::error::{FrameError, StorageError};
use crate::frame::patch::{PatchLog, PatchTracker};
use crate::frame::{ClientPokeBody, FrameOutcome, FrameStats, Poke};
use crate::mutation::{ClientMutation, MutationSource, MutatorRegistry};
use crate::store::{ClientRecord, Transaction, VersionedStore};
use crate::types::{ClientId, Timestamp, Version};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, info_span, warn};

/// Half-open frame window `[start, end)`.
///
/// Mutations at or after `end` are not due yet and stay in the source.
/// Mutations before `start` are consumed without effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl FrameWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }
}

/// Client records touched during a frame, in order of first touch.
#[derive(Default)]
struct TouchedClients {
    order: Vec<ClientId>,
    records: HashMap<ClientId, ClientRecord>,
}

impl TouchedClients {
    fn get(&self, client_id: &str) -> Option<&ClientRecord> {
        self.records.get(client_id)
    }

    fn set(&mut self, client_id: &str, record: ClientRecord) {
        if self.records.insert(client_id.to_string(), record).is_none() {
            self.order.push(client_id.to_string());
        }
    }
}

pub struct FrameProcessor<'r> {
    registry: &'r MutatorRegistry,
}

impl<'r> FrameProcessor<'r> {
    pub fn new(registry: &'r MutatorRegistry) -> Self {
        Self { registry }
    }

    /// Run one frame in its own transaction.
    ///
    /// On success the transaction and the source consumption commit
    /// together. On any error both roll back, nothing is written, and the
    /// error is returned for the caller to retry the frame.
    pub fn run(
        &self,
        store: &VersionedStore,
        source: &mut dyn MutationSource,
        clients: &[ClientId],
        window: FrameWindow,
    ) -> Result<FrameOutcome, FrameError> {
        let mut tx = store.begin();
        let result = self.run_in(&mut tx, source, clients, window);
        match result {
            // `commit` only errors when the batch was not applied, so the
            // source can be rolled back with it.
            Ok(outcome) => match tx.commit() {
                Ok(()) => {
                    source.commit();
                    Ok(outcome)
                }
                Err(err) => {
                    source.rollback();
                    Err(err.into())
                }
            },
            Err(err) => {
                tx.rollback();
                source.rollback();
                warn!(error = %err, "Frame rolled back");
                Err(err)
            }
        }
    }

    fn run_in(
        &self,
        tx: &mut Transaction<'_>,
        source: &mut dyn MutationSource,
        clients: &[ClientId],
        window: FrameWindow,
    ) -> Result<FrameOutcome, FrameError> {
        source.begin(tx, window.end)?;
        let outcome = self.process(tx, source, clients, window)?;
        source.stage(tx)?;
        Ok(outcome)
    }

    /// Process one frame inside a caller-owned transaction.
    ///
    /// The caller is responsible for committing or rolling back both `tx`
    /// and `source`; [`FrameProcessor::run`] does this.
    pub fn process(
        &self,
        tx: &mut Transaction<'_>,
        source: &mut dyn MutationSource,
        clients: &[ClientId],
        window: FrameWindow,
    ) -> Result<FrameOutcome, FrameError> {
        if window.start > window.end {
            return Err(FrameError::InvalidWindow {
                start: window.start,
                end: window.end,
            });
        }

        let span = info_span!("frame", start = window.start, end = window.end);
        let _enter = span.enter();

        let base_cookie = tx.version()?;
        let cookie = base_cookie + 1;
        let mut log = PatchLog::default();
        let mut touched = TouchedClients::default();
        let mut stats = FrameStats::default();

        loop {
            let due = match source.peek()? {
                None => break,
                Some(next) => next.timestamp < window.end,
            };
            if !due {
                break;
            }
            let Some(mutation) = source.next()? else {
                break;
            };

            if mutation.timestamp < window.start {
                stats.skipped_stale += 1;
                debug!(
                    client_id = %mutation.client_id,
                    mutation_id = mutation.id,
                    timestamp = mutation.timestamp,
                    "Skipping stale mutation"
                );
                continue;
            }

            let record = match touched.get(&mutation.client_id) {
                Some(record) => record.clone(),
                None => tx.client_record(&mutation.client_id)?.unwrap_or_default(),
            };

            if mutation.id <= record.last_mutation_id {
                stats.skipped_duplicate += 1;
                debug!(
                    client_id = %mutation.client_id,
                    mutation_id = mutation.id,
                    last_mutation_id = record.last_mutation_id,
                    "Skipping already applied mutation"
                );
                continue;
            }

            if !self.apply(tx, cookie, &mut log, &mutation)? {
                stats.unknown_mutator += 1;
                continue;
            }

            touched.set(
                &mutation.client_id,
                ClientRecord {
                    last_mutation_id: mutation.id,
                    last_version: Some(cookie),
                },
            );
            stats.applied += 1;
        }

        if stats.applied == 0 {
            info!(
                version = base_cookie,
                consumed = stats.consumed(),
                "Frame applied no mutations"
            );
            return Ok(FrameOutcome {
                base_cookie,
                cookie: base_cookie,
                pokes: Vec::new(),
                stats,
            });
        }

        for client_id in &touched.order {
            if let Some(record) = touched.records.get(client_id) {
                tx.put_client_record(client_id, record)?;
            }
        }
        tx.set_version(cookie)?;

        let patch = log.into_patch();
        let pokes = self.fan_out(tx, &touched, clients, base_cookie, cookie, &patch, window)?;

        info!(
            base_cookie,
            cookie,
            applied = stats.applied,
            skipped_stale = stats.skipped_stale,
            skipped_duplicate = stats.skipped_duplicate,
            unknown_mutator = stats.unknown_mutator,
            patch_len = patch.len(),
            pokes = pokes.len(),
            "Frame processed"
        );

        Ok(FrameOutcome {
            base_cookie,
            cookie,
            pokes,
            stats,
        })
    }

    /// Apply one mutation. Returns `false` when its name is not registered.
    fn apply(
        &self,
        tx: &mut Transaction<'_>,
        cookie: Version,
        log: &mut PatchLog,
        mutation: &ClientMutation,
    ) -> Result<bool, FrameError> {
        let mutator = match self.registry.lookup(&mutation.name) {
            Ok(mutator) => mutator,
            Err(err) => {
                warn!(
                    client_id = %mutation.client_id,
                    mutation_id = mutation.id,
                    error = %err,
                    "Skipping mutation with unknown name"
                );
                return Ok(false);
            }
        };

        let mut tracker = PatchTracker::new(tx, cookie, log);
        mutator
            .apply(&mut tracker, &mutation.args)
            .map_err(|source| FrameError::Mutator {
                client_id: mutation.client_id.clone(),
                mutation_id: mutation.id,
                name: mutation.name.clone(),
                source,
            })?;
        debug!(
            client_id = %mutation.client_id,
            mutation_id = mutation.id,
            name = %mutation.name,
            "Mutation applied"
        );
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    fn fan_out(
        &self,
        tx: &Transaction<'_>,
        touched: &TouchedClients,
        clients: &[ClientId],
        base_cookie: Version,
        cookie: Version,
        patch: &[crate::frame::PatchOp],
        window: FrameWindow,
    ) -> Result<Vec<ClientPokeBody>, StorageError> {
        let mut seen = HashSet::new();
        let mut pokes = Vec::with_capacity(clients.len());
        for client_id in clients {
            if !seen.insert(client_id.as_str()) {
                continue;
            }
            let last_mutation_id = match touched.get(client_id) {
                Some(record) => record.last_mutation_id,
                None => tx
                    .client_record(client_id)?
                    .map(|r| r.last_mutation_id)
                    .unwrap_or(0),
            };
            pokes.push(ClientPokeBody {
                client_id: client_id.clone(),
                poke: Poke {
                    base_cookie,
                    cookie,
                    last_mutation_id,
                    patch: patch.to_vec(),
                    timestamp: window.start,
                },
            });
        }
        Ok(pokes)
    }
}
