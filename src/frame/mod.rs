//! Frames
//!
//! A frame is one bounded pass over pending mutations inside a single
//! storage transaction. Its result is a set of pokes: the same net patch and
//! cookie pair for every connected client, each tagged with that client's
//! last acknowledged mutation id.

pub mod patch;
pub mod processor;

pub use patch::{PatchLog, PatchTracker};
pub use processor::{FrameProcessor, FrameWindow};

use crate::types::{ClientId, MutationId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a net state delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Put { key: String, value: Value },
    Del { key: String },
}

impl PatchOp {
    pub fn key(&self) -> &str {
        match self {
            PatchOp::Put { key, .. } | PatchOp::Del { key } => key,
        }
    }
}

/// Delta from `base_cookie` to `cookie`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poke {
    pub base_cookie: Version,
    pub cookie: Version,
    #[serde(rename = "lastMutationID")]
    pub last_mutation_id: MutationId,
    pub patch: Vec<PatchOp>,
    pub timestamp: Timestamp,
}

/// A poke addressed to one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPokeBody {
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    pub poke: Poke,
}

/// Per-frame counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub applied: usize,
    pub skipped_stale: usize,
    pub skipped_duplicate: usize,
    pub unknown_mutator: usize,
}

impl FrameStats {
    /// Mutations taken from the source, whatever happened to them
    pub fn consumed(&self) -> usize {
        self.applied + self.skipped_stale + self.skipped_duplicate + self.unknown_mutator
    }
}

/// Result of one frame. `cookie == base_cookie` and `pokes` is empty when
/// nothing was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOutcome {
    pub base_cookie: Version,
    pub cookie: Version,
    pub pokes: Vec<ClientPokeBody>,
    pub stats: FrameStats,
}

impl FrameOutcome {
    pub fn advanced(&self) -> bool {
        self.cookie != self.base_cookie
    }
}
