//! Client mutations and where they come from
//!
//! A mutation is immutable once submitted. Sources hand them to the frame
//! processor in non-decreasing timestamp order; the registry maps a
//! mutation's name to the application function that applies it.

pub mod queue;
pub mod registry;
pub mod source;

pub use queue::{PendingQueue, QueuedMutationSource};
pub use registry::{Mutator, MutatorRegistry};
pub use source::{MemoryMutationSource, MutationSource};

use crate::types::{ClientId, MutationId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mutation as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMutation {
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    pub id: MutationId,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    pub timestamp: Timestamp,
}

impl ClientMutation {
    pub fn new(
        client_id: impl Into<ClientId>,
        id: MutationId,
        name: impl Into<String>,
        args: Value,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            id,
            name: name.into(),
            args,
            timestamp,
        }
    }
}
