//! Pokesync: server-side reconciliation for optimistic client mutations
//!
//! Clients submit ordered, uniquely identified mutations. The frame
//! processor applies them against a versioned key-value store inside one
//! serializable transaction per frame, advances the global version, and
//! produces the poke each connected client needs to converge.

pub mod cli;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod mutation;
pub mod pull;
pub mod store;
pub mod types;

pub use frame::{ClientPokeBody, FrameOutcome, FrameProcessor, FrameWindow, PatchOp, Poke};
pub use mutation::{ClientMutation, MemoryMutationSource, MutationSource, MutatorRegistry};
pub use store::{KvStore, VersionedStore};
