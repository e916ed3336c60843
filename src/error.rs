//! Error types for the pokesync reconciliation engine.

use crate::types::{ClientId, MutationId, Timestamp};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupt value under key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    }
}

/// Mutator registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown mutator: {0}")]
    UnknownMutator(String),

    #[error("Mutator already registered: {0}")]
    DuplicateMutator(String),
}

/// Errors that abort a whole frame. The frame transaction is rolled back
/// before any of these reaches the caller.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Mutator '{name}' failed for client {client_id} mutation {mutation_id}: {source}")]
    Mutator {
        client_id: ClientId,
        mutation_id: MutationId,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid frame window: start {start} is after end {end}")]
    InvalidWindow { start: Timestamp, end: Timestamp },
}

/// Errors surfaced by the CLI and configuration layer
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Frame failed: {0}")]
    FrameError(#[from] FrameError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
