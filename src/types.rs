//! Shared identifier and counter types.

/// Client identifier as supplied by the transport.
pub type ClientId = String;

/// Per-client mutation sequence number. Zero means "nothing applied yet".
pub type MutationId = u64;

/// GlobalVersion value, also exposed to clients as the sync cookie.
pub type Version = u64;

/// Submission time of a mutation (milliseconds since the epoch).
pub type Timestamp = u64;
