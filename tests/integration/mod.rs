//! Integration tests for the pokesync frame processor

mod durable_queue;
mod idempotency;
mod pull_consistency;
mod test_utils;
