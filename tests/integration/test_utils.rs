//! Shared test utilities for integration tests

use anyhow::anyhow;
use pokesync::store::{ClientRecord, KvStore};
use pokesync::types::ClientId;
use pokesync::{ClientMutation, MutatorRegistry, VersionedStore};
use serde_json::{json, Value};

/// Registry with `put {key, value}`, `del {key}`, `incr {key}` and `fail`.
pub fn registry() -> MutatorRegistry {
    MutatorRegistry::new()
        .with(
            "put",
            |tx: &mut dyn KvStore, args: &Value| -> anyhow::Result<()> {
                let key = args["key"].as_str().ok_or_else(|| anyhow!("missing key"))?;
                tx.put(key, args["value"].clone())?;
                Ok(())
            },
        )
        .unwrap()
        .with(
            "del",
            |tx: &mut dyn KvStore, args: &Value| -> anyhow::Result<()> {
                let key = args["key"].as_str().ok_or_else(|| anyhow!("missing key"))?;
                tx.del(key)?;
                Ok(())
            },
        )
        .unwrap()
        .with(
            "incr",
            |tx: &mut dyn KvStore, args: &Value| -> anyhow::Result<()> {
                let key = args["key"].as_str().ok_or_else(|| anyhow!("missing key"))?;
                let current = tx.get(key)?.and_then(|v| v.as_i64()).unwrap_or(0);
                tx.put(key, json!(current + 1))?;
                Ok(())
            },
        )
        .unwrap()
        .with(
            "fail",
            |_tx: &mut dyn KvStore, _args: &Value| -> anyhow::Result<()> {
                Err(anyhow!("application rejected mutation"))
            },
        )
        .unwrap()
}

pub fn put(client: &str, id: u64, key: &str, value: &str, ts: u64) -> ClientMutation {
    ClientMutation::new(client, id, "put", json!({"key": key, "value": value}), ts)
}

pub fn del(client: &str, id: u64, key: &str, ts: u64) -> ClientMutation {
    ClientMutation::new(client, id, "del", json!({"key": key}), ts)
}

pub fn incr(client: &str, id: u64, key: &str, ts: u64) -> ClientMutation {
    ClientMutation::new(client, id, "incr", json!({"key": key}), ts)
}

pub fn clients(ids: &[&str]) -> Vec<ClientId> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Seed a store with a version and client cursors.
pub fn seed(store: &VersionedStore, version: u64, records: &[(&str, u64)]) {
    store
        .transact(|tx| -> Result<(), pokesync::error::StorageError> {
            tx.set_version(version)?;
            for (client_id, last_mutation_id) in records {
                tx.put_client_record(
                    client_id,
                    &ClientRecord {
                        last_mutation_id: *last_mutation_id,
                        last_version: Some(version),
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();
}
