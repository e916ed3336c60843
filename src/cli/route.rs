//! CLI route: single route table and run context.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_outcome, format_status_json, format_status_text};
use crate::config::{ConfigLoader, SyncConfig};
use crate::error::{ApiError, FrameError, RegistryError};
use crate::frame::{FrameProcessor, FrameWindow};
use crate::mutation::{ClientMutation, MutatorRegistry, PendingQueue, QueuedMutationSource};
use crate::pull::pull;
use crate::store::{KvStore, VersionedStore};
use crate::types::Timestamp;
use anyhow::anyhow;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Built-in key/value mutators used by the CLI:
/// `set {key, value}` and `delete {key}`.
pub fn kv_registry() -> Result<MutatorRegistry, RegistryError> {
    MutatorRegistry::new()
        .with(
            "set",
            |tx: &mut dyn KvStore, args: &Value| -> anyhow::Result<()> {
                let key = args["key"]
                    .as_str()
                    .ok_or_else(|| anyhow!("set: missing string argument 'key'"))?;
                tx.put(key, args.get("value").cloned().unwrap_or(Value::Null))?;
                Ok(())
            },
        )?
        .with(
            "delete",
            |tx: &mut dyn KvStore, args: &Value| -> anyhow::Result<()> {
                let key = args["key"]
                    .as_str()
                    .ok_or_else(|| anyhow!("delete: missing string argument 'key'"))?;
                tx.del(key)?;
                Ok(())
            },
        )
}

fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// Runtime context for CLI execution: config, store and registry.
pub struct RunContext {
    config: SyncConfig,
    store: VersionedStore,
    registry: MutatorRegistry,
    store_path: PathBuf,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;

        let store_path = config.storage.resolve_path(&workspace_root);
        std::fs::create_dir_all(&store_path)
            .map_err(|e| ApiError::StorageError(crate::error::StorageError::IoError(e)))?;
        let store = VersionedStore::open(&store_path)?
            .with_flush_on_commit(config.storage.flush_on_commit);
        let registry = kv_registry()
            .map_err(|e| ApiError::ConfigError(format!("Failed to build registry: {}", e)))?;

        info!(store = %store_path.display(), "Store opened");
        Ok(Self {
            config,
            store,
            registry,
            store_path,
        })
    }

    pub fn store(&self) -> &VersionedStore {
        &self.store
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Status { format } => self.status(format),
            Commands::Push { file } => self.push(file),
            Commands::Process {
                start,
                end,
                clients,
            } => self.process(*start, *end, clients),
            Commands::Run { clients, frames } => self.run(clients, *frames),
            Commands::Pull { client } => {
                let response = pull(&self.store, client)?;
                to_json(&response)
            }
            Commands::Get { key } => match self.store.user_value(key)? {
                Some(value) => to_json(&value),
                None => Err(ApiError::InvalidInput(format!("Key not found: {}", key))),
            },
        }
    }

    fn status(&self, format: &str) -> Result<String, ApiError> {
        let summary = self.store.summary()?;
        if format == "json" {
            format_status_json(&self.store_path, &summary)
        } else {
            Ok(format_status_text(&self.store_path, &summary))
        }
    }

    fn push(&self, file: &Path) -> Result<String, ApiError> {
        let raw = if file.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| ApiError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            buf
        } else {
            std::fs::read_to_string(file).map_err(|e| {
                ApiError::InvalidInput(format!("Failed to read {:?}: {}", file, e))
            })?
        };
        let mutations: Vec<ClientMutation> = serde_json::from_str(&raw)
            .map_err(|e| ApiError::InvalidInput(format!("Invalid mutation list: {}", e)))?;
        let count = PendingQueue::new(&self.store).push(mutations)?;
        Ok(format!("Enqueued {} mutation(s)", count))
    }

    fn process(
        &self,
        start: Option<u64>,
        end: Option<u64>,
        clients: &[String],
    ) -> Result<String, ApiError> {
        let end = end.unwrap_or_else(now_millis);
        let start = start.unwrap_or_else(|| end.saturating_sub(self.config.frame.window_ms));
        let processor = FrameProcessor::new(&self.registry);
        let mut source = QueuedMutationSource::new();
        let outcome = processor.run(
            &self.store,
            &mut source,
            clients,
            FrameWindow::new(start, end),
        )?;
        format_outcome(&outcome)
    }

    /// Drive frames on a fixed interval. Each frame covers
    /// `[previous end, now)`; the first one looks back `frame.window_ms`.
    fn run(&self, clients: &[String], frames: Option<u64>) -> Result<String, ApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start runtime: {}", e)))?;

        let interval = Duration::from_millis(self.config.frame.interval_ms);
        let processor = FrameProcessor::new(&self.registry);
        let mut source = QueuedMutationSource::new();

        runtime.block_on(async {
            let mut ticker = tokio::time::interval(interval);
            let mut start = now_millis().saturating_sub(self.config.frame.window_ms);
            let mut completed = 0u64;
            let mut advanced = 0u64;
            let mut retries = FrameRetries::default();

            loop {
                if frames.map(|limit| completed >= limit).unwrap_or(false) {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted; stopping frame loop");
                        break;
                    }
                }

                let end = now_millis().max(start);
                match processor.run(&self.store, &mut source, clients, FrameWindow::new(start, end)) {
                    Ok(outcome) => {
                        if outcome.advanced() {
                            advanced += 1;
                            println!("{}", format_outcome(&outcome)?);
                        }
                        retries.succeeded();
                        start = end;
                    }
                    // Window is retried on the next tick.
                    Err(err) => {
                        retries.failed(start, &err);
                    }
                }
                completed += 1;
            }

            Ok::<String, ApiError>(format!(
                "Processed {} frame(s), {} advanced the version to {}, {} failed",
                completed,
                advanced,
                self.store.version()?,
                retries.total_failures
            ))
        })
    }
}

/// Failure bookkeeping for the `run` loop. A failed frame leaves its window
/// start in place, so consecutive failures with the same start are retries of
/// one stuck window.
#[derive(Debug, Default)]
struct FrameRetries {
    window_start: Option<Timestamp>,
    attempts: u64,
    total_failures: u64,
}

impl FrameRetries {
    /// Record a failed attempt and return how many times this window has
    /// failed in a row. The cause is logged in full on the first failure
    /// only; later attempts are logged at doubling intervals.
    fn failed(&mut self, window_start: Timestamp, err: &FrameError) -> u64 {
        if self.window_start != Some(window_start) {
            self.window_start = Some(window_start);
            self.attempts = 0;
        }
        self.attempts += 1;
        self.total_failures += 1;

        if self.attempts == 1 {
            match err {
                FrameError::Mutator {
                    client_id,
                    mutation_id,
                    name,
                    source,
                } => error!(
                    client_id = %client_id,
                    mutation_id = *mutation_id,
                    mutator = %name,
                    error = %source,
                    window_start,
                    "Mutator failed; frame window will be retried"
                ),
                other => error!(
                    error = %other,
                    window_start,
                    "Frame failed; frame window will be retried"
                ),
            }
        } else if self.attempts.is_power_of_two() {
            warn!(
                attempts = self.attempts,
                window_start,
                error = %err,
                "Frame window still failing"
            );
        } else {
            debug!(attempts = self.attempts, window_start, "Frame retry failed");
        }
        self.attempts
    }

    fn succeeded(&mut self) {
        if self.attempts > 0 {
            info!(attempts = self.attempts, "Frame window recovered after retries");
        }
        self.window_start = None;
        self.attempts = 0;
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::InvalidInput(format!("Failed to render JSON: {}", e)))
}
