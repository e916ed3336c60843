//! Mutator registry
//!
//! Maps mutation names to application-defined functions. Built once at
//! startup; the frame processor resolves each mutation's name here and
//! treats the function as opaque.

use crate::error::RegistryError;
use crate::store::KvStore;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Application function implementing one named mutation.
///
/// Called at most once per `(client, mutation id)`; the processor does the
/// deduplication, so implementations may treat every call as new. Any error
/// aborts and rolls back the whole frame.
pub trait Mutator: Send + Sync {
    fn apply(&self, tx: &mut dyn KvStore, args: &Value) -> anyhow::Result<()>;
}

impl<F> Mutator for F
where
    F: Fn(&mut dyn KvStore, &Value) -> anyhow::Result<()> + Send + Sync,
{
    fn apply(&self, tx: &mut dyn KvStore, args: &Value) -> anyhow::Result<()> {
        self(tx, args)
    }
}

#[derive(Default)]
pub struct MutatorRegistry {
    mutators: HashMap<String, Box<dyn Mutator>>,
}

impl MutatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mutator under `name`. Names are unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        mutator: impl Mutator + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.mutators.contains_key(&name) {
            return Err(RegistryError::DuplicateMutator(name));
        }
        self.mutators.insert(name, Box::new(mutator));
        Ok(())
    }

    /// Builder form of [`MutatorRegistry::register`]
    pub fn with(
        mut self,
        name: impl Into<String>,
        mutator: impl Mutator + 'static,
    ) -> Result<Self, RegistryError> {
        self.register(name, mutator)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn Mutator, RegistryError> {
        self.mutators
            .get(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| RegistryError::UnknownMutator(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mutators.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mutators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

impl fmt::Debug for MutatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutatorRegistry")
            .field("names", &self.names())
            .finish()
    }
}
