//! Volatile storage.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use skript_types::{SerializedValue, TypeRegistry, Value};
use tracing::warn;

use crate::error::StorageResult;
use crate::storage::VariableStorage;

/// Keeps serialized variables in memory only. Everything is lost with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, SerializedValue>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage that loads `entries` as if they had been saved before.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (String, SerializedValue)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<SerializedValue> {
        self.entries.lock().get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl VariableStorage for MemoryStorage {
    fn load(&self, registry: &TypeRegistry, sink: &mut dyn FnMut(&str, Option<Value>)) -> StorageResult<()> {
        let entries = self.entries.lock().clone();
        for (name, saved) in &entries {
            match registry.deserialize_serialized(saved) {
                Some(value) => sink(name, Some(value)),
                None => warn!(variable = %name, "could not load variable of type '{}'", saved.type_code),
            }
        }
        Ok(())
    }

    fn save(&self, name: &str, value: Option<&SerializedValue>) -> StorageResult<()> {
        let mut entries = self.entries.lock();
        match value {
            Some(value) => {
                entries.insert(name.to_owned(), value.clone());
            }
            None => {
                entries.remove(name);
            }
        }
        Ok(())
    }

    fn rewrite(&self, variables: &[(String, SerializedValue)]) -> StorageResult<()> {
        *self.entries.lock() = variables.iter().cloned().collect();
        Ok(())
    }
}
