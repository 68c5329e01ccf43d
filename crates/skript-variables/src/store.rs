//! The global variable store.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam::queue::SegQueue;
use hashbrown::HashMap;
use parking_lot::RwLock;
use skript_config::{Severity, SectionNode, SectionValidator};
use skript_types::{ParseContext, SerializedValue, Timespan, TypeRegistry, Value};
use tracing::{debug, error, warn};

use crate::error::{StorageError, StorageResult};
use crate::flatfile::FlatFileStorage;
use crate::lmdb::LmdbStorage;
use crate::map::{Variable, VariablesMap};
use crate::memory::MemoryStorage;
use crate::name::is_list;
use crate::storage::{Storage, VariableStorage};

/// Conflicts reported one by one before switching to a summary.
const MAX_CONFLICT_WARNINGS: usize = 10;

/// Global variables shared by every script, persisted to one or more storages.
///
/// Reads take a shared lock. A write that finds the lock taken is queued and
/// applied by the next writer or reader, so setting a variable never blocks on
/// a reader.
pub struct Variables {
    registry: Arc<TypeRegistry>,
    map: RwLock<VariablesMap>,
    pending: SegQueue<(String, Option<Value>)>,
    storages: Vec<Storage>,
    closed: AtomicBool,
}

impl Variables {
    /// Create the storages declared in the `databases` section of `main` and
    /// load their variables. Relative files are resolved against `base_dir`.
    pub fn load(main: &SectionNode, registry: Arc<TypeRegistry>, base_dir: &Path) -> StorageResult<Self> {
        let Some(databases) = main.get_section("databases") else {
            error!("{}", StorageError::MissingDatabases);
            return Err(StorageError::MissingDatabases);
        };

        let mut builder = VariablesBuilder::new(registry);
        let mut failures = 0;
        for node in databases.iter().filter(|node| !node.is_void()) {
            let (Some(name), Some(section)) = (node.key(), node.as_section()) else {
                error!("Invalid line in databases: databases must be defined as sections");
                failures += 1;
                continue;
            };
            match DatabaseDefinition::read(name, section, &builder.registry, base_dir) {
                Ok(Some(definition)) => builder.definitions.push(definition),
                Ok(None) => debug!(database = name, "database disabled"),
                Err(e) => {
                    error!("{e}");
                    failures += 1;
                }
            }
        }
        builder.failures = failures;
        builder.build()
    }

    /// A store over the given storages. See [`VariablesBuilder`].
    #[must_use]
    pub fn builder(registry: Arc<TypeRegistry>) -> VariablesBuilder {
        VariablesBuilder::new(registry)
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn storages(&self) -> &[Storage] {
        &self.storages
    }

    /// Set a variable, or delete it with `None`. `list::*` with `None` deletes
    /// the whole list.
    pub fn set_variable(&self, name: &str, value: Option<Value>) {
        if self.closed.load(Ordering::Acquire) {
            warn!(variable = name, "variables are closed, change ignored");
            return;
        }
        let value = value.map(|value| self.storable(value));
        match self.map.try_write() {
            Some(mut map) => {
                self.drain(&mut map);
                self.apply(&mut map, name, value);
            }
            None => self.pending.push((name.to_owned(), value)),
        }
    }

    /// A single value, or a whole list for `list::*`.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<Variable> {
        if self.pending.is_empty() {
            return self.map.read().get(name);
        }
        let mut map = self.map.write();
        self.drain(&mut map);
        let map = parking_lot::RwLockWriteGuard::downgrade(map);
        map.get(name)
    }

    /// Number of single values, list values included.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.map.read().len()
    }

    /// Apply every queued change now.
    pub fn flush(&self) {
        if !self.pending.is_empty() {
            self.drain(&mut self.map.write());
        }
    }

    /// Rewrite every storage with the variables it currently owns.
    pub fn save_all(&self) -> StorageResult<()> {
        let mut per_storage: Vec<Vec<(String, SerializedValue)>> = vec![Vec::new(); self.storages.len()];
        {
            let mut map = self.map.write();
            self.drain(&mut map);
            for (name, value) in map.entries() {
                let Some(index) = self.storages.iter().position(|storage| storage.accept(&name)) else {
                    continue;
                };
                match self.registry.serialize(value) {
                    Some(saved) => per_storage[index].push((name, saved)),
                    None => warn!(variable = %name, "can't save variable, its type is not serializable"),
                }
            }
        }
        for (storage, variables) in self.storages.iter().zip(&per_storage) {
            storage.backend().rewrite(variables)?;
            debug!(database = storage.name(), count = variables.len(), "rewrote variables");
        }
        Ok(())
    }

    /// Apply queued changes, then wait for every storage writer to finish.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.drain(&mut self.map.write());
        for storage in &self.storages {
            storage.close();
        }
    }

    fn storable(&self, value: Value) -> Value {
        let Some(info) = self.registry.get_super_class_info(value.runtime_type()) else {
            return value;
        };
        let Some(target) = info.serialize_as() else {
            return value;
        };
        match self.registry.converters().convert(Some(&value), target) {
            Some(converted) => converted,
            None => {
                warn!(class = info.code_name(), "can't convert value to its storage type");
                value
            }
        }
    }

    fn drain(&self, map: &mut VariablesMap) {
        while let Some((name, value)) = self.pending.pop() {
            self.apply(map, &name, value);
        }
    }

    fn apply(&self, map: &mut VariablesMap, name: &str, value: Option<Value>) {
        if is_list(name) {
            if value.is_some() {
                warn!(variable = name, "can't set a whole list to a single value");
                return;
            }
            for removed in map.remove_list(name) {
                self.save_change(&removed, None);
            }
            return;
        }
        map.set(name, value.clone());
        self.save_change(name, value.as_ref());
    }

    fn save_change(&self, name: &str, value: Option<&Value>) {
        let Some(storage) = self.storages.iter().find(|storage| storage.accept(name)) else {
            return;
        };
        match value {
            None => storage.queue(name, None),
            Some(value) => match self.registry.serialize(value) {
                Some(saved) => storage.queue(name, Some(saved)),
                None => warn!(variable = name, "can't save variable, its type is not serializable"),
            },
        }
    }
}

impl Drop for Variables {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Variables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variables")
            .field("storages", &self.storages)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatabaseKind {
    FlatFile,
    Lmdb,
    Memory,
}

impl DatabaseKind {
    /// `None` for a disabled database.
    fn from_name(name: &str) -> StorageResult<Option<Self>> {
        match name.to_ascii_lowercase().as_str() {
            "csv" | "file" | "flatfile" => Ok(Some(Self::FlatFile)),
            "lmdb" | "database" => Ok(Some(Self::Lmdb)),
            "memory" => Ok(Some(Self::Memory)),
            "disabled" | "none" => Ok(None),
            _ => Err(StorageError::InvalidDatabaseType(name.to_owned())),
        }
    }

    const fn requires_file(self) -> bool {
        !matches!(self, Self::Memory)
    }
}

struct DatabaseDefinition {
    storage: Storage,
    backup_interval: Option<Duration>,
}

impl DatabaseDefinition {
    fn read(
        name: &str,
        section: &SectionNode,
        registry: &TypeRegistry,
        base_dir: &Path,
    ) -> StorageResult<Option<Self>> {
        let validator = SectionValidator::new()
            .entry("type", true)
            .entry("pattern", true)
            .entry("file", true)
            .entry("backup interval", true)
            .allow_undefined_entries();
        for diagnostic in validator.validate(section) {
            match diagnostic.severity {
                Severity::Error => error!(database = name, "{}", diagnostic.message),
                Severity::Warning => warn!(database = name, "{}", diagnostic.message),
            }
        }

        let entry = |key: &str| {
            section
                .get_value(key)
                .ok_or_else(|| StorageError::MissingEntry {
                    key: key.to_owned(),
                    database: name.to_owned(),
                })
        };
        let Some(kind) = DatabaseKind::from_name(entry("type")?)? else {
            return Ok(None);
        };
        let pattern = entry("pattern")?;

        let backend: Arc<dyn VariableStorage> = if kind.requires_file() {
            let file = base_dir.join(entry("file")?);
            match kind {
                DatabaseKind::FlatFile => Arc::new(FlatFileStorage::new(file)),
                _ => Arc::new(LmdbStorage::new(file)),
            }
        } else {
            Arc::new(MemoryStorage::new())
        };

        let backup_interval = match section.get_value("backup interval").map(str::trim) {
            None | Some("0") => None,
            Some(_) if !kind.requires_file() => None,
            Some(text) => {
                let interval = registry
                    .parse_as::<Timespan>(text, ParseContext::Config)
                    .ok_or_else(|| StorageError::InvalidEntry {
                        key: "backup interval".to_owned(),
                        database: name.to_owned(),
                        expected: "a timespan".to_owned(),
                    })?;
                u64::try_from(interval.millis())
                    .ok()
                    .map(Duration::from_millis)
                    .filter(|interval| *interval >= Duration::from_secs(1))
            }
        };

        Ok(Some(Self {
            storage: Storage::new(name, pattern, backend)?,
            backup_interval,
        }))
    }
}

/// Assembles a [`Variables`] store from storages and loads them.
///
/// ```
/// use std::sync::Arc;
/// use skript_types::{RegistryBuilder, Settings, Value, defaults};
/// use skript_variables::{MemoryStorage, Variables};
///
/// let mut registry = RegistryBuilder::new(Settings::strict());
/// defaults::register_defaults(&mut registry).unwrap();
/// let variables = Variables::builder(Arc::new(registry.build().unwrap()))
///     .storage("default", ".*", Arc::new(MemoryStorage::new()))
///     .unwrap()
///     .build()
///     .unwrap();
///
/// variables.set_variable("points::alice", Some(Value::new(3_i64)));
/// assert_eq!(variables.variable_count(), 1);
/// variables.close();
/// ```
pub struct VariablesBuilder {
    registry: Arc<TypeRegistry>,
    definitions: Vec<DatabaseDefinition>,
    failures: usize,
}

impl VariablesBuilder {
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            definitions: Vec::new(),
            failures: 0,
        }
    }

    /// Add a storage. Earlier storages take precedence for names several patterns accept.
    pub fn storage(
        mut self,
        name: impl Into<String>,
        pattern: &str,
        backend: Arc<dyn VariableStorage>,
    ) -> StorageResult<Self> {
        self.definitions.push(DatabaseDefinition {
            storage: Storage::new(name, pattern, backend)?,
            backup_interval: None,
        });
        Ok(self)
    }

    /// Load every storage, resolve conflicts and move variables whose storage changed.
    pub fn build(self) -> StorageResult<Variables> {
        let Self {
            registry,
            definitions,
            mut failures,
        } = self;

        let mut loading = Loading::default();
        let mut storages = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let index = storages.len();
            let storage = definition.storage;
            let before = loading.loaded.len();
            let start = Instant::now();

            // Merged only once the whole storage has loaded.
            let mut batch = Vec::new();
            let mut sink = |name: &str, value: Option<Value>| batch.push((name.to_owned(), value));
            let result = storage.load(&registry, &mut sink).and_then(|()| storage.start());
            match result {
                Ok(()) => {
                    for (name, value) in batch {
                        loading.loaded(&storages, &storage, index, &name, value);
                    }
                    if let Some(interval) = definition.backup_interval {
                        storage.start_backups(interval)?;
                    }
                    debug!(
                        "Loaded {} variables from the database '{}' in {:.1} seconds",
                        loading.loaded.len().saturating_sub(before),
                        storage.name(),
                        start.elapsed().as_secs_f64()
                    );
                    storages.push(storage);
                }
                Err(e) => {
                    error!(database = storage.name(), "{e}");
                    failures += 1;
                }
            }
        }

        if loading.conflicts > MAX_CONFLICT_WARNINGS {
            warn!(
                "A total of {} variables were loaded more than once from different databases",
                loading.conflicts
            );
        }

        let variables = Variables {
            registry,
            map: RwLock::new(VariablesMap::new()),
            pending: SegQueue::new(),
            storages,
            closed: AtomicBool::new(false),
        };

        let discarded = variables.place_loaded(loading.loaded);
        if discarded != 0 {
            warn!(
                "{discarded} variables were possibly discarded due to not belonging to any database (LMDB and memory databases keep such variables and will continue to generate this warning, while CSV discards them)."
            );
        }
        for storage in &variables.storages {
            if let Err(e) = storage.backend().all_loaded() {
                error!(database = storage.name(), "{e}");
                failures += 1;
            }
        }

        if failures > 0 {
            variables.close();
            return Err(StorageError::LoadFailed(failures));
        }
        if variables.storages.is_empty() {
            error!("{}", StorageError::NoDatabases);
            variables.close();
            return Err(StorageError::NoDatabases);
        }
        Ok(variables)
    }
}

/// Variables read so far, with the index of the storage each came from.
#[derive(Default)]
struct Loading {
    loaded: HashMap<String, (Value, usize)>,
    conflicts: usize,
}

impl Loading {
    /// Record a variable read by `current`, the storage at `index`. The newest
    /// storage wins a conflict and the older one gets a delete.
    fn loaded(&mut self, storages: &[Storage], current: &Storage, index: usize, name: &str, value: Option<Value>) {
        let Some(value) = value else {
            if self.loaded.get(name).is_some_and(|(_, source)| *source == index) {
                self.loaded.remove(name);
            }
            return;
        };
        let Some((_, source)) = self.loaded.insert(name.to_owned(), (value, index)) else {
            return;
        };
        if source == index {
            return;
        }
        let older = &storages[source];
        self.conflicts += 1;
        if self.conflicts <= MAX_CONFLICT_WARNINGS {
            warn!(
                "The variable {{{name}}} was loaded twice from different databases ({} and {}), only the one from {} will be kept.",
                older.name(),
                current.name(),
                current.name()
            );
        } else if self.conflicts == MAX_CONFLICT_WARNINGS + 1 {
            warn!(
                "[!] More than {MAX_CONFLICT_WARNINGS} variables were loaded more than once from different databases, no more warnings will be printed."
            );
        }
        older.queue(name, None);
    }
}

impl Variables {
    /// Put loaded variables into the map, moving those whose storage changed.
    /// Returns how many no storage accepts.
    fn place_loaded(&self, loaded: HashMap<String, (Value, usize)>) -> usize {
        let mut map = self.map.write();
        let mut discarded = 0;
        for (name, (value, source)) in loaded {
            let target = self.storages.iter().position(|storage| storage.accept(&name));
            if target != Some(source) {
                match target {
                    Some(target) => match self.registry.serialize(&value) {
                        Some(saved) => {
                            self.storages[target].queue(&name, Some(saved));
                            self.storages[source].queue(&name, None);
                        }
                        None => warn!(variable = %name, "can't move variable, its type is not serializable"),
                    },
                    None => discarded += 1,
                }
            }
            map.set(&name, Some(value));
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_kinds() {
        assert_eq!(DatabaseKind::from_name("CSV").unwrap(), Some(DatabaseKind::FlatFile));
        assert_eq!(DatabaseKind::from_name("flatfile").unwrap(), Some(DatabaseKind::FlatFile));
        assert_eq!(DatabaseKind::from_name("Database").unwrap(), Some(DatabaseKind::Lmdb));
        assert_eq!(DatabaseKind::from_name("none").unwrap(), None);
        assert!(matches!(
            DatabaseKind::from_name("mysql"),
            Err(StorageError::InvalidDatabaseType(t)) if t == "mysql"
        ));
    }
}
