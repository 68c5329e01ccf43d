//! Storage backends and the per-storage writer thread.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use regex::Regex;
use skript_types::{SerializedValue, TypeRegistry, Value};
use tracing::{debug, error, info, warn};

use crate::error::{StorageError, StorageResult};

/// Capacity of a storage's change queue.
pub const QUEUE_CAPACITY: usize = 1000;
/// Queue length above which the writer is considered too slow.
pub const QUEUE_WARNING_THRESHOLD: usize = 300;
const MESSAGE_INTERVAL: Duration = Duration::from_secs(10);

/// A durable home for variables.
///
/// Implementations guard their own state; every method may be called from the
/// writer thread as well as from the thread owning the store.
pub trait VariableStorage: Send + Sync {
    /// Read every stored variable. `None` marks a variable deleted by this storage.
    fn load(&self, registry: &TypeRegistry, sink: &mut dyn FnMut(&str, Option<Value>)) -> StorageResult<()>;

    /// Persist one change. `None` deletes the variable.
    fn save(&self, name: &str, value: Option<&SerializedValue>) -> StorageResult<()>;

    /// Replace the whole content with `variables`.
    fn rewrite(&self, variables: &[(String, SerializedValue)]) -> StorageResult<()>;

    fn connect(&self) -> StorageResult<()> {
        Ok(())
    }

    fn disconnect(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Called once every storage has finished loading.
    fn all_loaded(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Copy the persisted content aside, if the storage supports it.
    fn backup(&self) -> StorageResult<()> {
        Ok(())
    }

    /// The file or directory backing this storage.
    fn file(&self) -> Option<&Path> {
        None
    }
}

struct Change {
    name: String,
    value: Option<SerializedValue>,
}

/// A named storage with its variable name pattern and writer thread.
pub struct Storage {
    name: String,
    pattern: Option<Regex>,
    backend: Arc<dyn VariableStorage>,
    sender: Mutex<Option<Sender<Change>>>,
    receiver: Mutex<Option<Receiver<Change>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    backup: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
    last_warning: Mutex<Option<Instant>>,
    last_error: Mutex<Option<Instant>>,
}

impl Storage {
    /// Wrap `backend`. `pattern` must match a whole variable name; `.*` and `.+`
    /// accept every name.
    pub fn new(name: impl Into<String>, pattern: &str, backend: Arc<dyn VariableStorage>) -> StorageResult<Self> {
        let pattern = match pattern {
            ".*" | ".+" => None,
            pattern => Some(Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                StorageError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    source,
                }
            })?),
        };
        let (sender, receiver) = bounded(QUEUE_CAPACITY);
        Ok(Self {
            name: name.into(),
            pattern,
            backend,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            writer: Mutex::new(None),
            backup: Mutex::new(None),
            last_warning: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn VariableStorage> {
        &self.backend
    }

    /// Whether variables named `name` belong to this storage.
    #[must_use]
    pub fn accept(&self, name: &str) -> bool {
        self.pattern.as_ref().is_none_or(|pattern| pattern.is_match(name))
    }

    /// Number of changes waiting for the writer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, Sender::len)
    }

    pub(crate) fn load(&self, registry: &TypeRegistry, sink: &mut dyn FnMut(&str, Option<Value>)) -> StorageResult<()> {
        self.backend.load(registry, sink)
    }

    /// Start the writer thread. Changes queued before this stay queued.
    pub(crate) fn start(&self) -> StorageResult<()> {
        let Some(receiver) = self.receiver.lock().take() else {
            return Ok(());
        };
        let backend = Arc::clone(&self.backend);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("variable writer '{}'", self.name))
            .spawn(move || {
                for change in receiver {
                    if let Err(e) = backend.save(&change.name, change.value.as_ref()) {
                        error!(database = %name, variable = %change.name, "failed to save variable: {e}");
                    }
                }
                debug!(database = %name, "variable writer stopped");
            })?;
        *self.writer.lock() = Some(handle);
        Ok(())
    }

    /// Periodically back up the storage until it is closed.
    pub(crate) fn start_backups(&self, interval: Duration) -> StorageResult<()> {
        let (stop, stopped) = bounded::<()>(0);
        let backend = Arc::clone(&self.backend);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("variable backup '{}'", self.name))
            .spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    match backend.backup() {
                        Ok(()) => info!(database = %name, "created a backup of the variables"),
                        Err(e) => error!(database = %name, "could not back up the variables: {e}"),
                    }
                }
            })?;
        *self.backup.lock() = Some((stop, handle));
        Ok(())
    }

    /// Queue a change for the writer thread. Blocks while the queue is full.
    pub fn queue(&self, name: &str, value: Option<SerializedValue>) {
        let Some(sender) = self.sender.lock().clone() else {
            warn!(database = %self.name, variable = name, "{}", StorageError::Closed(self.name.clone()));
            return;
        };
        if sender.len() > QUEUE_WARNING_THRESHOLD && rate_limit(&self.last_warning) {
            warn!(
                "Cannot write variables to the database '{}' at sufficient speed; server performance may suffer and many variables will be lost if the server crashes. (this warning will be repeated at most once every {} seconds)",
                self.name,
                MESSAGE_INTERVAL.as_secs()
            );
        }

        let change = Change {
            name: name.to_owned(),
            value,
        };
        match sender.try_send(change) {
            Ok(()) => {}
            Err(TrySendError::Full(change)) => {
                if rate_limit(&self.last_error) {
                    error!(
                        "Skript cannot save any variables to the database '{}'. The server will hang and may crash if no more variables can be saved.",
                        self.name
                    );
                }
                if sender.send(change).is_err() {
                    error!(database = %self.name, variable = name, "the variable writer stopped, change lost");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                error!(database = %self.name, variable = name, "the variable writer stopped, change lost");
            }
        }
    }

    /// Stop accepting changes, wait until the writer has saved every queued
    /// change, then disconnect the backend.
    pub fn close(&self) {
        self.sender.lock().take();
        let receiver = self.receiver.lock().take();
        if let Some(receiver) = receiver {
            // Never started: save synchronously.
            for change in receiver {
                if let Err(e) = self.backend.save(&change.name, change.value.as_ref()) {
                    error!(database = %self.name, variable = %change.name, "failed to save variable: {e}");
                }
            }
        }
        let writer = self.writer.lock().take();
        if let Some(handle) = writer
            && handle.join().is_err()
        {
            error!(database = %self.name, "variable writer panicked");
        }
        let backup = self.backup.lock().take();
        if let Some((stop, handle)) = backup {
            drop(stop);
            if handle.join().is_err() {
                error!(database = %self.name, "variable backup thread panicked");
            }
        }
        if let Err(e) = self.backend.disconnect() {
            error!(database = %self.name, "failed to disconnect: {e}");
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.sender.lock().is_some() {
            self.close();
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("file", &self.backend.file())
            .finish_non_exhaustive()
    }
}

/// Returns true at most once per [`MESSAGE_INTERVAL`].
fn rate_limit(last: &Mutex<Option<Instant>>) -> bool {
    let mut last = last.lock();
    let now = Instant::now();
    if last.is_some_and(|at| now.duration_since(at) < MESSAGE_INTERVAL) {
        return false;
    }
    *last = Some(now);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;

    #[test]
    fn test_patterns() {
        let storage = Storage::new("a", "^a:.*", Arc::new(MemoryStorage::new())).unwrap();
        assert!(storage.accept("a:x"));
        assert!(!storage.accept("b:a:x"));
        let partial = Storage::new("b", "a", Arc::new(MemoryStorage::new())).unwrap();
        assert!(!partial.accept("ab"));
        let all = Storage::new("c", ".*", Arc::new(MemoryStorage::new())).unwrap();
        assert!(all.accept(""));

        let invalid = Storage::new("d", "(", Arc::new(MemoryStorage::new())).unwrap_err();
        assert!(matches!(invalid, StorageError::InvalidPattern { .. }));
    }

    #[test]
    fn test_close_flushes_queue() {
        let backend = Arc::new(MemoryStorage::new());
        let storage = Storage::new("mem", ".*", backend.clone()).unwrap();
        storage.start().unwrap();
        for i in 0..50 {
            storage.queue(&format!("v::{i}"), Some(SerializedValue::new("integer", vec![i])));
        }
        storage.queue("v::3", None);
        storage.close();
        assert_eq!(backend.len(), 49);
        assert!(backend.get("v::3").is_none());

        // Changes after closing are dropped.
        storage.queue("late", Some(SerializedValue::new("integer", vec![1])));
        assert!(backend.get("late").is_none());
    }

    #[test]
    fn test_queue_before_start() {
        let backend = Arc::new(MemoryStorage::new());
        let storage = Storage::new("mem", ".*", backend.clone()).unwrap();
        storage.queue("early", Some(SerializedValue::new("integer", vec![1])));
        assert_eq!(storage.pending(), 1);
        storage.close();
        assert!(backend.get("early").is_some());
    }
}
