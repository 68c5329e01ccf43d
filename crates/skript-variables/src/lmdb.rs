//! LMDB storage.

use std::fs;
use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use parking_lot::Mutex;
use skript_types::{SerializedValue, TypeRegistry, Value};
use tracing::{error, trace};

use crate::error::{StorageError, StorageResult};
use crate::storage::VariableStorage;

const DATABASE_NAME: &str = "variables";

struct Handle {
    env: Env,
    db: Database<Bytes, Bytes>,
}

/// Variables in an LMDB environment directory.
///
/// Keys are variable names. Values are `[type code length][type code][data]`.
pub struct LmdbStorage {
    path: PathBuf,
    handle: Mutex<Option<Handle>>,
}

impl LmdbStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: Mutex::new(None),
        }
    }

    /// Open the environment at `path`, creating it if needed.
    ///
    /// # Safety
    /// heed requires that an environment is not opened twice in one process
    /// with different options. Each storage owns its directory.
    #[allow(unsafe_code)]
    fn open(&self) -> StorageResult<Handle> {
        if self.path.is_file() {
            return Err(StorageError::NotAFile(self.path.clone()));
        }
        fs::create_dir_all(&self.path)?;

        // SAFETY: the directory belongs to this storage alone and is opened once per connection.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1024 * 1024 * 1024)
                .max_dbs(1)
                .open(&self.path)?
        };
        let mut wtxn = env.write_txn()?;
        let db = env.create_database(&mut wtxn, Some(DATABASE_NAME))?;
        wtxn.commit()?;
        Ok(Handle { env, db })
    }

    fn with_handle<T>(&self, f: impl FnOnce(&Handle) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self.handle.lock();
        let handle = guard
            .as_ref()
            .ok_or_else(|| StorageError::Closed(self.path.display().to_string()))?;
        f(handle)
    }
}

fn encode_record(name: &str, value: &SerializedValue) -> StorageResult<Vec<u8>> {
    let code = value.type_code.as_bytes();
    let len = u8::try_from(code.len()).map_err(|_| StorageError::CorruptRecord(name.to_owned()))?;
    let mut record = Vec::with_capacity(1 + code.len() + value.data.len());
    record.push(len);
    record.extend_from_slice(code);
    record.extend_from_slice(&value.data);
    Ok(record)
}

fn decode_record(name: &str, record: &[u8]) -> StorageResult<SerializedValue> {
    let corrupt = || StorageError::CorruptRecord(name.to_owned());
    let (&len, rest) = record.split_first().ok_or_else(corrupt)?;
    let (code, data) = rest.split_at_checked(usize::from(len)).ok_or_else(corrupt)?;
    let code = std::str::from_utf8(code).map_err(|_| corrupt())?;
    Ok(SerializedValue::new(code, data.to_vec()))
}

impl VariableStorage for LmdbStorage {
    fn load(&self, registry: &TypeRegistry, sink: &mut dyn FnMut(&str, Option<Value>)) -> StorageResult<()> {
        self.connect()?;
        let mut failed = Vec::new();
        self.with_handle(|handle| {
            let rtxn = handle.env.read_txn()?;
            for entry in handle.db.iter(&rtxn)? {
                let (key, record) = entry?;
                let name = String::from_utf8_lossy(key);
                let value = decode_record(&name, record)
                    .ok()
                    .and_then(|saved| registry.deserialize_serialized(&saved));
                match value {
                    Some(value) => sink(&name, Some(value)),
                    None => failed.push(name.into_owned()),
                }
            }
            Ok(())
        })?;
        if !failed.is_empty() {
            error!(
                "{} variable{} could not be loaded!",
                failed.len(),
                if failed.len() == 1 { "" } else { "s" }
            );
            error!("Affected variables: {}", failed.join(", "));
        }
        Ok(())
    }

    fn save(&self, name: &str, value: Option<&SerializedValue>) -> StorageResult<()> {
        self.with_handle(|handle| {
            let mut wtxn = handle.env.write_txn()?;
            match value {
                Some(value) => handle.db.put(&mut wtxn, name.as_bytes(), &encode_record(name, value)?)?,
                None => {
                    handle.db.delete(&mut wtxn, name.as_bytes())?;
                }
            }
            wtxn.commit()?;
            trace!(variable = name, deleted = value.is_none(), "saved variable");
            Ok(())
        })
    }

    fn rewrite(&self, variables: &[(String, SerializedValue)]) -> StorageResult<()> {
        self.with_handle(|handle| {
            let mut wtxn = handle.env.write_txn()?;
            handle.db.clear(&mut wtxn)?;
            for (name, value) in variables {
                handle.db.put(&mut wtxn, name.as_bytes(), &encode_record(name, value)?)?;
            }
            wtxn.commit()?;
            Ok(())
        })
    }

    fn connect(&self) -> StorageResult<()> {
        let mut guard = self.handle.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        Ok(())
    }

    fn disconnect(&self) -> StorageResult<()> {
        if let Some(handle) = self.handle.lock().take() {
            handle.env.force_sync()?;
        }
        Ok(())
    }

    fn file(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl std::fmt::Debug for LmdbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStorage")
            .field("path", &self.path)
            .field("connected", &self.handle.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skript_types::defaults::register_defaults;
    use skript_types::{RegistryBuilder, Settings};

    fn registry() -> TypeRegistry {
        let mut builder = RegistryBuilder::new(Settings::strict());
        register_defaults(&mut builder).unwrap();
        builder.build().unwrap()
    }

    fn load_all(storage: &LmdbStorage, registry: &TypeRegistry) -> Vec<(String, Option<i64>)> {
        let mut loaded = Vec::new();
        storage
            .load(registry, &mut |name, value| {
                loaded.push((name.to_owned(), value.and_then(|v| v.downcast_ref::<i64>().copied())));
            })
            .unwrap();
        loaded
    }

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let storage = LmdbStorage::new(dir.path().join("variables"));
        assert!(load_all(&storage, &registry).is_empty());

        let one = registry.serialize(&Value::new(1_i64)).unwrap();
        let two = registry.serialize(&Value::new(2_i64)).unwrap();
        storage.save("a::1", Some(&one)).unwrap();
        storage.save("a::2", Some(&two)).unwrap();
        storage.save("a::1", None).unwrap();
        storage.disconnect().unwrap();

        let reopened = LmdbStorage::new(dir.path().join("variables"));
        assert_eq!(load_all(&reopened, &registry), [("a::2".to_owned(), Some(2))]);

        reopened.rewrite(&[("b".to_owned(), one)]).unwrap();
        assert_eq!(load_all(&reopened, &registry), [("b".to_owned(), Some(1))]);
    }

    #[test]
    fn test_closed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LmdbStorage::new(dir.path());
        assert!(matches!(storage.save("x", None), Err(StorageError::Closed(_))));
    }

    #[test]
    fn test_records() {
        let value = SerializedValue::new("integer", vec![1, 2, 3]);
        let record = encode_record("x", &value).unwrap();
        assert_eq!(record, b"\x07integer\x01\x02\x03");
        assert_eq!(decode_record("x", &record).unwrap(), value);
        assert!(decode_record("x", &[9, b'a']).is_err());
        assert!(decode_record("x", &[]).is_err());
    }
}
