//! The global store over real and recording storages.

use std::fs;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use skript_config::{Config, LoadOptions};
use skript_types::defaults::register_defaults;
use skript_types::{RegistryBuilder, SerializedValue, Settings, TypeRegistry, Value};
use skript_variables::{MemoryStorage, StorageError, StorageResult, Variable, VariableStorage, Variables, encode_hex};

fn registry() -> Arc<TypeRegistry> {
    let mut builder = RegistryBuilder::new(Settings::strict());
    register_defaults(&mut builder).unwrap();
    Arc::new(builder.build().unwrap())
}

fn int(variables: &Variables, name: &str) -> Option<i64> {
    match variables.get_variable(name)? {
        Variable::Value(value) => value.downcast_ref::<i64>().copied(),
        Variable::List(_) => None,
    }
}

fn saved(registry: &TypeRegistry, n: i64) -> SerializedValue {
    registry.serialize(&Value::new(n)).unwrap()
}

/// Records every change it is asked to persist.
#[derive(Default)]
struct RecordingStorage {
    saves: Mutex<Vec<(String, bool)>>,
}

impl RecordingStorage {
    fn saves(&self) -> Vec<(String, bool)> {
        self.saves.lock().clone()
    }
}

impl VariableStorage for RecordingStorage {
    fn load(&self, _: &TypeRegistry, _: &mut dyn FnMut(&str, Option<Value>)) -> StorageResult<()> {
        Ok(())
    }

    fn save(&self, name: &str, value: Option<&SerializedValue>) -> StorageResult<()> {
        self.saves.lock().push((name.to_owned(), value.is_some()));
        Ok(())
    }

    fn rewrite(&self, _: &[(String, SerializedValue)]) -> StorageResult<()> {
        Ok(())
    }
}

#[test]
fn test_storages_partition_names() {
    let first = Arc::new(RecordingStorage::default());
    let second = Arc::new(RecordingStorage::default());
    let variables = Variables::builder(registry())
        .storage("a", "^a:.*", first.clone())
        .unwrap()
        .storage("rest", ".*", second.clone())
        .unwrap()
        .build()
        .unwrap();

    variables.set_variable("a:x", Some(Value::new(1_i64)));
    variables.set_variable("b:y", Some(Value::new(2_i64)));
    variables.set_variable("a:x", None);
    variables.close();

    assert_eq!(first.saves(), [("a:x".to_owned(), true), ("a:x".to_owned(), false)]);
    assert_eq!(second.saves(), [("b:y".to_owned(), true)]);
    assert_eq!(int(&variables, "b:y"), Some(2));
    assert_eq!(int(&variables, "a:x"), None);
}

#[test]
fn test_list_delete_reaches_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let variables = Variables::builder(registry())
        .storage("default", ".*", storage.clone())
        .unwrap()
        .build()
        .unwrap();

    variables.set_variable("homes", Some(Value::new(0_i64)));
    variables.set_variable("homes::1", Some(Value::new(1_i64)));
    variables.set_variable("homes::2", Some(Value::new(2_i64)));
    variables.set_variable("homes::*", None);
    variables.close();

    assert_eq!(variables.variable_count(), 1);
    assert_eq!(int(&variables, "homes"), Some(0));
    assert_eq!(storage.len(), 1);
    assert!(storage.get("homes::1").is_none());
}

#[test]
fn test_later_storage_wins_conflicts() {
    let registry = registry();
    let one = Arc::new(MemoryStorage::with_entries([
        ("x".to_owned(), saved(&registry, 1)),
        ("only".to_owned(), saved(&registry, 5)),
    ]));
    let two = Arc::new(MemoryStorage::with_entries([("x".to_owned(), saved(&registry, 2))]));
    let variables = Variables::builder(Arc::clone(&registry))
        .storage("one", ".*", one.clone())
        .unwrap()
        .storage("two", ".*", two.clone())
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(int(&variables, "x"), Some(2));
    assert_eq!(int(&variables, "only"), Some(5));
    variables.close();

    // "one" accepts x first, so the value moves there.
    assert_eq!(one.get("x"), Some(saved(&registry, 2)));
    assert!(two.is_empty());
}

#[test]
fn test_unaccepted_variables_are_kept_in_memory() {
    let registry = registry();
    let storage = Arc::new(MemoryStorage::with_entries([("b:z".to_owned(), saved(&registry, 7))]));
    let variables = Variables::builder(registry)
        .storage("a", "a:.*", storage)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(int(&variables, "b:z"), Some(7));
    variables.close();
}

/// Hands over one variable, then fails.
struct BrokenStorage;

impl VariableStorage for BrokenStorage {
    fn load(&self, registry: &TypeRegistry, sink: &mut dyn FnMut(&str, Option<Value>)) -> StorageResult<()> {
        sink("b::1", registry.deserialize_serialized(&saved(registry, 9)));
        Err(StorageError::Closed("broken".to_owned()))
    }

    fn save(&self, _: &str, _: Option<&SerializedValue>) -> StorageResult<()> {
        Ok(())
    }

    fn rewrite(&self, _: &[(String, SerializedValue)]) -> StorageResult<()> {
        Ok(())
    }
}

#[test]
fn test_failed_storage_contributes_nothing() {
    let registry = registry();
    let first = Arc::new(MemoryStorage::with_entries([("b::1".to_owned(), saved(&registry, 1))]));
    let result = Variables::builder(registry)
        .storage("first", ".*", first.clone())
        .unwrap()
        .storage("broken", "b.*", Arc::new(BrokenStorage))
        .unwrap()
        .build();

    assert!(matches!(result, Err(StorageError::LoadFailed(1))));
    assert!(first.get("b::1").is_some());
}

#[test]
fn test_concurrent_writers() {
    let storage = Arc::new(MemoryStorage::new());
    let variables = Variables::builder(registry())
        .storage("default", ".*", storage.clone())
        .unwrap()
        .build()
        .unwrap();

    thread::scope(|scope| {
        for t in 0..4 {
            let variables = &variables;
            scope.spawn(move || {
                for i in 0..100 {
                    variables.set_variable(&format!("t{t}::{i}"), Some(Value::new(i64::from(i))));
                    let _ = variables.get_variable("t0::*");
                }
            });
        }
    });

    variables.flush();
    assert_eq!(variables.variable_count(), 400);
    let Some(Variable::List(list)) = variables.get_variable("t3::*") else {
        panic!("t3 should be a list");
    };
    let values: Vec<i64> = list.values().filter_map(|v| v.downcast_ref::<i64>().copied()).collect();
    assert_eq!(values, (0..100).collect::<Vec<_>>());

    variables.close();
    assert_eq!(storage.len(), 400);
}

fn load(config: &str, dir: &std::path::Path) -> StorageResult<Variables> {
    let config = Config::load_str(config, "config.sk", &LoadOptions::default()).unwrap();
    Variables::load(config.main_node(), registry(), dir)
}

const CSV_CONFIG: &str = "\
databases:
    default:
        type: CSV
        pattern: .*
        file: ./variables.csv
        backup interval: 0
";

#[test]
fn test_csv_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let variables = load(CSV_CONFIG, dir.path()).unwrap();
        variables.set_variable("score::alice", Some(Value::new(10_i64)));
        variables.set_variable("greeting", Some(Value::new("hi, \"you\"".to_owned())));
        variables.set_variable("tmp", Some(Value::new(true)));
        variables.set_variable("tmp", None);
        variables.close();
    }

    let text = fs::read_to_string(dir.path().join("variables.csv")).unwrap();
    assert!(text.starts_with("# === Skript's variable storage ==="));
    assert!(text.contains("tmp, null, \n"));

    let variables = load(CSV_CONFIG, dir.path()).unwrap();
    assert_eq!(variables.variable_count(), 2);
    assert_eq!(int(&variables, "score::alice"), Some(10));
    let Some(Variable::Value(greeting)) = variables.get_variable("greeting") else {
        panic!("greeting should be loaded");
    };
    assert_eq!(greeting.downcast_ref::<String>().map(String::as_str), Some("hi, \"you\""));

    variables.save_all().unwrap();
    variables.close();
    let text = fs::read_to_string(dir.path().join("variables.csv")).unwrap();
    assert!(!text.contains("null"));
    assert!(!dir.path().join("variables.csv.temp").exists());
}

#[test]
fn test_csv_backup_on_bad_lines() {
    let dir = tempfile::tempdir().unwrap();
    let three = encode_hex(&saved(&registry(), 3).data);
    fs::write(
        dir.path().join("variables.csv"),
        format!("# comment\nok, integer, {three}\nbroken line\nlost, nosuchtype, 00\n"),
    )
    .unwrap();

    let variables = load(CSV_CONFIG, dir.path()).unwrap();
    assert_eq!(variables.variable_count(), 1);
    assert_eq!(int(&variables, "ok"), Some(3));
    variables.close();
    let backups: Vec<_> = fs::read_dir(dir.path().join("backups")).unwrap().collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn test_csv_line_with_invalid_utf8_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let one = encode_hex(&saved(&registry(), 1).data);
    let mut file = format!("before, integer, {one}\n").into_bytes();
    file.extend_from_slice(b"caf\xe9, integer, ");
    file.extend_from_slice(one.as_bytes());
    file.extend_from_slice(format!("\nafter, integer, {one}\n").as_bytes());
    fs::write(dir.path().join("variables.csv"), file).unwrap();

    let variables = load(CSV_CONFIG, dir.path()).unwrap();
    assert_eq!(variables.variable_count(), 3);
    assert_eq!(int(&variables, "before"), Some(1));
    assert_eq!(int(&variables, "caf\u{FFFD}"), Some(1));
    assert_eq!(int(&variables, "after"), Some(1));
    variables.close();
    assert!(!dir.path().join("backups").exists());
}

#[test]
fn test_lmdb_storage_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = "databases:\n    main:\n        type: lmdb\n        pattern: .*\n        file: db\n";
    {
        let variables = load(config, dir.path()).unwrap();
        variables.set_variable("a::b", Some(Value::new(2.5_f64)));
        variables.close();
    }
    let variables = load(config, dir.path()).unwrap();
    let Some(Variable::Value(value)) = variables.get_variable("a::b") else {
        panic!("a::b should be loaded");
    };
    assert_eq!(value.downcast_ref::<f64>(), Some(&2.5));
    variables.close();
}

#[test]
fn test_config_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = load("other: 1\n", dir.path()).unwrap_err();
    assert!(matches!(missing, StorageError::MissingDatabases));

    let disabled = load("databases:\n    off:\n        type: disabled\n", dir.path()).unwrap_err();
    assert!(matches!(disabled, StorageError::NoDatabases));

    let invalid = "databases:\n    bad:\n        type: mysql\n        pattern: .*\n    ok:\n        type: memory\n        pattern: .*\n";
    assert!(matches!(load(invalid, dir.path()), Err(StorageError::LoadFailed(1))));

    let not_a_section = "databases:\n    stray: entry\n    ok:\n        type: memory\n        pattern: .*\n";
    assert!(matches!(load(not_a_section, dir.path()), Err(StorageError::LoadFailed(1))));

    let no_pattern = "databases:\n    ok:\n        type: memory\n";
    assert!(matches!(load(no_pattern, dir.path()), Err(StorageError::LoadFailed(1))));
}
