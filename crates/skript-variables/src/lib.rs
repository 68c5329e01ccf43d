//! Global and local Skript variables.
//!
//! Variable names are `::` separated paths; `name::*` addresses every element
//! of a list. [`Variables`] holds the global variables in a [`VariablesMap`]
//! and persists each change through the first [`Storage`] whose pattern
//! accepts the name. Every storage has its own bounded queue and writer
//! thread, so saving never waits on disk.
//!
//! Storages are declared in the `databases` section of the main config:
//!
//! ```text
//! databases:
//!     default:
//!         type: csv
//!         pattern: .*
//!         file: ./variables.csv
//!         backup interval: 2 hours
//! ```

mod error;
mod flatfile;
mod lmdb;
mod local;
mod map;
mod memory;
mod name;
mod storage;
mod store;

pub use error::{StorageError, StorageResult};
pub use flatfile::{FlatFileStorage, backup_file, decode_hex, encode_hex, split_csv, write_csv};
pub use lmdb::LmdbStorage;
pub use local::LocalVariables;
pub use map::{List, Segment, Variable, VariablesMap};
pub use memory::MemoryStorage;
pub use name::{LIST_SUFFIX, SEPARATOR, compare_segments, is_list, split_variable_name};
pub use storage::{QUEUE_CAPACITY, QUEUE_WARNING_THRESHOLD, Storage, VariableStorage};
pub use store::{Variables, VariablesBuilder};
