//! Variable storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, writing or closing variable storages.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error on a storage file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the LMDB environment.
    #[error("lmdb error: {0}")]
    Lmdb(#[from] heed::Error),

    /// A line of a CSV storage is not `name, type, data`.
    #[error("invalid amount of commas in line {line} ('{content}')")]
    InvalidLine { line: usize, content: String },

    /// Stored data is not valid hexadecimal.
    #[error("invalid hex data '{0}'")]
    InvalidHex(String),

    /// A stored record could not be decoded.
    #[error("corrupt record for variable '{0}'")]
    CorruptRecord(String),

    /// The variable name pattern of a database is not a valid regex.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A required entry of a database definition is missing.
    #[error("The config is missing the entry for '{key}' in the database '{database}'")]
    MissingEntry { key: String, database: String },

    /// An entry of a database definition has an unusable value.
    #[error("The entry for '{key}' in the database '{database}' must be {expected}")]
    InvalidEntry {
        key: String,
        database: String,
        expected: String,
    },

    /// Unknown `type` of a database definition.
    #[error("Invalid database type '{0}'")]
    InvalidDatabaseType(String),

    /// A storage path exists but is a directory.
    #[error("The database file '{0}' must be an actual file, not a directory.")]
    NotAFile(PathBuf),

    /// The config has no `databases` section.
    #[error("The config is missing the required 'databases' section that defines where the variables are saved")]
    MissingDatabases,

    /// Every database definition is disabled.
    #[error(
        "No databases to store variables are defined. Please enable at least the default database, even if you don't use variables at all."
    )]
    NoDatabases,

    /// At least one database failed to load; details were logged.
    #[error("{0} database(s) could not be loaded")]
    LoadFailed(usize),

    /// The storage was closed.
    #[error("the database '{0}' is closed")]
    Closed(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
