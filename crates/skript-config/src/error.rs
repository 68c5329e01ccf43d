//! Config error types.

use thiserror::Error;

/// Errors raised while reading, navigating or saving a config tree.
///
/// Grammar problems inside a file are not errors: they become
/// [`InvalidNode`](crate::NodeKind::Invalid)s plus a
/// [`Diagnostic`](crate::Diagnostic) and loading continues.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading or writing a file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// [`ConfigReader::reset`](crate::ConfigReader::reset) was called twice without a read in between.
    #[error("reset was called twice without a read in between")]
    DoubleReset,

    /// The key/value separator of a config must not be empty.
    #[error("the key/value separator must not be empty")]
    EmptySeparator,

    /// `convert_to_entries` was called on a config that is not in simple mode.
    #[error("config '{0}' is not simple")]
    NotSimple(String),

    /// A path segment did not resolve to a section.
    #[error("'{0}' is not a section")]
    NotASection(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
