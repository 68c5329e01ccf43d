//! Indentation-sensitive config tree reader.
//!
//! Skript scripts and configuration files share one grammar: one node per
//! line, `#` comments (`##` escapes a literal `#`), and nesting by a uniform
//! indentation unit that is sniffed from the file itself.
//!
//! ```text
//! databases:               <- section (level 0)
//!     default:             <- section (level 1)
//!         type: csv        <- entry   (level 2)
//!                          <- void
//!     # comment only       <- void with comment
//! ```
//!
//! Malformed lines never abort a load. They become [`NodeKind::Invalid`]
//! nodes and are reported through [`Config::diagnostics`] and `tracing`.
//!
//! # Example
//!
//! ```
//! use skript_config::{Config, LoadOptions};
//!
//! let source = "databases:\n\tdefault:\n\t\ttype: csv\n";
//! let config = Config::load_str(source, "config.sk", &LoadOptions::default()).unwrap();
//! assert_eq!(config.get_by_path("databases.default.type"), Some("csv"));
//! assert_eq!(config.save_to_string(), source);
//! ```

mod config;
mod error;
mod line;
mod node;
mod reader;
mod section;
mod validate;

pub use config::{Config, Diagnostic, LoadOptions, Severity};
pub use error::{ConfigError, ConfigResult};
pub use line::{escape, readable_whitespace, split_line};
pub use node::{Node, NodeKind};
pub use reader::ConfigReader;
pub use section::SectionNode;
pub use validate::SectionValidator;
