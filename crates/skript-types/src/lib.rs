//! Runtime type system for Skript values.
//!
//! Every type usable in scripts is described by a [`ClassInfo`]: a stable
//! code name, user-facing patterns, and optional parser, serializer, changer
//! and arithmetic. Infos and [converters](ConverterInfo) are collected in a
//! [`RegistryBuilder`] and frozen into a [`TypeRegistry`], which
//!
//! - orders infos so that subtypes are tried before their supertypes,
//! - closes the converter graph over two-step chains,
//! - parses text into values, directly or through converters,
//! - renders values as messages, debug text or variable name parts,
//! - turns values into [`SerializedValue`]s for storages and back.
//!
//! ```
//! use skript_types::{ParseContext, RegistryBuilder, RuntimeType, Settings, defaults};
//!
//! let mut builder = RegistryBuilder::new(Settings::strict());
//! defaults::register_defaults(&mut builder).unwrap();
//! let registry = builder.build().unwrap();
//!
//! let number = RuntimeType::of::<defaults::Number>();
//! let value = registry.parse_simple("5", number, ParseContext::Default).unwrap();
//! assert!(value.is::<i64>());
//! assert_eq!(registry.to_string(Some(&value)), "5");
//!
//! let saved = registry.serialize(&value).unwrap();
//! assert_eq!(saved.type_code, "integer");
//! ```

pub mod class_info;
pub mod codec;
pub mod converter;
pub mod defaults;
mod error;
mod log;
mod option;
mod parser;
mod registry;
mod runtime;
mod settings;
mod sort;
mod timespan;

pub use class_info::{ClassInfo, ClassInfoBuilder, ParserFamily};
pub use codec::{SerializedValue, Serializer};
pub use converter::{ConverterGraph, ConverterInfo, ConverterOptions};
pub use error::{CodecError, CodecResult, ConversionError, RegistrationError, RegistrationResult};
pub use log::{ErrorQuality, LogEntry, LogLevel, ParseLog};
pub use option::{ConfigOption, lookup};
pub use parser::{FnParser, ParseContext, Parser, StringMode};
pub use registry::{NONE, RegistryBuilder, TypeRegistry};
pub use runtime::{Object, RuntimeType, TypeHierarchy, Value};
pub use settings::Settings;
pub use timespan::Timespan;
