//! Typed configuration options parsed through the registry.

use std::any::Any;

use skript_config::SectionNode;

use crate::parser::ParseContext;
use crate::registry::TypeRegistry;
use crate::runtime::RuntimeType;

/// Look up a dot separated path, e.g. `databases.default.type`.
pub fn lookup<'a>(section: &'a SectionNode, key: &str) -> Option<&'a str> {
    let mut current = section;
    let mut parts = key.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            return current.get_value(part);
        }
        current = current.get_section(part)?;
    }
    None
}

/// A config entry with a default value.
///
/// ```
/// use skript_config::{Config, LoadOptions};
/// use skript_types::{ConfigOption, RegistryBuilder, Settings, defaults};
///
/// let mut builder = RegistryBuilder::new(Settings::strict());
/// defaults::register_defaults(&mut builder).unwrap();
/// let registry = builder.build().unwrap();
///
/// let config = Config::load_str("limits:\n\tmax: 5\n", "config.sk", &LoadOptions::default()).unwrap();
/// let mut max = ConfigOption::new("limits.max", 1_i64);
/// assert!(max.load(config.main_node(), &registry));
/// assert_eq!(*max.value(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigOption<T> {
    key: String,
    value: T,
    optional: bool,
}

impl<T: Any + Clone + Send + Sync> ConfigOption<T> {
    pub fn new(key: impl Into<String>, default: T) -> Self {
        Self {
            key: key.into(),
            value: default,
            optional: false,
        }
    }

    /// A missing entry is not an error.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Parse the entry into the option. On failure the error is logged, the
    /// current value is kept and `false` is returned.
    pub fn load(&mut self, section: &SectionNode, registry: &TypeRegistry) -> bool {
        let Some(text) = lookup(section, &self.key) else {
            if self.optional {
                return true;
            }
            tracing::error!(key = %self.key, "Required entry '{}' is missing", self.key);
            return false;
        };
        let target = RuntimeType::of::<T>();
        let parsed = registry
            .parse(text, target, ParseContext::Config)
            .and_then(|value| value.downcast_ref::<T>().cloned());
        match parsed {
            Some(value) => {
                self.value = value;
                true
            }
            None => {
                let expected = registry
                    .get_exact_class_info(target)
                    .map_or(target.name(), |info| info.name());
                tracing::error!(key = %self.key, "'{text}' is not a valid {expected}");
                false
            }
        }
    }
}
