//! Engine settings.

use hashbrown::HashSet;
use skript_config::{LoadOptions, SectionNode};

use crate::class_info::ParserFamily;
use crate::option::ConfigOption;
use crate::registry::TypeRegistry;

/// Behaviour switches of the type engine.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Duplicate registrations are errors instead of ignored warnings.
    pub strict_registration: bool,
    pub debug: bool,
    /// Warn when a missing value is rendered as text.
    pub warn_when_using_none_values: bool,
    pub allow_empty_sections: bool,
    pub disable_empty_section_warnings: bool,
    /// Parser families that `parse_simple` skips.
    pub disabled_parser_families: HashSet<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict_registration: false,
            debug: false,
            warn_when_using_none_values: true,
            allow_empty_sections: false,
            disable_empty_section_warnings: false,
            disabled_parser_families: HashSet::new(),
        }
    }
}

impl Settings {
    /// Settings for tests and development: registration mistakes are fatal.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_registration: true,
            debug: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_family_disabled(&self, family: &ParserFamily) -> bool {
        self.disabled_parser_families.contains(family.name())
    }

    /// How config files should be read under these settings.
    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::default().allow_empty_sections(self.allow_empty_sections);
        options.warn_empty_sections = !self.disable_empty_section_warnings;
        options
    }

    /// Read the runtime switches from a config section. Registration
    /// strictness is fixed once the registry is built and is not read here.
    ///
    /// Returns the number of invalid entries; those keep their current value.
    pub fn load(&mut self, section: &SectionNode, registry: &TypeRegistry) -> usize {
        let mut errors = 0;
        let mut load_bool = |key: &str, slot: &mut bool| {
            let mut option = ConfigOption::new(key, *slot).optional();
            if !option.load(section, registry) {
                errors += 1;
            }
            *slot = option.into_value();
        };
        load_bool("debug", &mut self.debug);
        load_bool("warn when using none values", &mut self.warn_when_using_none_values);
        load_bool("allow empty sections", &mut self.allow_empty_sections);
        load_bool("disable empty section warnings", &mut self.disable_empty_section_warnings);

        let mut families = ConfigOption::new("disabled parser families", String::new()).optional();
        if !families.load(section, registry) {
            errors += 1;
        }
        let families = families.into_value();
        if !families.trim().is_empty() {
            self.disabled_parser_families = families
                .split(',')
                .map(|family| family.trim().to_lowercase())
                .filter(|family| !family.is_empty())
                .collect();
        }
        errors
    }
}
