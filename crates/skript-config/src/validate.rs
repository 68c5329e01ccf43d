//! Structural validation of sections.

use crate::config::{Diagnostic, Severity};
use crate::node::{Node, NodeKind};
use crate::section::SectionNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Entry,
    Section,
}

#[derive(Debug, Clone)]
struct Rule {
    key: String,
    expect: Expect,
    optional: bool,
}

/// Declares which entries and subsections a section must or may contain.
///
/// ```
/// use skript_config::{Config, LoadOptions, SectionValidator};
///
/// let config = Config::load_str("type: csv\npattern: .*\n", "db", &LoadOptions::default()).unwrap();
/// let validator = SectionValidator::new().entry("type", false).entry("file", true).entry("pattern", false);
/// assert!(validator.validate(config.main_node()).is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SectionValidator {
    rules: Vec<Rule>,
    allow_undefined_entries: bool,
    allow_undefined_sections: bool,
}

impl SectionValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect an entry named `key`.
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, optional: bool) -> Self {
        self.rules.push(Rule {
            key: key.into(),
            expect: Expect::Entry,
            optional,
        });
        self
    }

    /// Expect a subsection named `key`.
    #[must_use]
    pub fn section(mut self, key: impl Into<String>, optional: bool) -> Self {
        self.rules.push(Rule {
            key: key.into(),
            expect: Expect::Section,
            optional,
        });
        self
    }

    #[must_use]
    pub const fn allow_undefined_entries(mut self) -> Self {
        self.allow_undefined_entries = true;
        self
    }

    #[must_use]
    pub const fn allow_undefined_sections(mut self) -> Self {
        self.allow_undefined_sections = true;
        self
    }

    /// Check `section` against the rules. An empty result means it is valid.
    #[must_use]
    pub fn validate(&self, section: &SectionNode) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for rule in &self.rules {
            match (section.get(&rule.key), rule.expect) {
                (None, _) if rule.optional => {}
                (None, Expect::Entry) => diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    format!("Required entry '{}' is missing", rule.key),
                    None,
                )),
                (None, Expect::Section) => diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    format!("Required section '{}' is missing", rule.key),
                    None,
                )),
                (Some(node), Expect::Entry) if !node.is_entry() => diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    format!("'{}' is not an entry (like '{}: value')", rule.key, rule.key),
                    node.line(),
                )),
                (Some(node), Expect::Section) if !node.is_section() => diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    format!("'{}' is not a section (like '{}:' followed by one or more indented lines)", rule.key, rule.key),
                    node.line(),
                )),
                _ => {}
            }
        }

        for node in section.iter() {
            if self.is_declared(node) {
                continue;
            }
            let undefined_allowed = match node.kind() {
                NodeKind::Entry { .. } => self.allow_undefined_entries,
                NodeKind::Section(_) => self.allow_undefined_sections,
                _ => false,
            };
            if !undefined_allowed {
                let message = match node.key() {
                    Some(key) => format!("Unexpected entry '{key}'. Check whether it's spelled correctly or remove it."),
                    None => "Unexpected line".to_owned(),
                };
                diagnostics.push(Diagnostic::new(Severity::Error, message, node.line()));
            }
        }
        diagnostics
    }

    fn is_declared(&self, node: &Node) -> bool {
        let Some(key) = node.key() else {
            return false;
        };
        (node.is_entry() || node.is_section()) && self.rules.iter().any(|rule| rule.key.eq_ignore_ascii_case(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, LoadOptions};

    fn load(text: &str) -> Config {
        Config::load_str(text, "test.cfg", &LoadOptions::default()).unwrap()
    }

    #[test]
    fn test_missing_and_unexpected() {
        let config = load("pattern: .*\ncolour: red\n");
        let validator = SectionValidator::new().entry("type", false).entry("pattern", false);
        let messages: Vec<_> = validator
            .validate(config.main_node())
            .into_iter()
            .map(|d| d.message)
            .collect();
        assert_eq!(
            messages,
            [
                "Required entry 'type' is missing",
                "Unexpected entry 'colour'. Check whether it's spelled correctly or remove it.",
            ]
        );
    }

    #[test]
    fn test_kind_mismatch_and_undefined_sections() {
        let config = load("type:\n\tnested: 1\nextra:\n\tx: y\n");
        let validator = SectionValidator::new().entry("type", false).allow_undefined_sections();
        let diagnostics = validator.validate(config.main_node());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, Some(1));
    }
}
