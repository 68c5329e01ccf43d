//! Loading, querying and saving whole config files.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::line::{readable_whitespace, split_indentation, split_line, starts_with_content, strip_units};
use crate::node::{Node, NodeKind};
use crate::reader::ConfigReader;
use crate::section::{SectionNode, entry_from_text};

/// Severity of a load diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A message produced while loading, tied to a source line when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: Option<usize>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            severity,
            message: message.into(),
            line,
        }
    }
}

/// How a file is read.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Script mode: non-section lines become simple nodes instead of entries.
    pub simple: bool,
    /// Key/value separator for entries, e.g. `:` or `=`.
    pub separator: String,
    /// Suppress the warning for sections without children.
    pub allow_empty_sections: bool,
    /// Global switch for the empty section warning.
    pub warn_empty_sections: bool,
    /// Warn when the whole source is empty.
    pub warn_empty_file: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            simple: false,
            separator: ":".to_owned(),
            allow_empty_sections: false,
            warn_empty_sections: true,
            warn_empty_file: true,
        }
    }
}

impl LoadOptions {
    /// Options for script files: simple mode, `:` separator.
    #[must_use]
    pub fn script() -> Self {
        Self {
            simple: true,
            ..Self::default()
        }
    }

    /// Options for key/value config files with the given separator.
    #[must_use]
    pub fn config(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn allow_empty_sections(mut self, allow: bool) -> Self {
        self.allow_empty_sections = allow;
        self
    }
}

/// A loaded config or script file.
#[derive(Debug, Clone)]
pub struct Config {
    main: SectionNode,
    file_name: String,
    path: Option<PathBuf>,
    simple: bool,
    separator: String,
    indentation: String,
    errors: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Config {
    /// An empty config that saves with tab indentation.
    pub fn new(file_name: impl Into<String>, options: &LoadOptions) -> ConfigResult<Self> {
        if options.separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        Ok(Self {
            main: SectionNode::new(),
            file_name: file_name.into(),
            path: None,
            simple: options.simple,
            separator: options.separator.clone(),
            indentation: "\t".to_owned(),
            errors: 0,
            diagnostics: Vec::new(),
        })
    }

    /// Parse a config from any buffered source.
    ///
    /// Grammar errors do not fail the load; they leave invalid nodes in the
    /// tree and are counted in [`errors`](Self::errors).
    pub fn load(source: impl BufRead, file_name: impl Into<String>, options: &LoadOptions) -> ConfigResult<Self> {
        let mut config = Self::new(file_name, options)?;
        let mut loader = Loader {
            reader: ConfigReader::new(source),
            options,
            file_name: config.file_name.clone(),
            indentation: config.indentation.clone(),
            indentation_set: false,
            level: 0,
            errors: 0,
            diagnostics: Vec::new(),
        };
        config.main = loader.load_section()?;
        config.indentation = loader.indentation;
        config.errors = loader.errors;
        config.diagnostics = loader.diagnostics;

        if loader.reader.line_number() == 0 && options.warn_empty_file {
            let message = format!("'{}' is empty", config.file_name);
            warn!(file = %config.file_name, "{message}");
            config.diagnostics.push(Diagnostic::new(Severity::Warning, message, None));
        }
        debug!(file = %config.file_name, errors = config.errors, "loaded config");
        Ok(config)
    }

    /// Parse a config held in memory.
    pub fn load_str(source: &str, file_name: impl Into<String>, options: &LoadOptions) -> ConfigResult<Self> {
        Self::load(source.as_bytes(), file_name, options)
    }

    /// Parse a config file; the file name becomes the config's name.
    pub fn load_file(path: impl AsRef<Path>, options: &LoadOptions) -> ConfigResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let mut config = Self::load(BufReader::new(file), name, options)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// The file's implicit root section.
    #[must_use]
    pub const fn main_node(&self) -> &SectionNode {
        &self.main
    }

    pub fn main_node_mut(&mut self) -> &mut SectionNode {
        &mut self.main
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Path the config was loaded from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub const fn is_simple(&self) -> bool {
        self.simple
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Separator used when writing entries: `": "`, `" = "` or the separator padded with spaces.
    #[must_use]
    pub fn save_separator(&self) -> String {
        match self.separator.as_str() {
            ":" => ": ".to_owned(),
            "=" => " = ".to_owned(),
            other => format!(" {other} "),
        }
    }

    /// The indentation unit of this file, tab unless sniffed otherwise.
    #[must_use]
    pub fn indentation(&self) -> &str {
        &self.indentation
    }

    /// Number of grammar errors found while loading.
    #[must_use]
    pub const fn errors(&self) -> usize {
        self.errors
    }

    /// All warnings and errors produced while loading.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }

    /// Walk `path` through nested sections and return the final entry's value.
    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&str> {
        let (last, sections) = path.split_last()?;
        let mut section = &self.main;
        for key in sections {
            section = section.get_section(key)?;
        }
        section.get_value(last)
    }

    /// Like [`get`](Self::get) with a dot separated path, e.g. `"databases.default.type"`.
    #[must_use]
    pub fn get_by_path(&self, path: &str) -> Option<&str> {
        let segments: Vec<&str> = path.split('.').collect();
        self.get(&segments)
    }

    /// The section at a dot separated path.
    pub fn section_by_path(&self, path: &str) -> ConfigResult<&SectionNode> {
        let mut section = &self.main;
        for key in path.split('.').filter(|key| !key.is_empty()) {
            section = section
                .get_section(key)
                .ok_or_else(|| ConfigError::NotASection(key.to_owned()))?;
        }
        Ok(section)
    }

    /// Convert simple nodes to entries. Only valid for simple configs.
    pub fn convert_to_entries(&mut self, levels: Option<usize>, separator: &str) -> ConfigResult<()> {
        if !self.simple {
            return Err(ConfigError::NotSimple(self.file_name.clone()));
        }
        let diagnostics = self.main.convert_to_entries(levels, separator);
        for diagnostic in &diagnostics {
            error!(file = %self.file_name, line = ?diagnostic.line, "{}", diagnostic.message);
        }
        self.errors += diagnostics.len();
        self.diagnostics.extend(diagnostics);
        Ok(())
    }

    /// Copy values from `other` into this config. Returns false iff both have exactly the same keys.
    pub fn set_values(&mut self, other: &Config, excluded: &[&str]) -> bool {
        self.main.set_values(&other.main, excluded)
    }

    /// Flatten all entries into a map keyed by their joined path.
    #[must_use]
    pub fn to_map(&self, separator: &str) -> std::collections::HashMap<String, String> {
        self.main.to_map("", separator)
    }

    /// Render the whole tree as lines.
    #[must_use]
    pub fn save_lines(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.main.len());
        self.main.save_into(&self.indentation, &self.save_separator(), &mut out);
        out
    }

    /// Render the whole tree, one node per line.
    #[must_use]
    pub fn save_to_string(&self) -> String {
        let mut text = self.save_lines().join("\n");
        text.push('\n');
        text
    }

    pub fn write_to(&self, mut out: impl Write) -> ConfigResult<()> {
        out.write_all(self.save_to_string().as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Save to `path`, creating or truncating the file.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        fs::write(path, self.save_to_string())?;
        Ok(())
    }
}

/// Parser state shared by all sections of one file.
struct Loader<'a, R> {
    reader: ConfigReader<R>,
    options: &'a LoadOptions,
    file_name: String,
    indentation: String,
    indentation_set: bool,
    level: usize,
    errors: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<R: BufRead> Loader<'_, R> {
    fn report(&mut self, severity: Severity, message: String) {
        let line = self.reader.line_number();
        match severity {
            Severity::Error => {
                self.errors += 1;
                error!(file = %self.file_name, line, "{message}");
            }
            Severity::Warning => warn!(file = %self.file_name, line, "{message}"),
        }
        self.diagnostics.push(Diagnostic::new(severity, message, Some(line)));
    }

    fn indentation_name(&self) -> &'static str {
        if self.indentation.starts_with(' ') { "space" } else { "tab" }
    }

    /// Read children at `self.level` until a line dedents or input ends.
    fn load_section(&mut self) -> ConfigResult<SectionNode> {
        let mut section = SectionNode::new();
        while let Some(full_line) = self.reader.read_line()? {
            let line = Some(self.reader.line_number());
            let (value, comment) = split_line(&full_line);
            let blank = value.trim().is_empty();

            if !self.indentation_set && self.level == 1 && !blank && !starts_with_content(&value) {
                let (whitespace, _) = split_indentation(&value);
                if whitespace.chars().all(|c| c == ' ') || whitespace.chars().all(|c| c == '\t') {
                    self.indentation = whitespace.to_owned();
                    self.indentation_set = true;
                } else {
                    let message = format!(
                        "indentation error: indent must only consist of either spaces or tabs, but not mixed (found {})",
                        readable_whitespace(whitespace)
                    );
                    section.push_loaded(Node::new(Some(value.trim().to_owned()), comment, line, NodeKind::Invalid));
                    self.report(Severity::Error, message);
                    continue;
                }
            }

            if !blank && !self.matches_level(&value) {
                let expected = self.indentation.repeat(self.level);
                let over_indented = value
                    .strip_prefix(expected.as_str())
                    .is_some_and(|rest| rest.starts_with(char::is_whitespace));
                if over_indented || !starts_with_content(strip_units(&value, &self.indentation)) {
                    let count = self.level * self.indentation.chars().count();
                    let (whitespace, _) = split_indentation(&value);
                    let message = format!(
                        "indentation error: expected {count} {}{}, but found {}",
                        self.indentation_name(),
                        if count == 1 { "" } else { "s" },
                        readable_whitespace(whitespace)
                    );
                    section.push_loaded(Node::new(Some(value.trim().to_owned()), comment, line, NodeKind::Invalid));
                    self.report(Severity::Error, message);
                    continue;
                }

                if self.level > 0
                    && section.is_empty()
                    && !self.options.allow_empty_sections
                    && self.options.warn_empty_sections
                {
                    self.report(
                        Severity::Warning,
                        "Empty configuration section! You might want to indent one or more of the subsequent lines \
                         to make them belong to this section or remove the colon at the end of the line if you \
                         don't want this line to start a section."
                            .to_owned(),
                    );
                }
                self.reader.reset()?;
                return Ok(section);
            }

            let value = value.trim();
            if value.is_empty() {
                section.push_loaded(Node::new(None, comment, line, NodeKind::Void));
                continue;
            }

            if let Some(key) = self.section_header(value) {
                let key = key.to_owned();
                self.level += 1;
                let children = self.load_section();
                self.level -= 1;
                let children = children?;
                section.push_loaded(Node::new(Some(key), comment, line, NodeKind::Section(children)));
                continue;
            }

            if self.options.simple {
                section.push_loaded(Node::new(Some(value.to_owned()), comment, line, NodeKind::Simple));
            } else {
                let (node, diagnostic) = entry_from_text(value, &self.options.separator, comment, line);
                section.push_loaded(node);
                if let Some(diagnostic) = diagnostic {
                    self.report(diagnostic.severity, diagnostic.message);
                }
            }
        }
        Ok(section)
    }

    /// True if `value` starts with exactly `level` indentation units followed by content.
    fn matches_level(&self, value: &str) -> bool {
        let expected = self.indentation.repeat(self.level);
        value.strip_prefix(expected.as_str()).is_some_and(starts_with_content)
    }

    /// The section name if the trimmed `value` opens a section.
    fn section_header<'v>(&self, value: &'v str) -> Option<&'v str> {
        let key = value.strip_suffix(':')?;
        let separator = self.options.separator.as_str();
        let opens = self.options.simple
            || !value.contains(separator)
            || (separator.ends_with(':') && value.find(separator) == Some(value.len() - separator.len()));
        opens.then_some(key)
    }
}
