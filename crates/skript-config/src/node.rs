//! Config tree nodes.

use std::fmt;

use crate::line::escape;
use crate::section::SectionNode;

/// What a node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A `key:` header followed by an indented block.
    Section(SectionNode),
    /// A `key <separator> value` pair.
    Entry {
        /// The value, trimmed.
        value: String,
    },
    /// A line of a script whose key/value split is deferred.
    Simple,
    /// A blank or comment-only line.
    Void,
    /// A line that failed the grammar.
    Invalid,
}

/// One line (or block) of a config file.
///
/// Nodes are owned by their parent [`SectionNode`]; moving a node between
/// sections is a remove followed by an add. The level is maintained by the
/// owning section: direct children of the file root are level 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    key: Option<String>,
    comment: String,
    line: Option<usize>,
    level: usize,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn new(key: Option<String>, comment: String, line: Option<usize>, kind: NodeKind) -> Self {
        debug_assert!(comment.is_empty() || comment.starts_with('#'), "{comment:?}");
        let mut node = Self {
            key,
            comment,
            line,
            level: 0,
            kind,
        };
        node.set_level(0);
        node
    }

    /// A synthetic entry node.
    #[must_use]
    pub fn entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            Some(key.into()),
            String::new(),
            None,
            NodeKind::Entry {
                value: value.into(),
            },
        )
    }

    /// A synthetic section node.
    #[must_use]
    pub fn section(key: impl Into<String>, section: SectionNode) -> Self {
        Self::new(Some(key.into()), String::new(), None, NodeKind::Section(section))
    }

    /// A synthetic simple node.
    #[must_use]
    pub fn simple(text: impl Into<String>) -> Self {
        Self::new(Some(text.into()), String::new(), None, NodeKind::Simple)
    }

    /// A synthetic blank line, optionally carrying a comment.
    #[must_use]
    pub fn void(comment: impl Into<String>) -> Self {
        Self::new(None, comment.into(), None, NodeKind::Void)
    }

    /// Key of this node: the entry or section name, or the raw text of
    /// simple and invalid nodes. `None` for void nodes.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub(crate) fn set_key(&mut self, key: String) {
        self.key = Some(key);
    }

    /// The trailing comment including its `#`, or an empty string.
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Replace the trailing comment. A non-empty comment gets a leading `#` if missing.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        let comment = comment.into();
        self.comment = if comment.is_empty() || comment.starts_with('#') {
            comment
        } else {
            format!("#{comment}")
        };
    }

    /// 1-based source line, `None` for nodes created in code.
    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        self.line
    }

    /// Number of ancestors minus one, never below zero.
    #[must_use]
    pub const fn level(&self) -> usize {
        self.level
    }

    pub(crate) fn set_level(&mut self, level: usize) {
        self.level = level;
        if let NodeKind::Section(section) = &mut self.kind {
            section.set_child_level(level + 1);
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self.kind, NodeKind::Void)
    }

    #[must_use]
    pub const fn is_entry(&self) -> bool {
        matches!(self.kind, NodeKind::Entry { .. })
    }

    #[must_use]
    pub const fn is_section(&self) -> bool {
        matches!(self.kind, NodeKind::Section(_))
    }

    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        matches!(self.kind, NodeKind::Invalid)
    }

    /// Whether the comment marks this node for debug output.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.comment == "#DEBUG#"
    }

    /// The value of an entry node.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Entry { value } => Some(value),
            _ => None,
        }
    }

    /// Set the value of an entry node. Returns false for other kinds.
    pub fn set_value(&mut self, new_value: impl Into<String>) -> bool {
        match &mut self.kind {
            NodeKind::Entry { value } => {
                *value = new_value.into();
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn as_section(&self) -> Option<&SectionNode> {
        match &self.kind {
            NodeKind::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_section_mut(&mut self) -> Option<&mut SectionNode> {
        match &mut self.kind {
            NodeKind::Section(section) => Some(section),
            _ => None,
        }
    }

    /// The unescaped text this node saves as, without indentation or comment.
    pub(crate) fn body(&self, save_separator: &str) -> String {
        let key = self.key.as_deref().unwrap_or_default();
        match &self.kind {
            NodeKind::Section(_) => format!("{key}:"),
            NodeKind::Entry { value } => format!("{key}{save_separator}{value}"),
            NodeKind::Simple | NodeKind::Void | NodeKind::Invalid => key.to_owned(),
        }
    }

    /// Render this node's own line: indentation, escaped body and comment.
    #[must_use]
    pub fn save_line(&self, indentation: &str, save_separator: &str) -> String {
        if self.is_void() && self.comment.is_empty() {
            return String::new();
        }
        let body = escape(&self.body(save_separator));
        let mut out = indentation.repeat(self.level);
        out.push_str(&body);
        if !self.comment.is_empty() {
            if !body.is_empty() && !body.ends_with(char::is_whitespace) {
                out.push(' ');
            }
            out.push_str(&self.comment);
        }
        out
    }

    /// Append this node and, for sections, all descendants to `out`.
    pub(crate) fn save_into(&self, indentation: &str, save_separator: &str, out: &mut Vec<String>) {
        out.push(self.save_line(indentation, save_separator));
        if let NodeKind::Section(section) = &self.kind {
            section.save_into(indentation, save_separator, out);
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.body(": "), self.comment)?;
        match self.line {
            Some(line) => write!(f, " (line {line})"),
            None => write!(f, " (unknown line)"),
        }
    }
}
