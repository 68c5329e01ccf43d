//! Section nodes and their case-insensitive key index.

use std::collections::HashMap;

use crate::config::{Diagnostic, Severity};
use crate::node::{Node, NodeKind};

/// Case-insensitive index from key to child position.
///
/// Only entries and sections are indexed. When keys collide the later node wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NodeMap {
    map: HashMap<String, usize>,
}

impl NodeMap {
    fn index_key(key: &str) -> String {
        key.to_lowercase()
    }

    fn put(&mut self, node: &Node, index: usize) {
        if !(node.is_entry() || node.is_section()) {
            return;
        }
        if let Some(key) = node.key() {
            self.map.insert(Self::index_key(key), index);
        }
    }

    fn get(&self, key: &str) -> Option<usize> {
        self.map.get(&Self::index_key(key)).copied()
    }

    fn rebuild(&mut self, nodes: &[Node]) {
        self.map.clear();
        for (index, node) in nodes.iter().enumerate() {
            self.put(node, index);
        }
    }
}

/// An ordered block of child nodes with O(1) lookup by key.
///
/// The ordered list and the key index are updated together by every mutator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionNode {
    nodes: Vec<Node>,
    map: NodeMap,
    child_level: usize,
}

impl SectionNode {
    /// An empty section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_child_level(&mut self, level: usize) {
        self.child_level = level;
        for node in &mut self.nodes {
            node.set_level(level);
        }
    }

    /// Total number of children, void nodes included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the section has no children other than void nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(Node::is_void)
    }

    /// All children in file order, void nodes included.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Children in file order, skipping void nodes.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_void())
    }

    /// Append a node. Ownership moves here, so a node is never in two sections.
    pub fn add(&mut self, mut node: Node) {
        node.set_level(self.child_level);
        self.map.put(&node, self.nodes.len());
        self.nodes.push(node);
    }

    /// Insert a node at `index`, clamped to the end.
    pub fn insert(&mut self, index: usize, mut node: Node) {
        node.set_level(self.child_level);
        let index = index.min(self.nodes.len());
        self.nodes.insert(index, node);
        self.map.rebuild(&self.nodes);
    }

    /// Remove the child at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<Node> {
        if index >= self.nodes.len() {
            return None;
        }
        let node = self.nodes.remove(index);
        self.map.rebuild(&self.nodes);
        Some(node)
    }

    /// Remove the entry or section named `key` (case-insensitive).
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        let index = self.map.get(key)?;
        self.remove_at(index)
    }

    /// The entry or section named `key` (case-insensitive).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.map.get(key).and_then(|index| self.nodes.get(index))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.map.get(key).and_then(|index| self.nodes.get_mut(index))
    }

    /// Position of the entry or section named `key`.
    #[must_use]
    pub fn position(&self, key: &str) -> Option<usize> {
        self.map.get(key)
    }

    #[must_use]
    pub fn get_section(&self, key: &str) -> Option<&SectionNode> {
        self.get(key).and_then(Node::as_section)
    }

    pub fn get_section_mut(&mut self, key: &str) -> Option<&mut SectionNode> {
        self.get_mut(key).and_then(Node::as_section_mut)
    }

    /// Value of the entry named `key`, `None` if missing or not an entry.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::value)
    }

    /// Value of the entry named `key`, or `default`.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_value(key).unwrap_or(default)
    }

    /// Set the entry `key` to `value`, replacing a non-entry node of that name
    /// in place or appending a new entry.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(node) = self.get_mut(key) {
            if node.set_value(value.clone()) {
                return;
            }
        }
        self.set_node(key, Some(Node::entry(key, value)));
    }

    /// Replace the node named `key`, or append it. `None` removes the node.
    pub fn set_node(&mut self, key: &str, node: Option<Node>) {
        let Some(mut node) = node else {
            self.remove(key);
            return;
        };
        match self.map.get(key) {
            Some(index) => {
                node.set_level(self.child_level);
                self.nodes[index] = node;
                self.map.rebuild(&self.nodes);
            }
            None => self.add(node),
        }
    }

    /// Rename the entry or section `old` to `new`. Returns false if `old` does not exist.
    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> bool {
        let Some(index) = self.map.get(old) else {
            return false;
        };
        self.nodes[index].set_key(new.into());
        self.map.rebuild(&self.nodes);
        true
    }

    /// Turn simple nodes into entries by splitting at the first `separator`.
    ///
    /// `levels` limits how many nested sections are converted as well:
    /// `Some(0)` converts only direct children, `None` recurses without limit.
    /// Lines without the separator become invalid nodes and are reported.
    pub fn convert_to_entries(&mut self, levels: Option<usize>, separator: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.convert_to_entries_into(levels, separator, &mut diagnostics);
        diagnostics
    }

    fn convert_to_entries_into(&mut self, levels: Option<usize>, separator: &str, diagnostics: &mut Vec<Diagnostic>) {
        for node in &mut self.nodes {
            if levels != Some(0) {
                if let Some(section) = node.as_section_mut() {
                    section.convert_to_entries_into(levels.map(|l| l - 1), separator, diagnostics);
                }
            }
            if !matches!(node.kind(), NodeKind::Simple) {
                continue;
            }
            let text = node.key().unwrap_or_default().to_owned();
            let (converted, diagnostic) = entry_from_text(&text, separator, node.comment().to_owned(), node.line());
            if let Some(diagnostic) = diagnostic {
                diagnostics.push(diagnostic);
            }
            *node = converted;
        }
        self.set_child_level(self.child_level);
        self.map.rebuild(&self.nodes);
    }

    /// Flatten entries into `prefix + path -> value`, joining nested section keys with `separator`.
    #[must_use]
    pub fn to_map(&self, prefix: &str, separator: &str) -> HashMap<String, String> {
        let mut out = HashMap::with_capacity(self.nodes.len());
        self.to_map_into(prefix, separator, &mut out);
        out
    }

    fn to_map_into(&self, prefix: &str, separator: &str, out: &mut HashMap<String, String>) {
        for node in self.iter() {
            let key = node.key().unwrap_or_default();
            match node.kind() {
                NodeKind::Entry { value } => {
                    out.insert(format!("{prefix}{key}"), value.clone());
                }
                NodeKind::Section(section) => {
                    section.to_map_into(&format!("{prefix}{key}{separator}"), separator, out);
                }
                _ => {}
            }
        }
    }

    /// Copy the values of entries that also exist in `other`, recursing into sections.
    ///
    /// Keys in `excluded` are skipped. Returns false iff both sections contain
    /// exactly the same set of keys.
    pub fn set_values(&mut self, other: &SectionNode, excluded: &[&str]) -> bool {
        let mut differs = false;
        for node in &mut self.nodes {
            if node.is_void() {
                continue;
            }
            let Some(key) = node.key().map(str::to_owned) else {
                continue;
            };
            if excluded.iter().any(|e| e.eq_ignore_ascii_case(&key)) {
                continue;
            }
            let Some(theirs) = other.get(&key) else {
                differs = true;
                continue;
            };
            match (node.kind_mut(), theirs.kind()) {
                (NodeKind::Section(mine), NodeKind::Section(theirs)) => {
                    differs |= mine.set_values(theirs, &[]);
                }
                (NodeKind::Entry { value }, NodeKind::Entry { value: new }) => {
                    value.clone_from(new);
                }
                (NodeKind::Section(_) | NodeKind::Entry { .. }, _) => differs = true,
                _ => {}
            }
        }
        if !differs {
            differs = other
                .iter()
                .filter_map(Node::key)
                .any(|key| self.get(key).is_none());
        }
        differs
    }

    pub(crate) fn push_loaded(&mut self, node: Node) {
        self.add(node);
    }

    pub(crate) fn save_into(&self, indentation: &str, save_separator: &str, out: &mut Vec<String>) {
        for node in &self.nodes {
            node.save_into(indentation, save_separator, out);
        }
    }
}

/// Split `text` at the first `separator` into a trimmed entry, or an invalid node plus a diagnostic.
pub(crate) fn entry_from_text(
    text: &str,
    separator: &str,
    comment: String,
    line: Option<usize>,
) -> (Node, Option<Diagnostic>) {
    match text.split_once(separator) {
        Some((key, value)) => (
            Node::new(
                Some(key.trim().to_owned()),
                comment,
                line,
                NodeKind::Entry {
                    value: value.trim().to_owned(),
                },
            ),
            None,
        ),
        None => {
            let diagnostic = Diagnostic::new(
                Severity::Error,
                format!("'{text}' is not an entry (like 'name {separator} value')"),
                line,
            );
            (
                Node::new(Some(text.to_owned()), comment, line, NodeKind::Invalid),
                Some(diagnostic),
            )
        }
    }
}
