//! The variable tree and its flat index.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use hashbrown::HashMap;
use skript_types::Value;

use crate::name::{LIST_SUFFIX, SEPARATOR, compare_segments, is_list, split_variable_name};

/// A list segment ordered with [`compare_segments`].
#[derive(Clone, PartialEq, Eq)]
pub struct Segment(String);

impl Segment {
    #[must_use]
    pub fn new(segment: impl Into<String>) -> Self {
        Self(segment.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_segments(&self.0, &other.0)
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// A list variable: an optional value of its own plus ordered children.
#[derive(Debug, Clone, Default)]
pub struct List {
    value: Option<Value>,
    children: BTreeMap<Segment, Variable>,
}

impl List {
    /// The value of the list name itself, e.g. `{a}` when `{a::1}` also exists.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn get(&self, segment: &str) -> Option<&Variable> {
        self.children.get(&Segment::new(segment))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Direct children in segment order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.children.iter().map(|(segment, variable)| (segment.as_str(), variable))
    }

    /// The values of the direct children. Sublists contribute their own value, if any.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.children.values().filter_map(|variable| match variable {
            Variable::Value(value) => Some(value),
            Variable::List(list) => list.value(),
        })
    }

    fn is_unused(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    fn walk<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Value)>) {
        if let Some(value) = &self.value {
            out.push((prefix.to_owned(), value));
        }
        for (segment, child) in &self.children {
            child.walk(&child_name(prefix, segment.as_str()), out);
        }
    }

    /// Set the value at `path` below this list. Returns whether anything changed.
    fn set(&mut self, path: &[&str], value: Option<Value>) -> bool {
        let Some((&segment, rest)) = path.split_first() else {
            return false;
        };
        let key = Segment::new(segment);
        if rest.is_empty() {
            return match (self.children.get_mut(&key), value) {
                (Some(Variable::List(list)), value) => {
                    list.value = value;
                    if list.is_unused() {
                        self.children.remove(&key);
                    }
                    true
                }
                (_, Some(value)) => {
                    self.children.insert(key, Variable::Value(value));
                    true
                }
                (_, None) => self.children.remove(&key).is_some(),
            };
        }

        let child = match self.children.get_mut(&key) {
            Some(Variable::List(list)) => list,
            existing => {
                if value.is_none() {
                    return false;
                }
                // A plain value becomes the list's own value.
                let own = match existing {
                    Some(Variable::Value(own)) => Some(own.clone()),
                    _ => None,
                };
                let list = List {
                    value: own,
                    children: BTreeMap::new(),
                };
                self.children.insert(key.clone(), Variable::List(list));
                match self.children.get_mut(&key) {
                    Some(Variable::List(list)) => list,
                    _ => return false,
                }
            }
        };
        let changed = child.set(rest, value);
        if child.is_unused() {
            self.children.remove(&key);
        }
        changed
    }

    /// Remove the whole list at `path`, keeping its own value as a plain value.
    /// Returns the removed full names.
    fn delete_list(&mut self, path: &[&str], prefix: &str) -> Vec<String> {
        let Some((&segment, rest)) = path.split_first() else {
            let mut removed = Vec::new();
            for (child_segment, child) in std::mem::take(&mut self.children) {
                let mut names = Vec::new();
                child.walk(&child_name(prefix, child_segment.as_str()), &mut names);
                removed.extend(names.into_iter().map(|(name, _)| name));
            }
            return removed;
        };
        let name = child_name(prefix, segment);
        let key = Segment::new(segment);
        let Some(Variable::List(child)) = self.children.get_mut(&key) else {
            return Vec::new();
        };
        let removed = child.delete_list(rest, &name);
        if rest.is_empty() {
            match child.value.take() {
                Some(own) => {
                    self.children.insert(key, Variable::Value(own));
                }
                None => {
                    self.children.remove(&key);
                }
            }
        } else if child.is_unused() {
            self.children.remove(&key);
        }
        removed
    }
}

fn child_name(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}{SEPARATOR}{segment}")
    }
}

/// A variable: a single value or a list.
#[derive(Debug, Clone)]
pub enum Variable {
    Value(Value),
    List(List),
}

impl Variable {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::List(_) => None,
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(list) => Some(list),
            Self::Value(_) => None,
        }
    }

    fn walk<'a>(&'a self, name: &str, out: &mut Vec<(String, &'a Value)>) {
        match self {
            Self::Value(value) => out.push((name.to_owned(), value)),
            Self::List(list) => list.walk(name, out),
        }
    }
}

/// All variables of one scope, as a tree for list access and a flat map for
/// single lookups.
#[derive(Debug, Clone, Default)]
pub struct VariablesMap {
    root: List,
    flat: HashMap<String, Value>,
}

impl VariablesMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a single variable, or a whole list with `name::*`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Variable> {
        if !is_list(name) {
            return self.flat.get(name).cloned().map(Variable::Value);
        }
        let mut current = &self.root;
        for segment in split_variable_name(name) {
            if segment == "*" {
                return Some(Variable::List(current.clone()));
            }
            current = current.get(segment)?.as_list()?;
        }
        None
    }

    /// Look up a single value.
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.flat.get(name)
    }

    /// Set or, with `None`, delete a variable. `list::*` with `None` deletes
    /// every element of the list. Setting a list name to a value is ignored.
    pub fn set(&mut self, name: &str, value: Option<Value>) {
        if is_list(name) {
            if value.is_some() {
                tracing::warn!(name, "can't set a whole list to a single value");
            } else {
                self.remove_list(name);
            }
            return;
        }

        match &value {
            Some(value) => {
                self.flat.insert(name.to_owned(), value.clone());
            }
            None => {
                self.flat.remove(name);
            }
        }
        self.root.set(&split_variable_name(name), value);
    }

    /// Delete every element of the list `name` (`list::*`), keeping the value
    /// of `list` itself. Returns the full names of the removed values.
    pub fn remove_list(&mut self, name: &str) -> Vec<String> {
        let prefix = name.strip_suffix(LIST_SUFFIX).unwrap_or("");
        let path = if prefix.is_empty() {
            Vec::new()
        } else {
            split_variable_name(prefix)
        };
        let removed = self.root.delete_list(&path, "");
        for name in &removed {
            self.flat.remove(name);
        }
        removed
    }

    /// Number of single values, list values included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flat.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    /// Every value with its full name, in tree order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, &Value)> {
        let mut out = Vec::with_capacity(self.flat.len());
        for (segment, child) in &self.root.children {
            child.walk(segment.as_str(), &mut out);
        }
        out
    }

    pub fn clear(&mut self) {
        self.root = List::default();
        self.flat.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::new(n)
    }

    fn names(map: &VariablesMap) -> Vec<String> {
        map.entries().into_iter().map(|(name, _)| name).collect()
    }

    #[test]
    fn test_set_and_get() {
        let mut map = VariablesMap::new();
        map.set("points", Some(int(1)));
        map.set("homes::10", Some(int(10)));
        map.set("homes::9", Some(int(9)));
        map.set("homes::a::b", Some(int(0)));

        assert_eq!(map.get_value("points").and_then(|v| v.downcast_ref::<i64>()), Some(&1));
        assert_eq!(map.len(), 4);
        assert_eq!(names(&map), ["homes::9", "homes::10", "homes::a::b", "points"]);

        let Some(Variable::List(homes)) = map.get("homes::*") else {
            panic!("expected a list");
        };
        assert_eq!(homes.len(), 3);
        let values: Vec<i64> = homes.values().filter_map(|v| v.downcast_ref::<i64>().copied()).collect();
        assert_eq!(values, [9, 10]);
        assert!(map.get("points::*").is_none());
        assert!(map.get("missing").is_none());
    }

    #[test]
    fn test_value_becomes_list_value() {
        let mut map = VariablesMap::new();
        map.set("a", Some(int(1)));
        map.set("a::1", Some(int(2)));
        let Some(Variable::List(a)) = map.get("a::*") else {
            panic!("expected a list");
        };
        assert_eq!(a.value().and_then(|v| v.downcast_ref::<i64>()), Some(&1));
        assert_eq!(names(&map), ["a", "a::1"]);

        map.set("a", None);
        assert!(map.get_value("a").is_none());
        assert_eq!(names(&map), ["a::1"]);
    }

    #[test]
    fn test_delete_numbered_elements() {
        let mut map = VariablesMap::new();
        for n in [9, 10, 11, 100] {
            map.set(&format!("homes::{n}"), Some(int(n)));
        }
        map.set("homes::10", None);
        map.set("homes::100", None);

        assert_eq!(map.len(), 2);
        assert_eq!(names(&map), ["homes::9", "homes::11"]);
        let Some(Variable::List(homes)) = map.get("homes::*") else {
            panic!("expected a list");
        };
        let segments: Vec<&str> = homes.iter().map(|(segment, _)| segment).collect();
        assert_eq!(segments, ["9", "11"]);
        assert!(homes.get("10").is_none());
        assert!(homes.get("11").is_some());
    }

    #[test]
    fn test_delete_prunes_empty_lists() {
        let mut map = VariablesMap::new();
        map.set("x::y::z", Some(int(1)));
        map.set("x::y::z", None);
        assert!(map.is_empty());
        assert!(map.get("x::*").is_none());
    }

    #[test]
    fn test_delete_list() {
        let mut map = VariablesMap::new();
        map.set("list", Some(int(0)));
        map.set("list::1", Some(int(1)));
        map.set("list::2::deep", Some(int(2)));
        map.set("other", Some(int(3)));

        map.set("list::*", None);
        assert_eq!(names(&map), ["list", "other"]);
        assert_eq!(map.len(), 2);
        assert!(map.get_value("list::2::deep").is_none());

        map.set("list::*", Some(int(4)));
        assert_eq!(map.len(), 2);

        map.set("x::1", Some(int(1)));
        let mut removed = map.remove_list("*");
        removed.sort();
        assert_eq!(removed, ["list", "other", "x::1"]);
        assert!(map.is_empty());
    }
}
