//! Variables local to one execution.

use skript_types::Value;

use crate::map::{Variable, VariablesMap};

/// Local variables of a single trigger execution.
///
/// Owned by the execution context and passed along explicitly; the variables
/// go away with it. Never shared between threads, so there is no locking and
/// nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct LocalVariables {
    map: VariablesMap,
}

impl LocalVariables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Variable> {
        self.map.get(name)
    }

    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.map.get_value(name)
    }

    pub fn set(&mut self, name: &str, value: Option<Value>) {
        self.map.set(name, value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Hand the variables to another execution, e.g. a delayed continuation.
    #[must_use]
    pub fn into_map(self) -> VariablesMap {
        self.map
    }
}

impl From<VariablesMap> for LocalVariables {
    fn from(map: VariablesMap) -> Self {
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_are_independent() {
        let mut first = LocalVariables::new();
        let mut second = LocalVariables::new();
        first.set("_x", Some(Value::new(1_i64)));
        second.set("_x::1", Some(Value::new(2_i64)));

        assert_eq!(first.get_value("_x").and_then(|v| v.downcast_ref::<i64>()), Some(&1));
        assert!(first.get("_x::*").is_none());
        assert!(second.get_value("_x").is_none());
        assert_eq!(second.get("_x::*").and_then(|v| v.as_list().map(|l| l.len())), Some(1));

        let moved = LocalVariables::from(first.into_map());
        assert_eq!(moved.len(), 1);
    }
}
