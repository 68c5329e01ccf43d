//! Runtime type handles, dynamically typed values and the declared subtype relation.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::error::{RegistrationError, RegistrationResult};

/// Handle of a Rust type taking part in the registry.
///
/// Abstract supertypes such as "number" are plain marker types that never
/// have instances; they only exist as nodes of the [`TypeHierarchy`].
#[derive(Clone, Copy)]
pub struct RuntimeType {
    id: TypeId,
    name: &'static str,
}

/// Marker for the root type every value is assignable to.
pub enum Object {}

impl RuntimeType {
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The root type.
    #[must_use]
    pub fn object() -> Self {
        Self::of::<Object>()
    }

    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// The Rust type name, for diagnostics only.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        self.id == TypeId::of::<Object>()
    }
}

impl PartialEq for RuntimeType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuntimeType {}

impl Hash for RuntimeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A cheaply clonable, dynamically typed value.
#[derive(Clone)]
pub struct Value {
    ty: RuntimeType,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            ty: RuntimeType::of::<T>(),
            inner: Arc::new(value),
        }
    }

    /// A list of values, rendered as a list by the registry.
    #[must_use]
    pub fn list(values: Vec<Self>) -> Self {
        Self::new(values)
    }

    #[must_use]
    pub const fn runtime_type(&self) -> RuntimeType {
        self.ty
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        self.downcast_ref::<Vec<Self>>().map(Vec::as_slice)
    }

    /// Whether both values are the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(list) = self.as_list() {
            return f.debug_list().entries(list).finish();
        }
        macro_rules! show {
            ($($ty:ty),*) => {
                $(if let Some(value) = self.downcast_ref::<$ty>() {
                    return write!(f, "{value:?}");
                })*
            };
        }
        show!(i64, f64, bool, String);
        write!(f, "<{}>", self.ty)
    }
}

/// The declared subtype relation between runtime types.
///
/// Rust has no inheritance, so every "is a" relation the registry relies on
/// is declared explicitly. The relation is reflexive, transitive and every
/// type is assignable to [`RuntimeType::object`].
#[derive(Debug, Default, Clone)]
pub struct TypeHierarchy {
    parents: HashMap<RuntimeType, Vec<RuntimeType>>,
}

impl TypeHierarchy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `sub` a direct subtype of `sup`.
    pub fn declare(&mut self, sub: RuntimeType, sup: RuntimeType) -> RegistrationResult<()> {
        if sup.is_object() || self.is_assignable_from(sup, sub) {
            return Ok(());
        }
        if self.is_assignable_from(sub, sup) {
            return Err(RegistrationError::SubtypeCycle { sub, sup });
        }
        self.parents.entry(sub).or_default().push(sup);
        Ok(())
    }

    /// Whether a value of type `sub` may be used where `sup` is expected.
    #[must_use]
    pub fn is_assignable_from(&self, sup: RuntimeType, sub: RuntimeType) -> bool {
        if sup == sub || sup.is_object() {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![sub];
        while let Some(ty) = stack.pop() {
            let Some(parents) = self.parents.get(&ty) else {
                continue;
            };
            for &parent in parents {
                if parent == sup {
                    return true;
                }
                if seen.insert(parent) {
                    stack.push(parent);
                }
            }
        }
        false
    }

    /// Whether `value` is an instance of `ty`.
    #[must_use]
    pub fn is_instance(&self, ty: RuntimeType, value: &Value) -> bool {
        self.is_assignable_from(ty, value.runtime_type())
    }

    /// Assignable in either direction.
    #[must_use]
    pub fn related(&self, a: RuntimeType, b: RuntimeType) -> bool {
        self.is_assignable_from(a, b) || self.is_assignable_from(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Number {}
    enum Animal {}

    #[test]
    fn test_assignability() {
        let mut hierarchy = TypeHierarchy::new();
        let int = RuntimeType::of::<i64>();
        let number = RuntimeType::of::<Number>();
        hierarchy.declare(int, number).unwrap();

        assert!(hierarchy.is_assignable_from(number, int));
        assert!(!hierarchy.is_assignable_from(int, number));
        assert!(hierarchy.is_assignable_from(int, int));
        assert!(hierarchy.is_assignable_from(RuntimeType::object(), number));
        assert!(!hierarchy.is_assignable_from(RuntimeType::of::<Animal>(), int));
        assert!(hierarchy.related(int, number));
    }

    #[test]
    fn test_transitive_and_cycle() {
        let mut hierarchy = TypeHierarchy::new();
        let a = RuntimeType::of::<u8>();
        let b = RuntimeType::of::<u16>();
        let c = RuntimeType::of::<u32>();
        hierarchy.declare(a, b).unwrap();
        hierarchy.declare(b, c).unwrap();
        assert!(hierarchy.is_assignable_from(c, a));
        assert!(matches!(
            hierarchy.declare(c, a),
            Err(RegistrationError::SubtypeCycle { .. })
        ));
    }

    #[test]
    fn test_value_downcast() {
        let value = Value::new(5_i64);
        assert_eq!(value.downcast_ref::<i64>(), Some(&5));
        assert!(value.downcast_ref::<f64>().is_none());
        assert_eq!(value.runtime_type(), RuntimeType::of::<i64>());

        let list = Value::list(vec![value.clone(), Value::new(true)]);
        assert_eq!(list.as_list().unwrap().len(), 2);
        assert_eq!(format!("{list:?}"), "[5, true]");
    }
}
