//! Registration records of domain types.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashSet;
use regex::Regex;

use crate::codec::Serializer;
use crate::error::{RegistrationError, RegistrationResult};
use crate::parser::Parser;
use crate::runtime::{RuntimeType, Value};

/// Longest code name that can be stored next to a saved variable.
pub const MAX_CODE_NAME_LENGTH: usize = 50;

/// How a changer modifies its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeMode {
    Add,
    Set,
    Remove,
    RemoveAll,
    Delete,
    Reset,
}

/// Mutates values of a type in place, e.g. `add 5 to {points}`.
pub trait Changer: Send + Sync {
    /// The types accepted as delta for `mode`, or `None` if the mode is unsupported.
    /// An empty list means the mode takes no delta.
    fn accept_change(&self, mode: ChangeMode) -> Option<Vec<RuntimeType>>;

    fn change(&self, targets: &[Value], delta: Option<&[Value]>, mode: ChangeMode);
}

/// Arithmetic between values of a type and its relative type.
pub trait Arithmetic: Send + Sync {
    fn difference(&self, first: &Value, second: &Value) -> Option<Value>;
    fn add(&self, value: &Value, delta: &Value) -> Option<Value>;
    fn subtract(&self, value: &Value, delta: &Value) -> Option<Value>;
}

#[derive(Clone)]
pub struct Math {
    pub relative: RuntimeType,
    pub arithmetic: Arc<dyn Arithmetic>,
}

/// Produces the value an expression of this type defaults to.
pub type DefaultValueFn = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// A named group of parsers that can be switched off as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParserFamily(pub String);

impl ParserFamily {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Documentation {
    pub description: Vec<String>,
    pub usage: Vec<String>,
    pub examples: Vec<String>,
    pub since: Option<String>,
}

/// Immutable description of one registered type.
pub struct ClassInfo {
    ty: RuntimeType,
    code_name: String,
    name: String,
    user_patterns: Vec<Regex>,
    parser: Option<Arc<dyn Parser>>,
    default_value: Option<DefaultValueFn>,
    changer: Option<Arc<dyn Changer>>,
    serializer: Option<Arc<dyn Serializer>>,
    serialize_as: Option<RuntimeType>,
    math: Option<Math>,
    docs: Documentation,
    before: HashSet<String>,
    after: HashSet<String>,
    family: Option<ParserFamily>,
}

impl ClassInfo {
    /// Start describing the Rust type `T`.
    pub fn builder<T: ?Sized + 'static>(code_name: impl Into<String>) -> ClassInfoBuilder {
        ClassInfoBuilder::new(RuntimeType::of::<T>(), code_name.into())
    }

    /// Start describing an arbitrary runtime type, e.g. [`RuntimeType::object`].
    pub fn builder_for(ty: RuntimeType, code_name: impl Into<String>) -> ClassInfoBuilder {
        ClassInfoBuilder::new(ty, code_name.into())
    }

    #[must_use]
    pub const fn runtime_type(&self) -> RuntimeType {
        self.ty
    }

    #[must_use]
    pub fn code_name(&self) -> &str {
        &self.code_name
    }

    /// Human readable name. Defaults to the code name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn user_patterns(&self) -> &[Regex] {
        &self.user_patterns
    }

    /// Whether `input` names this type, e.g. "numbers" for "number".
    #[must_use]
    pub fn matches_user_input(&self, input: &str) -> bool {
        self.user_patterns.iter().any(|pattern| pattern.is_match(input))
    }

    #[must_use]
    pub fn parser(&self) -> Option<&Arc<dyn Parser>> {
        self.parser.as_ref()
    }

    #[must_use]
    pub fn default_value(&self) -> Option<Value> {
        self.default_value.as_ref().and_then(|default| default())
    }

    #[must_use]
    pub fn changer(&self) -> Option<&Arc<dyn Changer>> {
        self.changer.as_ref()
    }

    #[must_use]
    pub fn serializer(&self) -> Option<&Arc<dyn Serializer>> {
        self.serializer.as_ref()
    }

    #[must_use]
    pub const fn serialize_as(&self) -> Option<RuntimeType> {
        self.serialize_as
    }

    #[must_use]
    pub const fn math(&self) -> Option<&Math> {
        self.math.as_ref()
    }

    #[must_use]
    pub const fn docs(&self) -> &Documentation {
        &self.docs
    }

    #[must_use]
    pub const fn before(&self) -> &HashSet<String> {
        &self.before
    }

    #[must_use]
    pub const fn after(&self) -> &HashSet<String> {
        &self.after
    }

    #[must_use]
    pub const fn parser_family(&self) -> Option<&ParserFamily> {
        self.family.as_ref()
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("code_name", &self.code_name)
            .field("ty", &self.ty)
            .field("parser", &self.parser.is_some())
            .field("serializer", &self.serializer.is_some())
            .field("serialize_as", &self.serialize_as)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn is_valid_code_name(code_name: &str) -> bool {
    !code_name.is_empty()
        && code_name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Fluent builder of a [`ClassInfo`].
///
/// Every single-valued field may be set once; setting one twice is recorded
/// and reported by [`build`](Self::build).
///
/// ```
/// use skript_types::{ClassInfo, FnParser};
///
/// let info = ClassInfo::builder::<bool>("boolean")
///     .user(&["booleans?"])
///     .parser(FnParser::new(|s, _| s.parse().ok(), |b: &bool| b.to_string()))
///     .build()
///     .unwrap();
/// assert!(info.matches_user_input("booleans"));
/// ```
#[must_use = "a builder does nothing until `build` is called"]
pub struct ClassInfoBuilder {
    ty: RuntimeType,
    code_name: String,
    name: Option<String>,
    user: Option<Vec<String>>,
    parser: Option<Arc<dyn Parser>>,
    default_value: Option<DefaultValueFn>,
    changer: Option<Arc<dyn Changer>>,
    serializer: Option<Arc<dyn Serializer>>,
    serialize_as: Option<RuntimeType>,
    math: Option<Math>,
    docs: Documentation,
    before: HashSet<String>,
    after: HashSet<String>,
    family: Option<ParserFamily>,
    set_twice: Vec<&'static str>,
}

macro_rules! set_once {
    ($self:ident, $field:ident, $value:expr) => {{
        if $self.$field.is_some() {
            $self.set_twice.push(stringify!($field));
        }
        $self.$field = Some($value);
        $self
    }};
}

impl ClassInfoBuilder {
    fn new(ty: RuntimeType, code_name: String) -> Self {
        Self {
            ty,
            code_name,
            name: None,
            user: None,
            parser: None,
            default_value: None,
            changer: None,
            serializer: None,
            serialize_as: None,
            math: None,
            docs: Documentation::default(),
            before: HashSet::new(),
            after: HashSet::new(),
            family: None,
            set_twice: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        set_once!(self, name, name.into())
    }

    /// Regexes matching what users may type to refer to this type.
    /// Matching is case-insensitive and covers the whole input.
    pub fn user(mut self, patterns: &[&str]) -> Self {
        set_once!(self, user, patterns.iter().map(|&p| p.to_owned()).collect())
    }

    pub fn parser(mut self, parser: impl Parser + 'static) -> Self {
        set_once!(self, parser, Arc::new(parser))
    }

    pub fn default_value(mut self, default: impl Fn() -> Option<Value> + Send + Sync + 'static) -> Self {
        set_once!(self, default_value, Arc::new(default))
    }

    pub fn changer(mut self, changer: impl Changer + 'static) -> Self {
        set_once!(self, changer, Arc::new(changer))
    }

    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        set_once!(self, serializer, Arc::new(serializer))
    }

    /// Save values of this type as `U`, converting them first.
    pub fn serialize_as<U: ?Sized + 'static>(mut self) -> Self {
        set_once!(self, serialize_as, RuntimeType::of::<U>())
    }

    pub fn math<R: ?Sized + 'static>(mut self, arithmetic: impl Arithmetic + 'static) -> Self {
        set_once!(
            self,
            math,
            Math {
                relative: RuntimeType::of::<R>(),
                arithmetic: Arc::new(arithmetic),
            }
        )
    }

    pub fn parser_family(mut self, family: impl Into<String>) -> Self {
        set_once!(self, family, ParserFamily::new(family))
    }

    pub fn description(mut self, lines: &[&str]) -> Self {
        self.docs.description = lines.iter().map(|&l| l.to_owned()).collect();
        self
    }

    pub fn usage(mut self, lines: &[&str]) -> Self {
        self.docs.usage = lines.iter().map(|&l| l.to_owned()).collect();
        self
    }

    pub fn examples(mut self, lines: &[&str]) -> Self {
        self.docs.examples = lines.iter().map(|&l| l.to_owned()).collect();
        self
    }

    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.docs.since = Some(since.into());
        self
    }

    /// This type must be ordered before the given code names.
    pub fn before(mut self, code_names: &[&str]) -> Self {
        self.before.extend(code_names.iter().map(|&c| c.to_owned()));
        self
    }

    /// This type must be ordered after the given code names.
    pub fn after(mut self, code_names: &[&str]) -> Self {
        self.after.extend(code_names.iter().map(|&c| c.to_owned()));
        self
    }

    pub fn build(self) -> RegistrationResult<ClassInfo> {
        if !is_valid_code_name(&self.code_name) {
            return Err(RegistrationError::InvalidCodeName(self.code_name));
        }
        if let Some(&field) = self.set_twice.first() {
            return Err(RegistrationError::FieldSetTwice {
                code_name: self.code_name,
                field,
            });
        }
        if self.serializer.is_some() && self.serialize_as.is_some() {
            return Err(RegistrationError::SerializerConflict(self.code_name));
        }
        let user_patterns = self
            .user
            .unwrap_or_default()
            .iter()
            .map(|pattern| Regex::new(&format!("(?i)^(?:{pattern})$")))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| RegistrationError::InvalidPattern {
                code_name: self.code_name.clone(),
                source,
            })?;

        Ok(ClassInfo {
            ty: self.ty,
            name: self.name.unwrap_or_else(|| self.code_name.clone()),
            code_name: self.code_name,
            user_patterns,
            parser: self.parser,
            default_value: self.default_value,
            changer: self.changer,
            serializer: self.serializer,
            serialize_as: self.serialize_as,
            math: self.math,
            docs: self.docs,
            before: self.before,
            after: self.after,
            family: self.family,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FnParser;

    fn int_parser() -> FnParser<i64> {
        FnParser::new(|s, _| s.parse().ok(), |n: &i64| n.to_string())
    }

    #[test]
    fn test_build_defaults() {
        let info = ClassInfo::builder::<i64>("integer")
            .user(&["int(eger)?s?"])
            .parser(int_parser())
            .description(&["A whole number."])
            .since("1.0")
            .build()
            .unwrap();
        assert_eq!(info.code_name(), "integer");
        assert_eq!(info.name(), "integer");
        assert!(info.matches_user_input("Integers"));
        assert!(info.matches_user_input("int"));
        assert!(!info.matches_user_input("an integer"));
        assert!(info.parser().is_some());
        assert!(info.default_value().is_none());
        assert_eq!(info.docs().since.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_invalid_code_names() {
        for code_name in ["", "Integer", "big int", "über"] {
            assert!(matches!(
                ClassInfo::builder::<i64>(code_name).build(),
                Err(RegistrationError::InvalidCodeName(_))
            ));
        }
    }

    #[test]
    fn test_set_twice() {
        let result = ClassInfo::builder::<i64>("integer")
            .parser(int_parser())
            .parser(int_parser())
            .build();
        assert!(matches!(
            result,
            Err(RegistrationError::FieldSetTwice { field: "parser", .. })
        ));
    }

    #[test]
    fn test_serializer_conflict_and_bad_pattern() {
        struct Nothing;
        impl Serializer for Nothing {
            fn serialize(&self, value: &Value) -> crate::error::CodecResult<crate::codec::Encoded> {
                Err(crate::error::CodecError::Unsupported(format!("{value:?}")))
            }

            fn deserialize(&self, encoded: &crate::codec::Encoded) -> crate::error::CodecResult<Value> {
                Err(crate::error::CodecError::Unsupported(format!("{encoded:?}")))
            }
        }

        let result = ClassInfo::builder::<i32>("small")
            .serializer(Nothing)
            .serialize_as::<i64>()
            .build();
        assert!(matches!(result, Err(RegistrationError::SerializerConflict(_))));

        let result = ClassInfo::builder::<i32>("small").user(&["(unclosed"]).build();
        assert!(matches!(result, Err(RegistrationError::InvalidPattern { .. })));
    }
}
