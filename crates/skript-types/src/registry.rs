//! Type registration and the frozen registry that routes parsing, rendering,
//! conversion and serialization through the registered class infos.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::class_info::{ClassInfo, MAX_CODE_NAME_LENGTH};
use crate::codec::{self, SerializedValue};
use crate::converter::{ConverterFn, ConverterGraph, ConverterInfo, ConverterOptions};
use crate::error::{RegistrationError, RegistrationResult};
use crate::log::ParseLog;
use crate::parser::{ParseContext, Parser, StringMode};
use crate::runtime::{RuntimeType, TypeHierarchy, Value};
use crate::settings::Settings;
use crate::sort::sort_class_infos;

/// Rendering of a missing value.
pub const NONE: &str = "<none>";

/// Collects class infos, subtype declarations and converters until
/// [`build`](Self::build) freezes them into a [`TypeRegistry`].
pub struct RegistryBuilder {
    settings: Settings,
    hierarchy: TypeHierarchy,
    infos: Vec<ClassInfo>,
    by_code_name: HashMap<String, usize>,
    by_type: HashMap<RuntimeType, usize>,
    converters: Vec<ConverterInfo>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            hierarchy: TypeHierarchy::new(),
            infos: Vec::new(),
            by_code_name: HashMap::new(),
            by_type: HashMap::new(),
            converters: Vec::new(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Declare `Sub` a subtype of `Super`.
    pub fn declare_subtype<Sub: ?Sized + 'static, Super: ?Sized + 'static>(&mut self) -> RegistrationResult<&mut Self> {
        self.declare_subtype_of(RuntimeType::of::<Sub>(), RuntimeType::of::<Super>())
    }

    pub fn declare_subtype_of(&mut self, sub: RuntimeType, sup: RuntimeType) -> RegistrationResult<&mut Self> {
        self.hierarchy.declare(sub, sup)?;
        Ok(self)
    }

    /// Register a class info. Duplicate code names or types are errors in
    /// strict mode and ignored with a warning otherwise.
    pub fn register_class(&mut self, info: ClassInfo) -> RegistrationResult<&mut Self> {
        let code_name = info.code_name();
        if let Some(&existing) = self.by_code_name.get(code_name) {
            let error = RegistrationError::DuplicateCodeName {
                code_name: code_name.to_owned(),
                ty: info.runtime_type(),
                existing: self.infos[existing].runtime_type(),
            };
            return self.reject(error);
        }
        if self.by_type.contains_key(&info.runtime_type()) {
            let error = RegistrationError::DuplicateType {
                code_name: code_name.to_owned(),
                ty: info.runtime_type(),
            };
            return self.reject(error);
        }
        if code_name.len() > MAX_CODE_NAME_LENGTH {
            return Err(RegistrationError::CodeNameTooLong(code_name.to_owned()));
        }

        tracing::trace!(code_name, ty = %info.runtime_type(), "registered class info");
        let index = self.infos.len();
        self.by_code_name.insert(code_name.to_owned(), index);
        self.by_type.insert(info.runtime_type(), index);
        self.infos.push(info);
        Ok(self)
    }

    fn reject(&mut self, error: RegistrationError) -> RegistrationResult<&mut Self> {
        if self.settings.strict_registration {
            return Err(error);
        }
        tracing::warn!("{error}; ignoring the registration");
        Ok(self)
    }

    /// Register a converter between two concrete types.
    pub fn register_converter<F, T>(
        &mut self,
        convert: impl Fn(&F) -> Option<T> + Send + Sync + 'static,
        options: ConverterOptions,
    ) -> &mut Self
    where
        F: Any + Send + Sync,
        T: Any + Send + Sync,
    {
        self.converters.push(ConverterInfo::typed(convert, options));
        self
    }

    /// Register a converter working on untyped values, e.g. from an abstract supertype.
    pub fn register_converter_dyn(
        &mut self,
        from: RuntimeType,
        to: RuntimeType,
        convert: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
        options: ConverterOptions,
    ) -> &mut Self {
        let converter: ConverterFn = Arc::new(convert);
        self.converters.push(ConverterInfo::new(from, to, converter, options));
        self
    }

    /// Close registration: sort the class infos, close the converter graph
    /// and check serialize-as redirects.
    pub fn build(self) -> RegistrationResult<TypeRegistry> {
        let hierarchy = Arc::new(self.hierarchy);
        let infos = sort_class_infos(self.infos, &hierarchy)?;
        let converters = ConverterGraph::build(Arc::clone(&hierarchy), self.converters);

        let by_code_name = infos
            .iter()
            .enumerate()
            .map(|(i, info)| (info.code_name().to_owned(), i))
            .collect();
        let by_type = infos
            .iter()
            .enumerate()
            .map(|(i, info)| (info.runtime_type(), i))
            .collect();
        let registry = TypeRegistry {
            settings: RwLock::new(self.settings),
            hierarchy,
            infos,
            by_code_name,
            by_type,
            converters,
            super_cache: RwLock::new(HashMap::new()),
        };
        registry.check_serialize_as()?;
        tracing::debug!(
            class_infos = registry.infos.len(),
            converters = registry.converters.edges().len(),
            "type registry built"
        );
        Ok(registry)
    }
}

/// The frozen set of class infos and converters.
///
/// Lookups are safe from any thread; caches are filled lazily behind locks.
pub struct TypeRegistry {
    settings: RwLock<Settings>,
    hierarchy: Arc<TypeHierarchy>,
    infos: Vec<ClassInfo>,
    by_code_name: HashMap<String, usize>,
    by_type: HashMap<RuntimeType, usize>,
    converters: ConverterGraph,
    super_cache: RwLock<HashMap<RuntimeType, Option<usize>>>,
}

impl TypeRegistry {
    fn check_serialize_as(&self) -> RegistrationResult<()> {
        for info in &self.infos {
            let Some(target) = info.serialize_as() else {
                continue;
            };
            let reason = match self.get_exact_class_info(target) {
                None => Some("is not registered"),
                Some(target_info) if target_info.serializer().is_none() => Some("has no serializer"),
                Some(_) if !self.converters.converter_exists(info.runtime_type(), target) => {
                    Some("can't be converted to")
                }
                Some(_) => None,
            };
            if let Some(reason) = reason {
                return Err(RegistrationError::InvalidSerializeAs {
                    code_name: info.code_name().to_owned(),
                    target,
                    reason,
                });
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read()
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut Settings)) {
        update(&mut self.settings.write());
    }

    #[must_use]
    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    #[must_use]
    pub const fn converters(&self) -> &ConverterGraph {
        &self.converters
    }

    /// All class infos, subtypes before supertypes.
    #[must_use]
    pub fn class_infos(&self) -> &[ClassInfo] {
        &self.infos
    }

    #[must_use]
    pub fn get_exact_class_info(&self, ty: RuntimeType) -> Option<&ClassInfo> {
        self.by_type.get(&ty).map(|&i| &self.infos[i])
    }

    #[must_use]
    pub fn exact<T: ?Sized + 'static>(&self) -> Option<&ClassInfo> {
        self.get_exact_class_info(RuntimeType::of::<T>())
    }

    #[must_use]
    pub fn get_class_info(&self, code_name: &str) -> Option<&ClassInfo> {
        self.by_code_name.get(code_name).map(|&i| &self.infos[i])
    }

    #[must_use]
    pub fn get_exact_class_name(&self, ty: RuntimeType) -> Option<&str> {
        self.get_exact_class_info(ty).map(ClassInfo::code_name)
    }

    /// The most specific class info `ty` is assignable to.
    #[must_use]
    pub fn get_super_class_info(&self, ty: RuntimeType) -> Option<&ClassInfo> {
        if let Some(&cached) = self.super_cache.read().get(&ty) {
            return cached.map(|i| &self.infos[i]);
        }
        let found = self
            .infos
            .iter()
            .position(|info| self.hierarchy.is_assignable_from(info.runtime_type(), ty));
        self.super_cache.write().insert(ty, found);
        found.map(|i| &self.infos[i])
    }

    /// The class info a user means by `input`, e.g. "numbers".
    #[must_use]
    pub fn get_class_info_from_user_input(&self, input: &str) -> Option<&ClassInfo> {
        let input = input.trim().to_lowercase();
        self.infos.iter().find(|info| info.matches_user_input(&input))
    }

    /// Parse with the first class info assignable to `target` whose parser accepts `input`.
    #[must_use]
    pub fn parse_simple(&self, input: &str, target: RuntimeType, context: ParseContext) -> Option<Value> {
        let mut log = ParseLog::new();
        let value = self.parse_simple_with_log(input, target, context, &mut log);
        report_failure(input, value.is_none(), &log);
        value
    }

    pub fn parse_simple_with_log(
        &self,
        input: &str,
        target: RuntimeType,
        context: ParseContext,
        log: &mut ParseLog,
    ) -> Option<Value> {
        let mut attempt = ParseLog::new();
        for info in &self.infos {
            let Some(parser) = info.parser() else {
                continue;
            };
            if !parser.can_parse(context)
                || !self.hierarchy.is_assignable_from(target, info.runtime_type())
                || info
                    .parser_family()
                    .is_some_and(|family| self.settings.read().is_family_disabled(family))
            {
                continue;
            }
            attempt.clear();
            let Some(value) = parser.parse(input, context, &mut attempt) else {
                continue;
            };
            if self.hierarchy.is_instance(target, &value) {
                attempt.print_log(log);
                return Some(value);
            }
            tracing::debug!(
                code_name = info.code_name(),
                "parser returned a {} which is not a {target}",
                value.runtime_type()
            );
        }
        attempt.print_error(log, None);
        None
    }

    /// Like [`parse_simple`](Self::parse_simple), then through every converter into `target`.
    #[must_use]
    pub fn parse(&self, input: &str, target: RuntimeType, context: ParseContext) -> Option<Value> {
        let mut log = ParseLog::new();
        let value = self.parse_with_log(input, target, context, &mut log);
        report_failure(input, value.is_none(), &log);
        value
    }

    pub fn parse_with_log(
        &self,
        input: &str,
        target: RuntimeType,
        context: ParseContext,
        log: &mut ParseLog,
    ) -> Option<Value> {
        let mut attempt = ParseLog::new();
        if let Some(value) = self.parse_simple_with_log(input, target, context, &mut attempt) {
            attempt.print_log(log);
            return Some(value);
        }
        for edge in self.converters.edges() {
            if context == ParseContext::Command && edge.options.contains(ConverterOptions::NO_COMMAND_ARGUMENTS) {
                continue;
            }
            if !self.hierarchy.is_assignable_from(target, edge.to) {
                continue;
            }
            attempt.clear();
            let converted = self
                .parse_simple_with_log(input, edge.from, context, &mut attempt)
                .and_then(|value| (edge.converter)(&value));
            if let Some(value) = converted {
                attempt.print_log(log);
                return Some(value);
            }
        }
        attempt.print_error(log, None);
        None
    }

    /// Typed [`parse`](Self::parse).
    #[must_use]
    pub fn parse_as<T: Any + Clone>(&self, input: &str, context: ParseContext) -> Option<T> {
        self.parse(input, RuntimeType::of::<T>(), context)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// A parser producing values assignable to `target`, possibly through a converter.
    #[must_use]
    pub fn get_parser(&self, target: RuntimeType) -> Option<Arc<dyn Parser>> {
        let parser_of = |ty: RuntimeType| {
            self.infos
                .iter()
                .rev()
                .filter(|info| self.hierarchy.is_assignable_from(ty, info.runtime_type()))
                .find_map(ClassInfo::parser)
        };
        if let Some(parser) = parser_of(target) {
            return Some(Arc::clone(parser));
        }
        self.converters
            .edges()
            .iter()
            .filter(|edge| self.hierarchy.is_assignable_from(target, edge.to))
            .find_map(|edge| {
                parser_of(edge.from).map(|parser| {
                    Arc::new(ConvertedParser {
                        inner: Arc::clone(parser),
                        converter: Arc::clone(&edge.converter),
                    }) as Arc<dyn Parser>
                })
            })
    }

    /// Render a value for a message.
    #[must_use]
    pub fn to_string(&self, value: Option<&Value>) -> String {
        self.to_string_mode(value, StringMode::Message, 0)
    }

    #[must_use]
    pub fn to_string_mode(&self, value: Option<&Value>, mode: StringMode, flags: u32) -> String {
        let Some(value) = value else {
            if mode != StringMode::Debug && self.settings.read().warn_when_using_none_values {
                tracing::warn!("a none value was converted to text");
            }
            return NONE.to_owned();
        };
        if let Some(list) = value.as_list() {
            return self.to_string_list(list, true, mode, flags);
        }
        for info in &self.infos {
            let Some(parser) = info.parser() else {
                continue;
            };
            if self.hierarchy.is_instance(info.runtime_type(), value) {
                return match mode {
                    StringMode::Debug => format!("[{}:{}]", info.code_name(), parser.debug_message(value)),
                    _ => parser.to_string_mode(value, mode, flags),
                };
            }
        }
        match mode {
            StringMode::VariableName => format!("object:{value:?}"),
            _ => format!("{value:?}"),
        }
    }

    /// Render values as an English list: `a`, `a and b`, `a, b and c`.
    /// With `and == false` the last separator is `or`.
    #[must_use]
    pub fn to_string_list(&self, values: &[Value], and: bool, mode: StringMode, flags: u32) -> String {
        match values {
            [] => self.to_string_mode(None, mode, flags),
            [single] => self.to_string_mode(Some(single), mode, flags),
            _ => {
                let mut out = String::new();
                let last = values.len() - 1;
                for (i, value) in values.iter().enumerate() {
                    if i == last {
                        out.push_str(if and { " and " } else { " or " });
                    } else if i != 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.to_string_mode(Some(value), mode, flags));
                }
                out
            }
        }
    }

    #[must_use]
    pub fn to_variable_name_string(&self, value: &Value) -> String {
        self.to_string_mode(Some(value), StringMode::VariableName, 0)
    }

    #[must_use]
    pub fn debug_message(&self, value: Option<&Value>) -> String {
        self.to_string_mode(value, StringMode::Debug, 0)
    }

    /// Encode `value` through the class info of its nearest registered
    /// supertype, following serialize-as redirects. `None` if it can't be saved.
    #[must_use]
    pub fn serialize(&self, value: &Value) -> Option<SerializedValue> {
        let mut info = self.get_super_class_info(value.runtime_type())?;
        let mut value = Cow::Borrowed(value);
        if let Some(target) = info.serialize_as() {
            info = self.get_exact_class_info(target)?;
            match self.converters.convert(Some(&value), target) {
                Some(converted) => value = Cow::Owned(converted),
                None => {
                    tracing::debug!(code_name = info.code_name(), "value could not be converted for saving");
                    return None;
                }
            }
        }
        let serializer = info.serializer()?;
        let encoded = serializer
            .serialize(&value)
            .and_then(|encoded| codec::encode_stored(&encoded, serializer.kind(), info.code_name()));
        match encoded {
            Ok(data) => Some(SerializedValue::new(info.code_name(), data)),
            Err(error) => {
                tracing::error!(code_name = info.code_name(), %error, "failed to serialize value");
                None
            }
        }
    }

    /// Decode a value saved by [`serialize`](Self::serialize). Unknown type
    /// codes and corrupt data are logged and yield `None`.
    #[must_use]
    pub fn deserialize(&self, type_code: &str, data: &[u8]) -> Option<Value> {
        let Some(info) = self.get_class_info(type_code) else {
            tracing::warn!(type_code, "unknown type '{type_code}', value lost");
            return None;
        };
        let Some(serializer) = info.serializer() else {
            tracing::warn!(type_code, "type '{type_code}' can't be loaded, value lost");
            return None;
        };
        let decoded = codec::decode_stored(data, serializer.kind(), info.code_name())
            .and_then(|encoded| serializer.deserialize(&encoded));
        match decoded {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(type_code, %error, "invalid saved value");
                None
            }
        }
    }

    /// Convenience for [`deserialize`](Self::deserialize).
    #[must_use]
    pub fn deserialize_serialized(&self, value: &SerializedValue) -> Option<Value> {
        self.deserialize(&value.type_code, &value.data)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("class_infos", &self.infos.iter().map(ClassInfo::code_name).collect::<Vec<_>>())
            .field("converters", &self.converters.edges().len())
            .finish_non_exhaustive()
    }
}

fn report_failure(input: &str, failed: bool, log: &ParseLog) {
    if !failed {
        return;
    }
    if let Some(error) = log.best_error() {
        tracing::debug!(input, "{}", error.message);
    }
}

/// A parser followed by a converter.
struct ConvertedParser {
    inner: Arc<dyn Parser>,
    converter: ConverterFn,
}

impl Parser for ConvertedParser {
    fn parse(&self, input: &str, context: ParseContext, log: &mut ParseLog) -> Option<Value> {
        self.inner
            .parse(input, context, log)
            .and_then(|value| (self.converter)(&value))
    }

    fn can_parse(&self, context: ParseContext) -> bool {
        self.inner.can_parse(context)
    }

    fn to_string(&self, value: &Value, _flags: u32) -> String {
        format!("{value:?}")
    }

    fn to_variable_name_string(&self, value: &Value) -> String {
        format!("{value:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FnParser;

    fn int_info(code_name: &str) -> ClassInfo {
        ClassInfo::builder::<i64>(code_name)
            .parser(FnParser::new(|s, _| s.parse().ok(), |n: &i64| n.to_string()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicates_strict_and_lenient() {
        let mut strict = RegistryBuilder::new(Settings::strict());
        strict.register_class(int_info("integer")).unwrap();
        assert!(matches!(
            strict.register_class(int_info("integer")),
            Err(RegistrationError::DuplicateCodeName { .. })
        ));
        assert!(matches!(
            strict.register_class(int_info("long")),
            Err(RegistrationError::DuplicateType { .. })
        ));

        let mut lenient = RegistryBuilder::new(Settings::default());
        lenient.register_class(int_info("integer")).unwrap();
        lenient.register_class(int_info("integer")).unwrap();
        lenient.register_class(int_info("long")).unwrap();
        let registry = lenient.build().unwrap();
        assert_eq!(registry.class_infos().len(), 1);
    }

    #[test]
    fn test_code_name_too_long() {
        let mut builder = RegistryBuilder::new(Settings::strict());
        let name = "a".repeat(MAX_CODE_NAME_LENGTH + 1);
        let info = ClassInfo::builder::<i64>(name).build().unwrap();
        assert!(matches!(
            builder.register_class(info),
            Err(RegistrationError::CodeNameTooLong(_))
        ));
    }

    #[test]
    fn test_serialize_as_checked_at_build() {
        let mut builder = RegistryBuilder::new(Settings::strict());
        builder
            .register_class(ClassInfo::builder::<i32>("small").serialize_as::<i64>().build().unwrap())
            .unwrap();
        builder.register_class(int_info("integer")).unwrap();
        assert!(matches!(
            builder.build(),
            Err(RegistrationError::InvalidSerializeAs {
                reason: "has no serializer",
                ..
            })
        ));
    }

    #[test]
    fn test_converted_parser() {
        let mut builder = RegistryBuilder::new(Settings::strict());
        builder.register_class(int_info("integer")).unwrap();
        builder.register_converter(|n: &i64| u8::try_from(*n).ok(), ConverterOptions::empty());
        let registry = builder.build().unwrap();

        let parser = registry.get_parser(RuntimeType::of::<u8>()).unwrap();
        let value = parser.parse("7", ParseContext::Default, &mut ParseLog::new()).unwrap();
        assert_eq!(value.downcast_ref::<u8>(), Some(&7));
        assert!(registry.get_parser(RuntimeType::of::<bool>()).is_none());
    }

    #[test]
    fn test_none_rendering() {
        let registry = RegistryBuilder::new(Settings::default()).build().unwrap();
        assert_eq!(registry.to_string(None), NONE);
        assert_eq!(registry.to_string_list(&[], false, StringMode::Message, 0), NONE);
        assert_eq!(
            registry.to_variable_name_string(&Value::new(3_u16)),
            "object:<u16>"
        );
    }
}
