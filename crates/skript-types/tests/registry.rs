//! Registry behaviour over the built-in types plus a few test types.

use skript_types::defaults::{self, Number};
use skript_types::{
    ClassInfo, ConverterOptions, FnParser, ParseContext, ParseLog, RegistrationError, RegistryBuilder, RuntimeType,
    Settings, StringMode, Timespan, TypeRegistry, Value,
};

fn registry() -> TypeRegistry {
    let mut builder = RegistryBuilder::new(Settings::strict());
    defaults::register_defaults(&mut builder).unwrap();
    builder.build().unwrap()
}

fn codes(registry: &TypeRegistry) -> Vec<&str> {
    registry.class_infos().iter().map(ClassInfo::code_name).collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Celsius(f64);

#[test]
fn test_subtypes_sorted_before_supertypes() {
    let registry = registry();
    let order = codes(&registry);
    let position = |code: &str| order.iter().position(|c| *c == code).unwrap();

    for info in registry.class_infos() {
        for other in registry.class_infos() {
            if info.runtime_type() != other.runtime_type()
                && registry
                    .hierarchy()
                    .is_assignable_from(other.runtime_type(), info.runtime_type())
            {
                assert!(position(info.code_name()) < position(other.code_name()));
            }
        }
    }
    assert_eq!(order.last(), Some(&"object"));
}

#[test]
fn test_circular_hints_fail_build() {
    let mut builder = RegistryBuilder::new(Settings::strict());
    builder
        .register_class(ClassInfo::builder::<u8>("x").after(&["y"]).build().unwrap())
        .unwrap()
        .register_class(ClassInfo::builder::<u16>("y").after(&["z"]).build().unwrap())
        .unwrap()
        .register_class(ClassInfo::builder::<u32>("z").after(&["x"]).build().unwrap())
        .unwrap();
    let error = builder.build().unwrap_err();
    insta::assert_snapshot!(
        error.to_string(),
        @"ClassInfos with circular dependencies detected: x (after: y), y (after: z), z (after: x)"
    );
}

#[test]
fn test_parse_prefers_subtypes() {
    let registry = registry();
    let number = RuntimeType::of::<Number>();

    let five = registry.parse_simple("5", number, ParseContext::Default).unwrap();
    assert_eq!(five.downcast_ref::<i64>(), Some(&5));
    let half = registry.parse_simple("0.5", number, ParseContext::Default).unwrap();
    assert_eq!(half.downcast_ref::<f64>(), Some(&0.5));
    let decimal = registry
        .parse_simple("5", RuntimeType::of::<f64>(), ParseContext::Default)
        .unwrap();
    assert_eq!(decimal.downcast_ref::<f64>(), Some(&5.0));

    assert!(registry.parse_simple("five", number, ParseContext::Default).is_none());
}

#[test]
fn test_parse_contexts() {
    let registry = registry();
    let string = RuntimeType::of::<String>();

    assert!(registry.parse_simple("hello", string, ParseContext::Default).is_none());
    assert!(registry.parse_simple("hello", string, ParseContext::Script).is_none());
    let quoted = registry
        .parse_simple("\"hello\"", string, ParseContext::Script)
        .unwrap();
    assert_eq!(quoted.downcast_ref::<String>().map(String::as_str), Some("hello"));
    let raw = registry.parse_simple("hello", string, ParseContext::Config).unwrap();
    assert_eq!(raw.downcast_ref::<String>().map(String::as_str), Some("hello"));

    let mut log = ParseLog::new();
    assert!(
        registry
            .parse_simple_with_log("\"a\"b\"", string, ParseContext::Script, &mut log)
            .is_none()
    );
    assert!(log.has_error());
}

#[test]
fn test_parse_through_converter() {
    let mut builder = RegistryBuilder::new(Settings::strict());
    defaults::register_defaults(&mut builder).unwrap();
    builder
        .register_class(
            ClassInfo::builder::<Celsius>("celsius")
                .parser(FnParser::render_only(|c: &Celsius| format!("{}°C", c.0)))
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.register_converter(|n: &f64| Some(Celsius(*n)), ConverterOptions::NO_COMMAND_ARGUMENTS);
    let registry = builder.build().unwrap();
    let celsius = RuntimeType::of::<Celsius>();

    assert!(registry.parse_simple("21", celsius, ParseContext::Default).is_none());
    assert!(registry.converters().converter_exists(RuntimeType::of::<i64>(), celsius));
    let value = registry.parse("21", celsius, ParseContext::Default).unwrap();
    assert_eq!(value.downcast_ref::<Celsius>(), Some(&Celsius(21.0)));
    assert!(registry.parse("21", celsius, ParseContext::Command).is_none());
    assert_eq!(registry.to_string(Some(&value)), "21°C");
}

#[test]
fn test_converter_chains() {
    let registry = registry();
    let converters = registry.converters();
    let double = RuntimeType::of::<f64>();

    let converted = converters.convert(Some(&Value::new(3_i64)), double).unwrap();
    assert_eq!(converted.downcast_ref::<f64>(), Some(&3.0));
    // Values already of the target type are returned unchanged.
    let same = Value::new(2.5_f64);
    assert!(converters.convert(Some(&same), double).unwrap().ptr_eq(&same));
    assert!(converters.convert(None, double).is_none());
    assert!(converters.convert(Some(&Value::new(true)), double).is_none());
}

#[test]
fn test_rendering() {
    let registry = registry();
    let values = [Value::new(1_i64), Value::new(2.25_f64), Value::new(true)];

    assert_eq!(registry.to_string_list(&values[..1], true, StringMode::Message, 0), "1");
    assert_eq!(registry.to_string_list(&values[..2], true, StringMode::Message, 0), "1 and 2.25");
    insta::assert_snapshot!(registry.to_string_list(&values, false, StringMode::Message, 0), @"1, 2.25 or true");
    assert_eq!(registry.to_string(Some(&Value::list(values.to_vec()))), "1, 2.25 and true");
    assert_eq!(registry.to_string(None), "<none>");
    assert_eq!(registry.to_string(Some(&Value::list(Vec::new()))), "<none>");

    assert_eq!(registry.debug_message(Some(&Value::new("hi".to_owned()))), "[string:\"hi\"]");
    assert_eq!(registry.to_variable_name_string(&Value::new(1.0_f64 / 3.0)), "0.33333333");
    assert_eq!(
        registry.to_string(Some(&Value::new(Timespan::from_millis(3_630_000)))),
        "1 hour and 30 seconds"
    );
    assert_eq!(registry.to_variable_name_string(&Value::new(Celsius(1.0))), "object:<registry::Celsius>");
}

#[test]
fn test_class_info_lookup() {
    let registry = registry();
    assert_eq!(registry.get_class_info_from_user_input("Numbers").map(ClassInfo::code_name), Some("number"));
    assert_eq!(registry.get_class_info_from_user_input("texts").map(ClassInfo::code_name), Some("string"));
    assert!(registry.get_class_info_from_user_input("numberz").is_none());

    assert_eq!(registry.get_exact_class_name(RuntimeType::of::<i64>()), Some("integer"));
    assert!(registry.get_exact_class_info(RuntimeType::of::<Celsius>()).is_none());
    let sup = registry.get_super_class_info(RuntimeType::of::<Celsius>()).unwrap();
    assert_eq!(sup.code_name(), "object");
    assert_eq!(registry.get_super_class_info(RuntimeType::of::<i64>()).unwrap().code_name(), "integer");
}

#[test]
fn test_serialize_round_trip() {
    let registry = registry();
    for value in [
        Value::new(-4_i64),
        Value::new(2.5_f64),
        Value::new(false),
        Value::new("Ünïcode text".to_owned()),
        Value::new(Timespan::from_millis(1500)),
    ] {
        let saved = registry.serialize(&value).unwrap();
        let loaded = registry.deserialize(&saved.type_code, &saved.data).unwrap();
        assert_eq!(registry.debug_message(Some(&loaded)), registry.debug_message(Some(&value)));
    }

    let saved = registry.serialize(&Value::new(Timespan::from_millis(1500))).unwrap();
    assert_eq!(saved.type_code, "timespan");
    assert!(registry.serialize(&Value::new(Celsius(1.0))).is_none());
    assert!(registry.deserialize("unknowntype", &saved.data).is_none());
    assert!(registry.deserialize("integer", &[0, 1]).is_none());
}

#[test]
fn test_serialize_as_redirect() {
    let mut builder = RegistryBuilder::new(Settings::strict());
    defaults::register_defaults(&mut builder).unwrap();
    builder
        .register_class(ClassInfo::builder::<u8>("byte").serialize_as::<i64>().build().unwrap())
        .unwrap();
    builder.register_converter(|n: &u8| Some(i64::from(*n)), ConverterOptions::empty());
    let registry = builder.build().unwrap();

    let saved = registry.serialize(&Value::new(7_u8)).unwrap();
    assert_eq!(saved.type_code, "integer");
    let loaded = registry.deserialize_serialized(&saved).unwrap();
    assert_eq!(loaded.downcast_ref::<i64>(), Some(&7));
}

#[test]
fn test_duplicate_registration_is_strict_only() {
    let mut builder = RegistryBuilder::new(Settings::strict());
    defaults::register_defaults(&mut builder).unwrap();
    let duplicate = ClassInfo::builder::<Celsius>("integer").build().unwrap();
    assert!(matches!(
        builder.register_class(duplicate),
        Err(RegistrationError::DuplicateCodeName { .. })
    ));

    let mut lenient = RegistryBuilder::new(Settings::default());
    defaults::register_defaults(&mut lenient).unwrap();
    defaults::register_defaults(&mut lenient).unwrap();
    assert_eq!(lenient.build().unwrap().class_infos().len(), 7);
}

#[test]
fn test_disabled_parser_family() {
    let mut builder = RegistryBuilder::new(Settings::strict());
    defaults::register_defaults(&mut builder).unwrap();
    builder
        .register_class(
            ClassInfo::builder::<Celsius>("celsius")
                .parser(FnParser::new(
                    |s, _| s.strip_suffix("°c").and_then(|n| n.parse().ok()).map(Celsius),
                    |c: &Celsius| format!("{}°c", c.0),
                ))
                .parser_family("temperature")
                .build()
                .unwrap(),
        )
        .unwrap();
    let registry = builder.build().unwrap();
    let celsius = RuntimeType::of::<Celsius>();

    assert!(registry.parse_simple("3°c", celsius, ParseContext::Default).is_some());
    registry.update_settings(|settings| {
        settings.disabled_parser_families.insert("temperature".to_owned());
    });
    assert!(registry.parse_simple("3°c", celsius, ParseContext::Default).is_none());
}
