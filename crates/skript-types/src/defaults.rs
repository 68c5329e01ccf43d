//! The built-in types: object, number, integer, double, boolean, string and timespan.

use std::any::Any;

use crate::class_info::{Arithmetic, ClassInfo};
use crate::codec::{Encoded, Fields, Primitive, PrimitiveKind, Serializer, StoredKind};
use crate::converter::ConverterOptions;
use crate::error::{CodecError, CodecResult, RegistrationResult};
use crate::log::{ErrorQuality, ParseLog};
use crate::parser::{FnParser, ParseContext, Parser};
use crate::registry::RegistryBuilder;
use crate::runtime::{RuntimeType, Value};
use crate::timespan::Timespan;

/// Marker for the abstract number type. Its values are `i64` or `f64`.
pub enum Number {}

/// Decimal places shown in messages.
pub const MESSAGE_ACCURACY: usize = 2;
/// Decimal places kept in variable names.
pub const VARIABLE_NAME_ACCURACY: usize = 8;

/// Render a decimal with at most `accuracy` places and no trailing zeros.
#[must_use]
pub fn format_number(value: f64, accuracy: usize) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "infinity" } else { "-infinity" }.to_owned();
    }
    let fixed = format!("{value:.accuracy$}");
    let trimmed = if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.')
    } else {
        fixed.as_str()
    };
    if trimmed == "-0" { "0".to_owned() } else { trimmed.to_owned() }
}

fn parse_integer(input: &str) -> Option<i64> {
    let digits = input.strip_prefix('-').unwrap_or(input);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    input.parse().ok()
}

/// Decimal with an optional trailing `%`, which divides by 100.
fn parse_decimal(input: &str) -> Option<f64> {
    let (digits, percent) = input.strip_suffix('%').map_or((input, false), |digits| (digits, true));
    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    if !unsigned.chars().any(|c| c.is_ascii_digit()) || !unsigned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    Some(if percent { value / 100.0 } else { value })
}

/// Parses either integer or decimal text.
struct NumberParser;

impl NumberParser {
    fn render(value: &Value, accuracy: usize) -> String {
        if let Some(n) = value.downcast_ref::<i64>() {
            return n.to_string();
        }
        if let Some(n) = value.downcast_ref::<f64>() {
            return format_number(*n, accuracy);
        }
        format!("{value:?}")
    }
}

impl Parser for NumberParser {
    fn parse(&self, input: &str, _context: ParseContext, _log: &mut ParseLog) -> Option<Value> {
        parse_integer(input)
            .map(Value::new)
            .or_else(|| parse_decimal(input).map(Value::new))
    }

    fn to_string(&self, value: &Value, _flags: u32) -> String {
        Self::render(value, MESSAGE_ACCURACY)
    }

    fn to_variable_name_string(&self, value: &Value) -> String {
        Self::render(value, VARIABLE_NAME_ACCURACY)
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    value
        .downcast_ref::<f64>()
        .copied()
        .or_else(|| value.downcast_ref::<i64>().map(|n| *n as f64))
}

/// Arithmetic on integers and decimals. Two integers stay integral unless the
/// result overflows.
struct NumberArithmetic;

impl NumberArithmetic {
    fn apply(
        first: &Value,
        second: &Value,
        integer: fn(i64, i64) -> Option<i64>,
        decimal: fn(f64, f64) -> f64,
    ) -> Option<Value> {
        if let (Some(a), Some(b)) = (first.downcast_ref::<i64>(), second.downcast_ref::<i64>()) {
            if let Some(result) = integer(*a, *b) {
                return Some(Value::new(result));
            }
        }
        Some(Value::new(decimal(as_f64(first)?, as_f64(second)?)))
    }
}

impl Arithmetic for NumberArithmetic {
    fn difference(&self, first: &Value, second: &Value) -> Option<Value> {
        Self::apply(
            first,
            second,
            |a, b| a.checked_sub(b).and_then(i64::checked_abs),
            |a, b| (a - b).abs(),
        )
    }

    fn add(&self, value: &Value, delta: &Value) -> Option<Value> {
        Self::apply(value, delta, i64::checked_add, |a, b| a + b)
    }

    fn subtract(&self, value: &Value, delta: &Value) -> Option<Value> {
        Self::apply(value, delta, i64::checked_sub, |a, b| a - b)
    }
}

/// Subtraction does not go below zero.
struct TimespanArithmetic;

fn timespans<'a>(first: &'a Value, second: &'a Value) -> Option<(&'a Timespan, &'a Timespan)> {
    Some((first.downcast_ref()?, second.downcast_ref()?))
}

impl Arithmetic for TimespanArithmetic {
    fn difference(&self, first: &Value, second: &Value) -> Option<Value> {
        let (a, b) = timespans(first, second)?;
        let millis = i64::try_from(a.millis().abs_diff(b.millis())).unwrap_or(i64::MAX);
        Some(Value::new(Timespan::from_millis(millis)))
    }

    fn add(&self, value: &Value, delta: &Value) -> Option<Value> {
        let (a, b) = timespans(value, delta)?;
        Some(Value::new(Timespan::from_millis(a.millis().saturating_add(b.millis()))))
    }

    fn subtract(&self, value: &Value, delta: &Value) -> Option<Value> {
        let (a, b) = timespans(value, delta)?;
        Some(Value::new(Timespan::from_millis(a.millis().saturating_sub(b.millis()).max(0))))
    }
}

fn downcast<T: Any>(value: &Value) -> CodecResult<&T> {
    value.downcast_ref().ok_or(CodecError::WrongValueType {
        expected: RuntimeType::of::<T>(),
        found: value.runtime_type(),
    })
}

/// Saves a value as a single boxed primitive.
struct PrimitiveSerializer<T> {
    kind: PrimitiveKind,
    to: fn(&T) -> Primitive,
    from: fn(Primitive) -> Option<T>,
}

impl<T: Any + Send + Sync> Serializer for PrimitiveSerializer<T> {
    fn kind(&self) -> StoredKind {
        StoredKind::Wrapper(self.kind)
    }

    fn serialize(&self, value: &Value) -> CodecResult<Encoded> {
        Ok(Encoded::Wrapper((self.to)(downcast::<T>(value)?)))
    }

    fn deserialize(&self, encoded: &Encoded) -> CodecResult<Value> {
        encoded
            .as_primitive()
            .and_then(self.from)
            .map(Value::new)
            .ok_or_else(|| CodecError::Unsupported(format!("{encoded:?}")))
    }
}

struct StringSerializer;

impl Serializer for StringSerializer {
    fn kind(&self) -> StoredKind {
        StoredKind::String
    }

    fn serialize(&self, value: &Value) -> CodecResult<Encoded> {
        Ok(Encoded::String(downcast::<String>(value)?.clone()))
    }

    fn deserialize(&self, encoded: &Encoded) -> CodecResult<Value> {
        encoded
            .as_str()
            .map(|s| Value::new(s.to_owned()))
            .ok_or_else(|| CodecError::Unsupported(format!("{encoded:?}")))
    }
}

struct TimespanSerializer;

impl Serializer for TimespanSerializer {
    fn serialize(&self, value: &Value) -> CodecResult<Encoded> {
        let mut fields = Fields::new();
        fields.put_primitive("millis", Primitive::Long(downcast::<Timespan>(value)?.millis()));
        Ok(Encoded::object("timespan", fields))
    }

    fn deserialize(&self, encoded: &Encoded) -> CodecResult<Value> {
        let fields = encoded
            .as_fields()
            .ok_or_else(|| CodecError::Unsupported(format!("{encoded:?}")))?;
        Ok(Value::new(Timespan::from_millis(fields.long("millis")?)))
    }
}

/// Text in quotes, where `""` stands for one quote.
fn unquote(input: &str) -> Option<String> {
    let inner = input.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '"' && chars.next() != Some('"') {
            return None;
        }
        out.push(c);
    }
    Some(out)
}

fn parse_string(input: &str, context: ParseContext, log: &mut ParseLog) -> Option<String> {
    match context {
        ParseContext::Config | ParseContext::Command => Some(input.to_owned()),
        ParseContext::Script | ParseContext::Event => {
            let text = unquote(input);
            if text.is_none() && input.starts_with('"') {
                log.error(format!("{input} is not quoted correctly"), ErrorQuality::SemanticError);
            }
            text
        }
        ParseContext::Default => None,
    }
}

fn parse_boolean(input: &str) -> Option<bool> {
    match input.to_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Register the built-in types and their converters.
pub fn register_defaults(builder: &mut RegistryBuilder) -> RegistrationResult<()> {
    builder
        .declare_subtype::<i64, Number>()?
        .declare_subtype::<f64, Number>()?;

    builder
        .register_class(
            ClassInfo::builder_for(RuntimeType::object(), "object")
                .user(&["objects?"])
                .name("object")
                .description(&["The supertype of all types."])
                .build()?,
        )?
        .register_class(
            ClassInfo::builder::<Number>("number")
                .user(&["num(ber)?s?"])
                .name("number")
                .parser(NumberParser)
                .math::<Number>(NumberArithmetic)
                .description(&["A number, e.g. 2.5, 3, or -9812454."])
                .examples(&["set {_temp} to 2*{_temp} - 2.5"])
                .build()?,
        )?
        .register_class(
            ClassInfo::builder::<i64>("integer")
                .user(&["int(eger)?s?"])
                .name("integer")
                .parser(
                    FnParser::new(|s, _| parse_integer(s), i64::to_string)
                        .variable_name(i64::to_string),
                )
                .math::<i64>(NumberArithmetic)
                .serializer(PrimitiveSerializer::<i64> {
                    kind: PrimitiveKind::Long,
                    to: |n| Primitive::Long(*n),
                    from: |p| p.as_i64(),
                })
                .build()?,
        )?
        .register_class(
            ClassInfo::builder::<f64>("double")
                .user(&["doubles?", "decimals?"])
                .name("decimal")
                .parser(
                    FnParser::new(|s, _| parse_decimal(s), |n: &f64| format_number(*n, MESSAGE_ACCURACY))
                        .variable_name(|n: &f64| format_number(*n, VARIABLE_NAME_ACCURACY)),
                )
                .math::<f64>(NumberArithmetic)
                .serializer(PrimitiveSerializer::<f64> {
                    kind: PrimitiveKind::Double,
                    to: |n| Primitive::Double(*n),
                    from: |p| p.as_f64(),
                })
                .build()?,
        )?
        .register_class(
            ClassInfo::builder::<bool>("boolean")
                .user(&["booleans?"])
                .name("boolean")
                .parser(FnParser::new(|s, _| parse_boolean(s), bool::to_string))
                .serializer(PrimitiveSerializer::<bool> {
                    kind: PrimitiveKind::Boolean,
                    to: |b| Primitive::Boolean(*b),
                    from: |p| match p {
                        Primitive::Boolean(b) => Some(b),
                        _ => None,
                    },
                })
                .build()?,
        )?
        .register_class(
            ClassInfo::builder::<String>("string")
                .user(&["(text|string)s?"])
                .name("text")
                .parser(
                    FnParser::with_log(parse_string, String::clone)
                        .debug(|s: &String| format!("\"{s}\""))
                        .only_in(&[
                            ParseContext::Event,
                            ParseContext::Command,
                            ParseContext::Config,
                            ParseContext::Script,
                        ]),
                )
                .serializer(StringSerializer)
                .build()?,
        )?
        .register_class(
            ClassInfo::builder::<Timespan>("timespan")
                .user(&["time ?spans?"])
                .name("timespan")
                .parser(FnParser::new(|s, _| Timespan::parse(s), Timespan::to_string))
                .math::<Timespan>(TimespanArithmetic)
                .serializer(TimespanSerializer)
                .description(&["A period of time, e.g. 1 hour and 30 seconds."])
                .build()?,
        )?;

    builder.register_converter(|n: &i64| Some(*n as f64), ConverterOptions::empty());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0, 2), "2");
        assert_eq!(format_number(2.5, 2), "2.5");
        assert_eq!(format_number(1.0 / 3.0, 2), "0.33");
        assert_eq!(format_number(1.0 / 3.0, 8), "0.33333333");
        assert_eq!(format_number(-0.001, 2), "0");
        assert_eq!(format_number(f64::INFINITY, 2), "infinity");
    }

    #[test]
    fn test_timespan_difference_saturates() {
        let difference = |a: i64, b: i64| {
            let value = TimespanArithmetic
                .difference(&Value::new(Timespan::from_millis(a)), &Value::new(Timespan::from_millis(b)))
                .unwrap();
            value.downcast_ref::<Timespan>().unwrap().millis()
        };
        assert_eq!(difference(1500, 4000), 2500);
        assert_eq!(difference(i64::MAX, -1), i64::MAX);
        assert_eq!(difference(i64::MIN, i64::MAX), i64::MAX);
    }

    #[test]
    fn test_number_text() {
        assert_eq!(parse_integer("-12"), Some(-12));
        assert_eq!(parse_integer("+12"), None);
        assert_eq!(parse_integer("1.5"), None);
        assert_eq!(parse_decimal("1.5"), Some(1.5));
        assert_eq!(parse_decimal("50%"), Some(0.5));
        assert_eq!(parse_decimal("."), None);
        assert_eq!(parse_decimal("1e5"), None);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""say ""hi""""#).as_deref(), Some(r#"say "hi""#));
        assert_eq!(unquote(r#""a"b""#), None);
        assert_eq!(unquote("plain"), None);
    }

    #[test]
    fn test_number_arithmetic() {
        let math = NumberArithmetic;
        let sum = math.add(&Value::new(2_i64), &Value::new(3_i64)).unwrap();
        assert_eq!(sum.downcast_ref::<i64>(), Some(&5));
        let mixed = math.subtract(&Value::new(2_i64), &Value::new(0.5_f64)).unwrap();
        assert_eq!(mixed.downcast_ref::<f64>(), Some(&1.5));
        let overflow = math.add(&Value::new(i64::MAX), &Value::new(1_i64)).unwrap();
        assert!(overflow.is::<f64>());
    }

    #[test]
    fn test_timespan_arithmetic_floor() {
        let math = TimespanArithmetic;
        let result = math
            .subtract(&Value::new(Timespan::from_millis(5)), &Value::new(Timespan::from_millis(10)))
            .unwrap();
        assert_eq!(result.downcast_ref::<Timespan>(), Some(&Timespan::from_millis(0)));
    }

    #[test]
    fn test_serializers() {
        let integer = PrimitiveSerializer::<i64> {
            kind: PrimitiveKind::Long,
            to: |n| Primitive::Long(*n),
            from: |p| p.as_i64(),
        };
        let encoded = integer.serialize(&Value::new(7_i64)).unwrap();
        let data = codec::encode_stored(&encoded, integer.kind(), "integer").unwrap();
        assert_eq!(data, [0, 0, 0, 0, 0, 0, 0, 7]);
        assert!(matches!(
            integer.serialize(&Value::new(true)),
            Err(CodecError::WrongValueType { .. })
        ));

        let encoded = TimespanSerializer.serialize(&Value::new(Timespan::from_millis(1500))).unwrap();
        let back = TimespanSerializer.deserialize(&encoded).unwrap();
        assert_eq!(back.downcast_ref::<Timespan>(), Some(&Timespan::from_millis(1500)));
    }
}
