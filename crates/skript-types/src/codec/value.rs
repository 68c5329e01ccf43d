//! The encoded value model.

use crate::error::{CodecError, CodecResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Boolean,
}

/// A fixed-size scalar. `Char` is a UTF-16 code unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u16),
    Boolean(bool),
}

impl Primitive {
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Byte(_) => PrimitiveKind::Byte,
            Self::Short(_) => PrimitiveKind::Short,
            Self::Int(_) => PrimitiveKind::Int,
            Self::Long(_) => PrimitiveKind::Long,
            Self::Float(_) => PrimitiveKind::Float,
            Self::Double(_) => PrimitiveKind::Double,
            Self::Char(_) => PrimitiveKind::Char,
            Self::Boolean(_) => PrimitiveKind::Boolean,
        }
    }

    /// Integral value of any integer kind.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(v as i64),
            Self::Short(v) => Some(v as i64),
            Self::Int(v) => Some(v as i64),
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Floating value of any numeric kind.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }
}

/// Element type of an array, or the payload of a class literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentType {
    Primitive(PrimitiveKind),
    Wrapper(PrimitiveKind),
    String,
    Class,
    Enum(String),
    Object(String),
    Array(Box<ComponentType>),
}

/// One value of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    Null,
    /// A boxed primitive.
    Wrapper(Primitive),
    String(String),
    /// Elements of a primitive array are stored as [`Encoded::Wrapper`]s.
    Array {
        component: ComponentType,
        elements: Vec<Encoded>,
    },
    Enum {
        type_id: String,
        id: String,
    },
    Class(ComponentType),
    Object {
        type_id: String,
        fields: Fields,
    },
}

impl Encoded {
    pub fn object(type_id: impl Into<String>, fields: Fields) -> Self {
        Self::Object {
            type_id: type_id.into(),
            fields,
        }
    }

    pub fn enum_constant(type_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Enum {
            type_id: type_id.into(),
            id: id.into(),
        }
    }

    #[must_use]
    pub const fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Self::Wrapper(primitive) => Some(*primitive),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_fields(&self) -> Option<&Fields> {
        match self {
            Self::Object { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

/// A field value: either a raw primitive or a full value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Primitive(Primitive),
    Value(Encoded),
}

/// Ordered named fields of an object. Putting an existing id replaces it in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    fields: Vec<(String, Field)>,
}

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, id: impl Into<String>, field: Field) {
        let id = id.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, slot)) => *slot = field,
            None => self.fields.push((id, field)),
        }
    }

    pub fn put_primitive(&mut self, id: impl Into<String>, value: Primitive) {
        self.put(id, Field::Primitive(value));
    }

    pub fn put_object(&mut self, id: impl Into<String>, value: Encoded) {
        self.put(id, Field::Value(value));
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|(existing, _)| existing == id).map(|(_, field)| field)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn primitive(&self, id: &str) -> CodecResult<Primitive> {
        match self.get(id) {
            Some(Field::Primitive(primitive) | Field::Value(Encoded::Wrapper(primitive))) => Ok(*primitive),
            Some(_) => Err(CodecError::WrongFieldType(id.to_owned())),
            None => Err(CodecError::MissingField(id.to_owned())),
        }
    }

    pub fn object(&self, id: &str) -> CodecResult<&Encoded> {
        match self.get(id) {
            Some(Field::Value(value)) => Ok(value),
            Some(Field::Primitive(_)) => Err(CodecError::WrongFieldType(id.to_owned())),
            None => Err(CodecError::MissingField(id.to_owned())),
        }
    }

    pub fn long(&self, id: &str) -> CodecResult<i64> {
        self.primitive(id)?
            .as_i64()
            .ok_or_else(|| CodecError::WrongFieldType(id.to_owned()))
    }

    pub fn double(&self, id: &str) -> CodecResult<f64> {
        self.primitive(id)?
            .as_f64()
            .ok_or_else(|| CodecError::WrongFieldType(id.to_owned()))
    }

    pub fn string(&self, id: &str) -> CodecResult<&str> {
        self.object(id)?
            .as_str()
            .ok_or_else(|| CodecError::WrongFieldType(id.to_owned()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(id, field)| (id.as_str(), field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_accessors() {
        let mut fields = Fields::new();
        fields.put_primitive("millis", Primitive::Long(1500));
        fields.put_object("name", Encoded::String("x".to_owned()));
        fields.put_primitive("millis", Primitive::Int(7));

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.long("millis").unwrap(), 7);
        assert_eq!(fields.double("millis").unwrap(), 7.0);
        assert_eq!(fields.string("name").unwrap(), "x");
        assert!(matches!(fields.long("name"), Err(CodecError::WrongFieldType(_))));
        assert!(matches!(fields.object("other"), Err(CodecError::MissingField(_))));
        assert_eq!(fields.iter().next().unwrap().0, "millis");
    }
}
