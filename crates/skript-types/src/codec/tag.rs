//! Tag bytes of the value stream.

use crate::codec::value::PrimitiveKind;
use crate::error::{CodecError, CodecResult};

pub const NULL: u8 = 0x00;
pub const BYTE: u8 = 0x01;
pub const SHORT: u8 = 0x02;
pub const INT: u8 = 0x03;
pub const LONG: u8 = 0x04;
pub const FLOAT: u8 = 0x08;
pub const DOUBLE: u8 = 0x09;
pub const CHAR: u8 = 0x0E;
pub const BOOLEAN: u8 = 0x0F;
/// Added to a primitive tag to get the tag of its boxed form.
pub const WRAPPER: u8 = 0x10;
pub const STRING: u8 = 0x20;
pub const ARRAY: u8 = 0x30;
pub const ENUM: u8 = 0x40;
pub const CLASS: u8 = 0x41;
pub const OBJECT: u8 = 0x80;
pub const REFERENCE: u8 = 0xFF;

impl PrimitiveKind {
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Byte => BYTE,
            Self::Short => SHORT,
            Self::Int => INT,
            Self::Long => LONG,
            Self::Float => FLOAT,
            Self::Double => DOUBLE,
            Self::Char => CHAR,
            Self::Boolean => BOOLEAN,
        }
    }

    #[must_use]
    pub const fn wrapper_tag(self) -> u8 {
        self.tag() + WRAPPER
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            BYTE => Self::Byte,
            SHORT => Self::Short,
            INT => Self::Int,
            LONG => Self::Long,
            FLOAT => Self::Float,
            DOUBLE => Self::Double,
            CHAR => Self::Char,
            BOOLEAN => Self::Boolean,
            _ => return None,
        })
    }
}

/// Decoded meaning of a tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tag {
    Null,
    Primitive(PrimitiveKind),
    Wrapper(PrimitiveKind),
    String,
    Array,
    Enum,
    Class,
    Object,
    Reference,
}

impl Tag {
    pub(crate) fn parse(byte: u8) -> CodecResult<Self> {
        if let Some(kind) = PrimitiveKind::from_tag(byte) {
            return Ok(Self::Primitive(kind));
        }
        if let Some(kind) = byte.checked_sub(WRAPPER).and_then(PrimitiveKind::from_tag) {
            return Ok(Self::Wrapper(kind));
        }
        Ok(match byte {
            NULL => Self::Null,
            STRING => Self::String,
            ARRAY => Self::Array,
            ENUM => Self::Enum,
            CLASS => Self::Class,
            OBJECT => Self::Object,
            REFERENCE => Self::Reference,
            _ => return Err(CodecError::InvalidTag(byte)),
        })
    }
}
