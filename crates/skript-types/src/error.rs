//! Type engine error types.

use thiserror::Error;

use crate::runtime::RuntimeType;

/// Errors raised while registering types or closing the registry.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Two class infos share a code name.
    #[error("can't register {ty} with the code name '{code_name}' because that name is already used by {existing}")]
    DuplicateCodeName {
        code_name: String,
        ty: RuntimeType,
        existing: RuntimeType,
    },

    /// Two class infos describe the same runtime type.
    #[error("can't register the class info '{code_name}' because the type {ty} is already registered")]
    DuplicateType { code_name: String, ty: RuntimeType },

    /// Code names must be lowercase latin letters and digits.
    #[error("invalid code name '{0}': code names must only consist of lowercase latin letters and digits")]
    InvalidCodeName(String),

    /// Code names are stored next to every saved variable.
    #[error("the code name '{0}' is too long, the maximum length is {max}", max = crate::class_info::MAX_CODE_NAME_LENGTH)]
    CodeNameTooLong(String),

    /// A builder setter was called more than once.
    #[error("'{field}' was set more than once on class info '{code_name}'")]
    FieldSetTwice { code_name: String, field: &'static str },

    /// A class info has both a serializer and a serialize-as redirect.
    #[error("class info '{0}' can't have both a serializer and a serialize-as type")]
    SerializerConflict(String),

    /// A serialize-as redirect points to a type that can't be saved.
    #[error("class info '{code_name}' is serialized as {target}, which {reason}")]
    InvalidSerializeAs {
        code_name: String,
        target: RuntimeType,
        reason: &'static str,
    },

    /// A user input pattern is not a valid regex.
    #[error("invalid user input pattern for '{code_name}': {source}")]
    InvalidPattern {
        code_name: String,
        #[source]
        source: regex::Error,
    },

    /// A subtype declaration would make the hierarchy cyclic.
    #[error("declaring {sub} a subtype of {sup} would create a cycle")]
    SubtypeCycle { sub: RuntimeType, sup: RuntimeType },

    /// The before/after constraints can't be satisfied.
    #[error("ClassInfos with circular dependencies detected: {0}")]
    CircularDependency(String),
}

/// Result type for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// A strict conversion found no way to turn a value into the target type.
#[derive(Debug, Error)]
#[error("{from} can't be converted to {to}")]
pub struct ConversionError {
    pub from: RuntimeType,
    pub to: RuntimeType,
}

/// Errors raised while encoding or decoding values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream does not start with the magic number.
    #[error("not a value stream (bad magic number 0x{0:08x})")]
    BadMagic(u32),

    /// The stream was written by a newer codec.
    #[error("unsupported stream version {0}")]
    UnsupportedVersion(u16),

    /// An unknown tag byte.
    #[error("invalid tag 0x{0:02x}")]
    InvalidTag(u8),

    /// A tag that is valid but not allowed here.
    #[error("unexpected tag 0x{0:02x}")]
    UnexpectedTag(u8),

    /// The stream ended early.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Bytes left over after the value.
    #[error("{0} trailing byte(s) after the value")]
    TrailingBytes(usize),

    /// Writing the encoded bytes failed.
    #[error("failed to write value: {0}")]
    Io(#[from] std::io::Error),

    /// A string is not valid UTF-8.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A class id, enum id or field name of 255 bytes or more.
    #[error("field name or class id too long: {0}")]
    ShortStringTooLong(String),

    /// A short string back-reference that was never defined.
    #[error("invalid short string reference {0}")]
    InvalidShortStringReference(u32),

    /// An object back-reference that was never defined.
    #[error("invalid object reference {0}")]
    InvalidObjectReference(u32),

    /// A length that does not fit the wire format.
    #[error("length {0} is too large")]
    TooLarge(usize),

    /// An object has more fields than the format allows.
    #[error("'{0}' has too many fields")]
    TooManyFields(String),

    /// Array elements do not match the component type.
    #[error("array element does not match component type")]
    ComponentMismatch,

    /// A required field is absent.
    #[error("missing field '{0}'")]
    MissingField(String),

    /// A field holds a value of the wrong kind.
    #[error("field '{0}' has the wrong type")]
    WrongFieldType(String),

    /// The value is not of the type the serializer handles.
    #[error("expected a value of type {expected}, found {found}")]
    WrongValueType {
        expected: RuntimeType,
        found: RuntimeType,
    },

    /// The encoded value is of a kind the serializer does not read.
    #[error("can't deserialize {0}")]
    Unsupported(String),
}

/// Result type for encoding and decoding.
pub type CodecResult<T> = Result<T, CodecError>;
