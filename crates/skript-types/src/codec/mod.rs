//! Compact tagged binary encoding of values.
//!
//! A stream is the magic number `Ygg\0`, a big-endian `u16` version and one
//! tagged value. Class ids, enum ids and field names longer than four bytes
//! are written once and referenced by index afterwards.

mod reader;
pub mod tag;
mod value;
mod writer;

pub use reader::Reader;
pub use value::{ComponentType, Encoded, Field, Fields, Primitive, PrimitiveKind};
pub use writer::Writer;

use crate::error::{CodecError, CodecResult};
use crate::runtime::Value;

pub const MAGIC: u32 = 0x5967_6700;
/// Version written by [`encode`]. Streams of version 1 can still be read.
pub const VERSION: u16 = 2;

/// Encode `value` as a complete stream.
pub fn encode(value: &Encoded) -> CodecResult<Vec<u8>> {
    let mut writer = Writer::new();
    writer.write(value)?;
    Ok(writer.finish())
}

/// Decode a complete stream.
pub fn decode(bytes: &[u8]) -> CodecResult<Encoded> {
    Reader::new(bytes)?.read_to_end()
}

/// A value as handed to storages: the code name of its class info and the
/// encoded bytes without the implied stream prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerializedValue {
    pub type_code: String,
    pub data: Vec<u8>,
}

impl SerializedValue {
    pub fn new(type_code: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            type_code: type_code.into(),
            data,
        }
    }
}

/// Turns values of one registered type into [`Encoded`] values and back.
pub trait Serializer: Send + Sync {
    /// Shape of the encoded top-level value.
    fn kind(&self) -> StoredKind {
        StoredKind::Object
    }

    /// Encode `value`. Objects and enums must use the class info's code name as type id.
    fn serialize(&self, value: &Value) -> CodecResult<Encoded>;

    fn deserialize(&self, encoded: &Encoded) -> CodecResult<Value>;

    /// Whether deserialization must happen on the thread that owns the values.
    fn must_sync_deserialization(&self) -> bool {
        false
    }
}

/// Top-level shape of a stored value. It decides which stream prefix is
/// implied and therefore left out of stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredKind {
    Wrapper(PrimitiveKind),
    String,
    Enum,
    Object,
}

impl StoredKind {
    /// The stream header, tag and type id every stored value of this kind starts with.
    pub fn prefix(self, code_name: &str) -> CodecResult<Vec<u8>> {
        let mut writer = Writer::new();
        match self {
            Self::Wrapper(kind) => writer.raw(kind.wrapper_tag()),
            Self::String => writer.raw(tag::STRING),
            Self::Enum => {
                writer.raw(tag::ENUM);
                writer.write_short_string(code_name)?;
            }
            Self::Object => {
                writer.raw(tag::OBJECT);
                writer.write_short_string(code_name)?;
            }
        }
        Ok(writer.finish())
    }
}

/// Encode `value` and drop the prefix implied by `kind` and `code_name`.
pub fn encode_stored(value: &Encoded, kind: StoredKind, code_name: &str) -> CodecResult<Vec<u8>> {
    let prefix = kind.prefix(code_name)?;
    let bytes = encode(value)?;
    match bytes.strip_prefix(prefix.as_slice()) {
        Some(data) => Ok(data.to_vec()),
        None => Err(CodecError::Unsupported(format!(
            "value of '{code_name}' does not start with its type prefix"
        ))),
    }
}

/// Inverse of [`encode_stored`].
pub fn decode_stored(data: &[u8], kind: StoredKind, code_name: &str) -> CodecResult<Encoded> {
    let mut bytes = kind.prefix(code_name)?;
    bytes.extend_from_slice(data);
    decode(&bytes)
}
