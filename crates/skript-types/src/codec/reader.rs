//! Decoder.

use std::io;

use byteorder::{BigEndian, ReadBytesExt};

use crate::codec::tag::{self, Tag};
use crate::codec::value::{ComponentType, Encoded, Fields, Primitive, PrimitiveKind};
use crate::codec::{MAGIC, VERSION};
use crate::error::{CodecError, CodecResult};

/// Where an object starts in the stream and how many short strings were
/// known at that point.
#[derive(Debug, Clone, Copy)]
struct Mark {
    offset: usize,
    short_strings: usize,
    complete: bool,
}

/// Reads one value from a byte slice.
pub struct Reader<'a> {
    stream: &'a [u8],
    input: &'a [u8],
    version: u16,
    short_strings: Vec<String>,
    /// Every non-null value read so far, by object id.
    objects: Vec<Mark>,
}

impl<'a> Reader<'a> {
    /// Check the stream header.
    pub fn new(input: &'a [u8]) -> CodecResult<Self> {
        let mut reader = Self {
            stream: input,
            input,
            version: 0,
            short_strings: Vec::new(),
            objects: Vec::new(),
        };
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(CodecError::BadMagic(magic));
        }
        let version = reader.u16()?;
        if version == 0 || version > VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        reader.version = version;
        Ok(reader)
    }

    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Read the single value of the stream and make sure nothing follows it.
    pub fn read_to_end(mut self) -> CodecResult<Encoded> {
        let value = self.read()?;
        if !self.input.is_empty() {
            return Err(CodecError::TrailingBytes(self.input.len()));
        }
        Ok(value)
    }

    pub fn read(&mut self) -> CodecResult<Encoded> {
        let mark = Mark {
            offset: self.stream.len() - self.input.len(),
            short_strings: self.short_strings.len(),
            complete: false,
        };
        let byte = self.u8()?;
        match Tag::parse(byte)? {
            Tag::Null => Ok(Encoded::Null),
            Tag::Reference => {
                let id = self.unsigned_int()?;
                self.resolve(id)
            }
            Tag::Primitive(_) => Err(CodecError::UnexpectedTag(byte)),
            tag => {
                let id = self.objects.len();
                self.objects.push(mark);
                let value = self.read_body(tag, byte)?;
                self.objects[id].complete = true;
                Ok(value)
            }
        }
    }

    /// Decode the object `id` again from where it starts in the stream.
    fn resolve(&self, id: u32) -> CodecResult<Encoded> {
        let invalid = || CodecError::InvalidObjectReference(id);
        let index = id as usize;
        let mark = self.objects.get(index).filter(|mark| mark.complete).ok_or_else(invalid)?;
        let mut again = Self {
            stream: self.stream,
            input: self.stream.get(mark.offset..).ok_or_else(invalid)?,
            version: self.version,
            short_strings: self.short_strings[..mark.short_strings].to_vec(),
            objects: self.objects[..index].to_vec(),
        };
        again.read()
    }

    fn read_body(&mut self, tag: Tag, byte: u8) -> CodecResult<Encoded> {
        Ok(match tag {
            Tag::Wrapper(kind) => Encoded::Wrapper(self.primitive(kind)?),
            Tag::String => Encoded::String(self.string()?),
            Tag::Array => self.array()?,
            Tag::Enum => Encoded::Enum {
                type_id: self.short_string()?,
                id: self.short_string()?,
            },
            Tag::Class => Encoded::Class(self.class()?),
            Tag::Object => self.object()?,
            Tag::Null | Tag::Reference | Tag::Primitive(_) => return Err(CodecError::UnexpectedTag(byte)),
        })
    }

    fn array(&mut self) -> CodecResult<Encoded> {
        let component = self.class()?;
        let len = self.unsigned_int()? as usize;
        let mut elements = Vec::with_capacity(len.min(self.input.len()));
        for _ in 0..len {
            let element = match &component {
                ComponentType::Primitive(kind) => Encoded::Wrapper(self.primitive(*kind)?),
                _ => self.read()?,
            };
            elements.push(element);
        }
        Ok(Encoded::Array { component, elements })
    }

    fn object(&mut self) -> CodecResult<Encoded> {
        let type_id = self.short_string()?;
        let count = self.unsigned_short()?;
        let mut fields = Fields::new();
        for _ in 0..count {
            let id = self.short_string()?;
            let byte = *self.input.first().ok_or(CodecError::UnexpectedEof)?;
            if let Tag::Primitive(kind) = Tag::parse(byte)? {
                self.input = self.input.get(1..).unwrap_or_default();
                fields.put_primitive(id, self.primitive(kind)?);
            } else {
                fields.put_object(id, self.read()?);
            }
        }
        Ok(Encoded::Object { type_id, fields })
    }

    fn class(&mut self) -> CodecResult<ComponentType> {
        let mut dimensions = 0;
        let byte = loop {
            let byte = self.u8()?;
            if byte != tag::ARRAY {
                break byte;
            }
            dimensions += 1;
        };
        let mut component = match Tag::parse(byte)? {
            Tag::Object => ComponentType::Object(self.short_string()?),
            Tag::Enum => ComponentType::Enum(self.short_string()?),
            Tag::Primitive(kind) => ComponentType::Primitive(kind),
            Tag::Wrapper(kind) => ComponentType::Wrapper(kind),
            Tag::String => ComponentType::String,
            Tag::Class => ComponentType::Class,
            Tag::Null | Tag::Reference | Tag::Array => return Err(CodecError::UnexpectedTag(byte)),
        };
        for _ in 0..dimensions {
            component = ComponentType::Array(Box::new(component));
        }
        Ok(component)
    }

    fn primitive(&mut self, kind: PrimitiveKind) -> CodecResult<Primitive> {
        Ok(match kind {
            PrimitiveKind::Byte => Primitive::Byte(self.number(ReadBytesExt::read_i8)?),
            PrimitiveKind::Short => Primitive::Short(self.number(|r| r.read_i16::<BigEndian>())?),
            PrimitiveKind::Int => Primitive::Int(self.number(|r| r.read_i32::<BigEndian>())?),
            PrimitiveKind::Long => Primitive::Long(self.number(|r| r.read_i64::<BigEndian>())?),
            PrimitiveKind::Float => Primitive::Float(self.number(|r| r.read_f32::<BigEndian>())?),
            PrimitiveKind::Double => Primitive::Double(self.number(|r| r.read_f64::<BigEndian>())?),
            PrimitiveKind::Char => Primitive::Char(self.u16()?),
            PrimitiveKind::Boolean => Primitive::Boolean(self.u8()? != 0),
        })
    }

    fn string(&mut self) -> CodecResult<String> {
        let len = self.unsigned_int()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    fn short_string(&mut self) -> CodecResult<String> {
        let len = self.u8()?;
        if len == tag::REFERENCE {
            let index = if self.version <= 1 {
                self.u32()?
            } else {
                self.unsigned_int()?
            };
            return self
                .short_strings
                .get(index as usize)
                .cloned()
                .ok_or(CodecError::InvalidShortStringReference(index));
        }
        let bytes = self.take(len as usize)?;
        let s = String::from_utf8(bytes.to_vec())?;
        if len > 4 {
            self.short_strings.push(s.clone());
        }
        Ok(s)
    }

    fn unsigned_short(&mut self) -> CodecResult<u16> {
        let first = self.u8()?;
        if first & 0x80 != 0 {
            return Ok(u16::from(first & 0x7F));
        }
        Ok(u16::from(first) << 8 | u16::from(self.u8()?))
    }

    fn unsigned_int(&mut self) -> CodecResult<u32> {
        let first = self.u8()?;
        if first & 0x80 != 0 {
            return Ok(u32::from(first & 0x7F) << 8 | u32::from(self.u8()?));
        }
        Ok(u32::from(first) << 24 | self.number(|r| r.read_u24::<BigEndian>())?)
    }

    fn u8(&mut self) -> CodecResult<u8> {
        self.number(ReadBytesExt::read_u8)
    }

    fn u16(&mut self) -> CodecResult<u16> {
        self.number(|r| r.read_u16::<BigEndian>())
    }

    fn u32(&mut self) -> CodecResult<u32> {
        self.number(|r| r.read_u32::<BigEndian>())
    }

    /// Run a `byteorder` read against the remaining input.
    fn number<T>(&mut self, read: impl FnOnce(&mut &'a [u8]) -> io::Result<T>) -> CodecResult<T> {
        read(&mut self.input).map_err(|_| CodecError::UnexpectedEof)
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.input.len() < len {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(head)
    }
}
