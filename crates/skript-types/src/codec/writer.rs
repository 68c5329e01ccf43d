//! Encoder.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use hashbrown::HashMap;

use crate::codec::tag;
use crate::codec::value::{ComponentType, Encoded, Field, Primitive};
use crate::codec::{MAGIC, VERSION};
use crate::error::{CodecError, CodecResult};

/// Writes values into a byte buffer, sharing repeated short strings.
pub struct Writer {
    out: Vec<u8>,
    version: u16,
    short_strings: HashMap<String, u32>,
}

impl Writer {
    /// A writer for the current version, with the stream header already written.
    #[must_use]
    pub fn new() -> Self {
        Self::with_version(VERSION)
    }

    /// Versions before 2 store short string references as plain ints.
    #[must_use]
    pub fn with_version(version: u16) -> Self {
        let mut header = [0; 6];
        BigEndian::write_u32(&mut header[..4], MAGIC);
        BigEndian::write_u16(&mut header[4..], version);
        Self {
            out: header.to_vec(),
            version,
            short_strings: HashMap::new(),
        }
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.out
    }

    pub fn write(&mut self, value: &Encoded) -> CodecResult<()> {
        match value {
            Encoded::Null => self.out.push(tag::NULL),
            Encoded::Wrapper(primitive) => {
                self.out.push(primitive.kind().wrapper_tag());
                self.primitive(*primitive)?;
            }
            Encoded::String(s) => {
                self.out.push(tag::STRING);
                self.string(s)?;
            }
            Encoded::Array { component, elements } => self.array(component, elements)?,
            Encoded::Enum { type_id, id } => {
                self.out.push(tag::ENUM);
                self.short_string(type_id)?;
                self.short_string(id)?;
            }
            Encoded::Class(component) => {
                self.out.push(tag::CLASS);
                self.class(component)?;
            }
            Encoded::Object { type_id, fields } => {
                let count = u16::try_from(fields.len())
                    .ok()
                    .filter(|&count| count <= i16::MAX as u16)
                    .ok_or_else(|| CodecError::TooManyFields(type_id.clone()))?;
                self.out.push(tag::OBJECT);
                self.short_string(type_id)?;
                self.unsigned_short(count)?;
                for (id, field) in fields.iter() {
                    self.short_string(id)?;
                    match field {
                        Field::Primitive(primitive) => {
                            self.out.push(primitive.kind().tag());
                            self.primitive(*primitive)?;
                        }
                        Field::Value(value) => self.write(value)?,
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn raw(&mut self, byte: u8) {
        self.out.push(byte);
    }

    pub(crate) fn write_short_string(&mut self, s: &str) -> CodecResult<()> {
        self.short_string(s)
    }

    fn array(&mut self, component: &ComponentType, elements: &[Encoded]) -> CodecResult<()> {
        self.out.push(tag::ARRAY);
        self.class(component)?;
        self.unsigned_int(elements.len())?;
        match component {
            ComponentType::Primitive(kind) => {
                for element in elements {
                    match element {
                        Encoded::Wrapper(primitive) if primitive.kind() == *kind => self.primitive(*primitive)?,
                        _ => return Err(CodecError::ComponentMismatch),
                    }
                }
            }
            _ => {
                for element in elements {
                    self.write(element)?;
                }
            }
        }
        Ok(())
    }

    fn class(&mut self, mut component: &ComponentType) -> CodecResult<()> {
        while let ComponentType::Array(inner) = component {
            self.out.push(tag::ARRAY);
            component = inner;
        }
        match component {
            ComponentType::Object(id) => {
                self.out.push(tag::OBJECT);
                self.short_string(id)?;
            }
            ComponentType::Enum(id) => {
                self.out.push(tag::ENUM);
                self.short_string(id)?;
            }
            ComponentType::Primitive(kind) => self.out.push(kind.tag()),
            ComponentType::Wrapper(kind) => self.out.push(kind.wrapper_tag()),
            ComponentType::String => self.out.push(tag::STRING),
            ComponentType::Class => self.out.push(tag::CLASS),
            ComponentType::Array(_) => {}
        }
        Ok(())
    }

    fn primitive(&mut self, primitive: Primitive) -> CodecResult<()> {
        match primitive {
            Primitive::Byte(v) => self.out.write_i8(v)?,
            Primitive::Short(v) => self.out.write_i16::<BigEndian>(v)?,
            Primitive::Int(v) => self.out.write_i32::<BigEndian>(v)?,
            Primitive::Long(v) => self.out.write_i64::<BigEndian>(v)?,
            Primitive::Float(v) => self.out.write_f32::<BigEndian>(v)?,
            Primitive::Double(v) => self.out.write_f64::<BigEndian>(v)?,
            Primitive::Char(v) => self.out.write_u16::<BigEndian>(v)?,
            Primitive::Boolean(v) => self.out.write_u8(u8::from(v))?,
        }
        Ok(())
    }

    fn unsigned_short(&mut self, value: u16) -> CodecResult<()> {
        if value <= 0x7F {
            self.out.write_u8(0x80 | value as u8)?;
        } else {
            self.out.write_u16::<BigEndian>(value)?;
        }
        Ok(())
    }

    fn unsigned_int(&mut self, value: usize) -> CodecResult<()> {
        if value <= 0x7FFF {
            self.out.write_u16::<BigEndian>(0x8000 | value as u16)?;
        } else {
            let value = i32::try_from(value).map_err(|_| CodecError::TooLarge(value))?;
            self.out.write_i32::<BigEndian>(value)?;
        }
        Ok(())
    }

    fn string(&mut self, s: &str) -> CodecResult<()> {
        self.unsigned_int(s.len())?;
        self.out.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Class ids, enum ids and field names.
    fn short_string(&mut self, s: &str) -> CodecResult<()> {
        if let Some(&index) = self.short_strings.get(s) {
            self.out.push(tag::REFERENCE);
            if self.version <= 1 {
                self.out.write_u32::<BigEndian>(index)?;
            } else {
                self.unsigned_int(index as usize)?;
            }
            return Ok(());
        }
        let len = u8::try_from(s.len())
            .ok()
            .filter(|&len| len != tag::REFERENCE)
            .ok_or_else(|| CodecError::ShortStringTooLong(s.to_owned()))?;
        self.out.push(len);
        self.out.extend_from_slice(s.as_bytes());
        if len > 4 {
            let index = self.short_strings.len() as u32;
            self.short_strings.insert(s.to_owned(), index);
        }
        Ok(())
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}
