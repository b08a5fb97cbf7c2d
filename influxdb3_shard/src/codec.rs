//! Encoding of a point's field values into the bytes stored per timestamp.
//!
//! Each measurement has a [`FieldCodec`] that assigns its fields a one-byte
//! id and a fixed type. An encoded point is a sequence of records, one per
//! field present in the point:
//!
//! ```text
//! ┌────────┬───────────────────────────────────────────┐
//! │ Id     │ Payload                                   │
//! │ 1 byte │ float / integer: 8 bytes, big-endian      │
//! │        │ boolean: 1 byte                           │
//! │        │ string: 2 byte big-endian length + UTF-8  │
//! └────────┴───────────────────────────────────────────┘
//! ```
//!
//! The payload layout is determined by the field's type in the codec, so
//! bytes can only be decoded by the codec that wrote them.

use crate::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use indexmap::IndexMap;
use influxdb3_influxql::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::io::Cursor;

/// The maximum number of fields a measurement can have.
pub const MAX_FIELDS: usize = u8::MAX as usize;

const MAX_STRING_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Float,
    Integer,
    Boolean,
    String,
}

impl FieldType {
    pub fn of(value: &FieldValue) -> Self {
        match value {
            FieldValue::Float(_) => Self::Float,
            FieldValue::Integer(_) => Self::Integer,
            FieldValue::Boolean(_) => Self::Boolean,
            FieldValue::String(_) => Self::String,
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::String => "string",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub id: u8,
    pub name: String,
    pub field_type: FieldType,
}

/// The field dictionary of one measurement. Ids are assigned from 1 in the
/// order fields are first written.
#[derive(Debug, Clone, Default)]
pub struct FieldCodec {
    fields: IndexMap<String, FieldDefinition>,
}

impl FieldCodec {
    /// Registers `name` with `field_type`, returning its id. Registering an
    /// existing field with a different type is an error.
    pub fn create_field_if_not_exists(&mut self, name: &str, field_type: FieldType) -> Result<u8> {
        if let Some(def) = self.fields.get(name) {
            if def.field_type != field_type {
                return Err(Error::FieldTypeConflict {
                    name: name.to_string(),
                    existing: def.field_type,
                    new: field_type,
                });
            }
            return Ok(def.id);
        }

        if self.fields.len() >= MAX_FIELDS {
            return Err(Error::TooManyFields { max: MAX_FIELDS });
        }
        let id = (self.fields.len() + 1) as u8;
        self.fields.insert(
            name.to_string(),
            FieldDefinition {
                id,
                name: name.to_string(),
                field_type,
            },
        );
        Ok(id)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    fn field_by_id(&self, id: u8) -> Result<&FieldDefinition> {
        id.checked_sub(1)
            .and_then(|i| self.fields.get_index(i as usize))
            .map(|(_, def)| def)
            .ok_or(Error::UnknownFieldId(id))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Encodes `fields`, each of which must already be registered with a
    /// matching type.
    pub fn encode_fields(&self, fields: &BTreeMap<String, FieldValue>) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(fields.len() * 9);
        for (name, value) in fields {
            let def = self
                .field(name)
                .ok_or_else(|| Error::FieldNotFound(name.clone()))?;
            if def.field_type != FieldType::of(value) {
                return Err(Error::FieldTypeConflict {
                    name: name.clone(),
                    existing: def.field_type,
                    new: FieldType::of(value),
                });
            }

            buf.push(def.id);
            match value {
                FieldValue::Float(v) => buf.write_f64::<BigEndian>(*v)?,
                FieldValue::Integer(v) => buf.write_i64::<BigEndian>(*v)?,
                FieldValue::Boolean(v) => buf.push(u8::from(*v)),
                FieldValue::String(v) => {
                    if v.len() > MAX_STRING_LEN {
                        return Err(Error::StringTooLong {
                            name: name.clone(),
                            max: MAX_STRING_LEN,
                        });
                    }
                    buf.write_u16::<BigEndian>(v.len() as u16)?;
                    buf.extend_from_slice(v.as_bytes());
                }
            }
        }
        Ok(buf.into())
    }

    /// Decodes only the field `name` from `data`, skipping over the others.
    pub fn decode_by_name(&self, name: &str, data: &[u8]) -> Result<FieldValue> {
        let target = self
            .field(name)
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))?
            .id;

        let mut cursor = Cursor::new(data);
        while (cursor.position() as usize) < data.len() {
            let def = self.field_by_id(cursor.read_u8()?)?;
            if def.id == target {
                return read_value(&mut cursor, def.field_type);
            }
            skip_value(&mut cursor, def.field_type)?;
        }
        Err(Error::FieldNotFound(name.to_string()))
    }

    /// Decodes every field in `data`, keyed by field name.
    pub fn decode_fields_with_names(&self, data: &[u8]) -> Result<BTreeMap<String, FieldValue>> {
        let mut cursor = Cursor::new(data);
        let mut fields = BTreeMap::new();
        while (cursor.position() as usize) < data.len() {
            let def = self.field_by_id(cursor.read_u8()?)?;
            let value = read_value(&mut cursor, def.field_type)?;
            fields.insert(def.name.clone(), value);
        }
        Ok(fields)
    }
}

fn read_value(cursor: &mut Cursor<&[u8]>, field_type: FieldType) -> Result<FieldValue> {
    Ok(match field_type {
        FieldType::Float => FieldValue::Float(cursor.read_f64::<BigEndian>()?),
        FieldType::Integer => FieldValue::Integer(cursor.read_i64::<BigEndian>()?),
        FieldType::Boolean => FieldValue::Boolean(cursor.read_u8()? != 0),
        FieldType::String => {
            let len = cursor.read_u16::<BigEndian>()? as usize;
            let mut bytes = vec![0; len];
            std::io::Read::read_exact(cursor, &mut bytes)?;
            FieldValue::String(String::from_utf8(bytes)?)
        }
    })
}

fn skip_value(cursor: &mut Cursor<&[u8]>, field_type: FieldType) -> Result<()> {
    let len = match field_type {
        FieldType::Float | FieldType::Integer => 8,
        FieldType::Boolean => 1,
        FieldType::String => cursor.read_u16::<BigEndian>()? as u64,
    };
    let next = cursor.position() + len;
    if next > cursor.get_ref().len() as u64 {
        return Err(Error::Malformed(std::io::ErrorKind::UnexpectedEof.into()));
    }
    cursor.set_position(next);
    Ok(())
}
