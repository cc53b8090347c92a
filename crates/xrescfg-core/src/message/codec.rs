//! Protobuf wire codec driven by descriptors.
//!
//! The declared field kind, not the observed wire type, picks the decode
//! routine. Tag and varint primitives come from `prost::encoding`.

use super::{DynamicMessage, FieldValue, Value};
use crate::error::{Error, ErrorList, Result};
use crate::registry::{FieldDescriptor, FieldKind};
use bytes::{Buf, BufMut, Bytes};
use prost::encoding::{
    decode_key, decode_varint, encode_key, encode_varint, skip_field, DecodeContext, WireType,
};
use std::sync::Arc;
use tracing::trace;

/// How far a decode failure reaches
enum Failure {
    /// The field is dropped, decoding continues after it
    Field(Error),
    /// The cursor position is lost, decoding stops
    Stream(Error),
}

type Decoded<T> = std::result::Result<T, Failure>;

/// Nesting depth at which decoding gives up, same as prost
const RECURSION_LIMIT: u32 = 100;

fn take_len<'a>(buf: &mut &'a [u8], context: &str) -> Decoded<&'a [u8]> {
    let len = decode_varint(buf)
        .map_err(|e| Failure::Stream(Error::invalid_wire_format(context, e.to_string())))?;

    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= buf.len())
        .ok_or_else(|| {
            Failure::Stream(Error::invalid_wire_format(
                context,
                format!("length {} runs past the end of the buffer", len),
            ))
        })?;

    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn ensure(buf: &[u8], width: usize, kind: FieldKind, context: &str) -> Result<()> {
    if buf.remaining() < width {
        return Err(Error::invalid_wire_format(
            context,
            format!("truncated {} value", kind),
        ));
    }
    Ok(())
}

/// Reads one non-length-delimited value of `kind`
fn read_scalar(kind: FieldKind, buf: &mut &[u8], context: &str) -> Result<Value> {
    let value = match kind {
        FieldKind::Double => {
            ensure(buf, 8, kind, context)?;
            Value::F64(buf.get_f64_le())
        }
        FieldKind::Fixed64 => {
            ensure(buf, 8, kind, context)?;
            Value::U64(buf.get_u64_le())
        }
        FieldKind::Sfixed64 => {
            ensure(buf, 8, kind, context)?;
            Value::I64(buf.get_i64_le())
        }
        FieldKind::Float => {
            ensure(buf, 4, kind, context)?;
            Value::F32(buf.get_f32_le())
        }
        FieldKind::Fixed32 => {
            ensure(buf, 4, kind, context)?;
            Value::U32(buf.get_u32_le())
        }
        FieldKind::Sfixed32 => {
            ensure(buf, 4, kind, context)?;
            Value::I32(buf.get_i32_le())
        }
        _ => {
            let raw = decode_varint(buf)
                .map_err(|e| Error::invalid_wire_format(context, e.to_string()))?;
            match kind {
                FieldKind::Int32 => Value::I32(raw as i32),
                FieldKind::Int64 => Value::I64(raw as i64),
                FieldKind::Uint32 => Value::U32(raw as u32),
                FieldKind::Uint64 => Value::U64(raw),
                FieldKind::Sint32 => {
                    let n = raw as u32;
                    Value::I32(((n >> 1) as i32) ^ -((n & 1) as i32))
                }
                FieldKind::Sint64 => Value::I64(((raw >> 1) as i64) ^ -((raw & 1) as i64)),
                FieldKind::Bool => Value::Bool(raw != 0),
                FieldKind::Enum => Value::EnumNumber(raw as i32),
                other => {
                    return Err(Error::invalid_wire_format(
                        context,
                        format!("{} is not a scalar kind", other),
                    ))
                }
            }
        }
    };
    Ok(value)
}

fn put_len_delimited(data: &[u8], out: &mut Vec<u8>) {
    encode_varint(data.len() as u64, out);
    out.put_slice(data);
}

/// Appends one wire entry for `value`; `out` is untouched on error
fn write_value(
    message: &str,
    field: &FieldDescriptor,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<()> {
    let kind = field.kind();
    let Some(wire_type) = kind.wire_type() else {
        return Err(Error::UnsupportedFieldType {
            message: message.to_string(),
            field: field.name().to_string(),
            kind: kind.to_string(),
        });
    };
    if !field.has_valid_number() {
        return Err(Error::InvalidFieldNumber {
            message: message.to_string(),
            field: field.name().to_string(),
            number: i64::from(field.number()),
        });
    }

    let mut entry = Vec::new();
    encode_key(field.number(), wire_type, &mut entry);

    match (kind, value) {
        (FieldKind::Double, Value::F64(v)) => entry.put_f64_le(*v),
        (FieldKind::Float, Value::F32(v)) => entry.put_f32_le(*v),
        (FieldKind::Fixed64, Value::U64(v)) => entry.put_u64_le(*v),
        (FieldKind::Sfixed64, Value::I64(v)) => entry.put_i64_le(*v),
        (FieldKind::Fixed32, Value::U32(v)) => entry.put_u32_le(*v),
        (FieldKind::Sfixed32, Value::I32(v)) => entry.put_i32_le(*v),
        // negative int32 and enum values are sign-extended to 64 bits
        (FieldKind::Int32, Value::I32(v)) | (FieldKind::Enum, Value::EnumNumber(v)) => {
            encode_varint(i64::from(*v) as u64, &mut entry)
        }
        (FieldKind::Int64, Value::I64(v)) => encode_varint(*v as u64, &mut entry),
        (FieldKind::Uint32, Value::U32(v)) => encode_varint(u64::from(*v), &mut entry),
        (FieldKind::Uint64, Value::U64(v)) => encode_varint(*v, &mut entry),
        (FieldKind::Sint32, Value::I32(v)) => {
            encode_varint(u64::from(((v << 1) ^ (v >> 31)) as u32), &mut entry)
        }
        (FieldKind::Sint64, Value::I64(v)) => {
            encode_varint(((v << 1) ^ (v >> 63)) as u64, &mut entry)
        }
        (FieldKind::Bool, Value::Bool(v)) => encode_varint(u64::from(*v), &mut entry),
        (FieldKind::String, Value::String(v)) => put_len_delimited(v.as_bytes(), &mut entry),
        (FieldKind::Bytes, Value::Bytes(v)) => put_len_delimited(v, &mut entry),
        (FieldKind::Message, Value::Message(v)) => {
            let body = v.encode_to_vec()?;
            put_len_delimited(&body, &mut entry);
        }
        (_, other) => {
            return Err(Error::TypeMismatch {
                field: field.name().to_string(),
                expected: kind.as_str(),
                got: other.kind_name(),
            })
        }
    }

    out.extend_from_slice(&entry);
    Ok(())
}

impl DynamicMessage {
    /// Decodes `data` into this message, merging with fields already set.
    ///
    /// Fields unknown to the descriptor are skipped. A field that fails to
    /// decode is left out and decoding continues with the next one; every
    /// failure is returned together at the end, so an `Err` may still leave
    /// the well-formed fields populated. Truncated input stops the parse.
    pub fn parse(&mut self, data: &[u8]) -> Result<()> {
        let mut errors = ErrorList::new();
        self.merge_from(data, 0, &mut errors);
        errors.into_result()
    }

    /// `depth` counts the enclosing messages already being decoded
    fn merge_from(&mut self, mut buf: &[u8], depth: u32, errors: &mut ErrorList) {
        let descriptor = Arc::clone(&self.descriptor);

        while buf.has_remaining() {
            let (number, wire_type) = match decode_key(&mut buf) {
                Ok(key) => key,
                Err(e) => {
                    errors.push(Error::invalid_wire_format(
                        descriptor.full_name(),
                        e.to_string(),
                    ));
                    return;
                }
            };

            let Some(field) = descriptor.field_by_number(number) else {
                trace!("Skipping unknown field {} of {}", number, descriptor.full_name());
                if let Err(e) = skip_field(wire_type, number, &mut buf, DecodeContext::default()) {
                    errors.push(Error::invalid_wire_format(
                        descriptor.full_name(),
                        e.to_string(),
                    ));
                    return;
                }
                continue;
            };

            match self.decode_field(field, wire_type, &mut buf, depth) {
                Ok(()) => {}
                Err(Failure::Field(e)) => {
                    trace!("Dropping field {}.{}: {}", descriptor.full_name(), field.name(), e);
                    errors.push(e);
                }
                Err(Failure::Stream(e)) => {
                    errors.push(e);
                    return;
                }
            }
        }
    }

    fn decode_field(
        &mut self,
        field: &FieldDescriptor,
        wire_type: WireType,
        buf: &mut &[u8],
        depth: u32,
    ) -> Decoded<()> {
        let context = format!("{}.{}", self.full_name(), field.name());
        let kind = field.kind();

        let Some(expected) = kind.wire_type() else {
            skip_field(wire_type, field.number(), buf, DecodeContext::default())
                .map_err(|e| Failure::Stream(Error::invalid_wire_format(&context, e.to_string())))?;
            return Err(Failure::Field(Error::UnsupportedFieldType {
                message: self.full_name().to_string(),
                field: field.name().to_string(),
                kind: kind.to_string(),
            }));
        };

        if wire_type == WireType::LengthDelimited && field.is_repeated() && kind.is_packable() {
            let mut chunk = take_len(buf, &context)?;
            let mut values = Vec::new();
            while chunk.has_remaining() {
                values.push(read_scalar(kind, &mut chunk, &context).map_err(Failure::Field)?);
            }
            for value in values {
                self.push_value(field, value);
            }
            return Ok(());
        }

        if wire_type != expected {
            skip_field(wire_type, field.number(), buf, DecodeContext::default())
                .map_err(|e| Failure::Stream(Error::invalid_wire_format(&context, e.to_string())))?;
            return Err(Failure::Field(Error::invalid_wire_format(
                context,
                format!("expected {:?} wire type, got {:?}", expected, wire_type),
            )));
        }

        let value = match kind {
            FieldKind::String => {
                let data = take_len(buf, &context)?;
                let text = std::str::from_utf8(data).map_err(|e| {
                    Failure::Field(Error::invalid_wire_format(&context, e.to_string()))
                })?;
                Value::String(text.to_string())
            }
            FieldKind::Bytes => Value::Bytes(Bytes::copy_from_slice(take_len(buf, &context)?)),
            FieldKind::Message => {
                let data = take_len(buf, &context)?;
                if depth >= RECURSION_LIMIT {
                    return Err(Failure::Field(Error::invalid_wire_format(
                        context,
                        "recursion limit reached",
                    )));
                }
                let mut child = self.create_for_field(field).map_err(Failure::Field)?;
                let mut nested = ErrorList::new();
                child.merge_from(data, depth + 1, &mut nested);
                if !nested.is_empty() {
                    return Err(Failure::Field(Error::Multiple(nested)));
                }
                Value::Message(Box::new(child))
            }
            _ => read_scalar(kind, buf, &context).map_err(Failure::Stream)?,
        };

        self.push_value(field, value);
        Ok(())
    }

    /// Writes the populated fields in storage order.
    ///
    /// Repeated fields are written unpacked, one entry per element. A field
    /// that cannot be written is left out of the output; the others are still
    /// written and the failures are returned together.
    pub fn serialize(&self, buf: &mut impl BufMut) -> Result<()> {
        let mut errors = ErrorList::new();
        let data = self.write_fields(&mut errors);
        buf.put_slice(&data);
        errors.into_result()
    }

    /// Encodes into a fresh buffer; fails if any field could not be written
    pub fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut errors = ErrorList::new();
        let data = self.write_fields(&mut errors);
        errors.into_result().map(|()| data)
    }

    fn write_fields(&self, errors: &mut ErrorList) -> Vec<u8> {
        let mut out = Vec::new();

        for (number, stored) in &self.fields {
            let Some(field) = self.descriptor.field_by_number(*number) else {
                errors.push(Error::no_such_field(self.full_name(), number));
                continue;
            };

            let values = match stored {
                FieldValue::Single(value) => std::slice::from_ref(value),
                FieldValue::List(values) => values.as_slice(),
            };

            let mut entries = Vec::new();
            let written = values
                .iter()
                .try_for_each(|value| write_value(self.full_name(), field, value, &mut entries));
            match written {
                Ok(()) => out.extend_from_slice(&entries),
                Err(e) => {
                    trace!("Omitting field {}.{}: {}", self.full_name(), field.name(), e);
                    errors.push(e);
                }
            }
        }

        out
    }
}
