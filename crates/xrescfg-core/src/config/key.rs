//! Index keys.

use crate::error::{Error, Result};
use crate::message::{DynamicMessage, Value};
use crate::registry::{FieldDescriptor, FieldKind};
use bytes::Bytes;
use std::fmt;

/// One component of an index key.
///
/// Floating values are held by bit pattern so keys can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    /// Signed 32-bit, also enum numbers
    I32(i32),
    /// Signed 64-bit
    I64(i64),
    /// Unsigned 32-bit
    U32(u32),
    /// Unsigned 64-bit
    U64(u64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Bytes),
    /// `f32` bit pattern
    Float32(u32),
    /// `f64` bit pattern
    Float64(u64),
}

impl KeyPart {
    /// Key component for a stored field value; `None` for messages
    pub fn from_value(value: &Value) -> Option<KeyPart> {
        let part = match value {
            Value::F64(v) => KeyPart::Float64(v.to_bits()),
            Value::F32(v) => KeyPart::Float32(v.to_bits()),
            Value::I32(v) | Value::EnumNumber(v) => KeyPart::I32(*v),
            Value::I64(v) => KeyPart::I64(*v),
            Value::U32(v) => KeyPart::U32(*v),
            Value::U64(v) => KeyPart::U64(*v),
            Value::Bool(v) => KeyPart::Bool(*v),
            Value::String(v) => KeyPart::String(v.clone()),
            Value::Bytes(v) => KeyPart::Bytes(v.clone()),
            Value::Message(_) => return None,
        };
        Some(part)
    }

    /// Parses text into the key component a field of this kind produces
    pub fn parse_for(field: &FieldDescriptor, text: &str) -> Result<KeyPart> {
        let kind = field.kind();
        let invalid = || Error::TypeMismatch {
            field: field.name().to_string(),
            expected: kind.as_str(),
            got: "unparsable text",
        };
        let trimmed = text.trim();

        let part = match kind {
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 | FieldKind::Enum => {
                KeyPart::I32(trimmed.parse().map_err(|_| invalid())?)
            }
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => {
                KeyPart::I64(trimmed.parse().map_err(|_| invalid())?)
            }
            FieldKind::Uint32 | FieldKind::Fixed32 => {
                KeyPart::U32(trimmed.parse().map_err(|_| invalid())?)
            }
            FieldKind::Uint64 | FieldKind::Fixed64 => {
                KeyPart::U64(trimmed.parse().map_err(|_| invalid())?)
            }
            FieldKind::Bool => KeyPart::Bool(trimmed.parse().map_err(|_| invalid())?),
            FieldKind::Float => {
                KeyPart::from(trimmed.parse::<f32>().map_err(|_| invalid())?)
            }
            FieldKind::Double => {
                KeyPart::from(trimmed.parse::<f64>().map_err(|_| invalid())?)
            }
            FieldKind::String => KeyPart::String(text.to_string()),
            FieldKind::Bytes => KeyPart::Bytes(Bytes::copy_from_slice(text.as_bytes())),
            FieldKind::Message | FieldKind::Group | FieldKind::Unknown(_) => {
                return Err(Error::TypeMismatch {
                    field: field.name().to_string(),
                    expected: "scalar key",
                    got: kind.as_str(),
                })
            }
        };
        Ok(part)
    }
}

macro_rules! impl_key_part_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for KeyPart {
                fn from(v: $ty) -> Self {
                    KeyPart::$variant(v.into())
                }
            }
        )*
    };
}

impl_key_part_from! {
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    bool => Bool,
    String => String,
    &str => String,
    Bytes => Bytes,
}

impl From<f32> for KeyPart {
    fn from(v: f32) -> Self {
        KeyPart::Float32(v.to_bits())
    }
}

impl From<f64> for KeyPart {
    fn from(v: f64) -> Self {
        KeyPart::Float64(v.to_bits())
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::I32(v) => write!(f, "{}", v),
            KeyPart::I64(v) => write!(f, "{}", v),
            KeyPart::U32(v) => write!(f, "{}", v),
            KeyPart::U64(v) => write!(f, "{}", v),
            KeyPart::Bool(v) => write!(f, "{}", v),
            KeyPart::String(v) => write!(f, "{:?}", v),
            KeyPart::Bytes(v) => {
                for byte in v.iter() {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            KeyPart::Float32(bits) => write!(f, "{}", f32::from_bits(*bits)),
            KeyPart::Float64(bits) => write!(f, "{}", f64::from_bits(*bits)),
        }
    }
}

/// Composite index key, compared component by component
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Key(Vec<KeyPart>);

impl Key {
    /// Key from its components
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Single-component key
    pub fn single(part: impl Into<KeyPart>) -> Self {
        Self(vec![part.into()])
    }

    /// Single-component key from a singular scalar field of `row`
    pub fn from_field(row: &DynamicMessage, field: &str) -> Result<Self> {
        let value = row.get_field_value(field)?;
        value
            .as_deref()
            .and_then(KeyPart::from_value)
            .map(|part| Self(vec![part]))
            .ok_or_else(|| Error::TypeMismatch {
                field: field.to_string(),
                expected: "scalar key",
                got: "message",
            })
    }

    /// Appends a component
    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.0.push(part.into());
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the key with no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The components in order
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl From<KeyPart> for Key {
    fn from(part: KeyPart) -> Self {
        Self(vec![part])
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}
