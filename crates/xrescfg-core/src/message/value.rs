//! Field values and the type-compatibility rules applied before storing.

use super::DynamicMessage;
use crate::error::{Error, Result};
use crate::registry::{FieldDescriptor, FieldKind, Registry};
use bytes::Bytes;
use std::fmt;

/// A single field value.
///
/// Lists are not a variant: repeated fields hold a `Vec<Value>` in
/// [`FieldValue::List`], so a list can never contain another list.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `double`
    F64(f64),
    /// `float`
    F32(f32),
    /// `int32`, `sint32`, `sfixed32`
    I32(i32),
    /// `int64`, `sint64`, `sfixed64`
    I64(i64),
    /// `uint32`, `fixed32`
    U32(u32),
    /// `uint64`, `fixed64`
    U64(u64),
    /// `bool`
    Bool(bool),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Bytes),
    /// Enum number
    EnumNumber(i32),
    /// Nested message, owned by its parent
    Message(Box<DynamicMessage>),
}

/// Stored data of one field
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Single(Value),
    List(Vec<Value>),
}

impl Value {
    /// Zero value of a kind; `None` for message and unsupported kinds
    pub fn default_for(kind: FieldKind) -> Option<Value> {
        let value = match kind {
            FieldKind::Double => Value::F64(0.0),
            FieldKind::Float => Value::F32(0.0),
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => Value::I32(0),
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => Value::I64(0),
            FieldKind::Uint32 | FieldKind::Fixed32 => Value::U32(0),
            FieldKind::Uint64 | FieldKind::Fixed64 => Value::U64(0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::String => Value::String(String::new()),
            FieldKind::Bytes => Value::Bytes(Bytes::new()),
            FieldKind::Enum => Value::EnumNumber(0),
            FieldKind::Message | FieldKind::Group | FieldKind::Unknown(_) => return None,
        };
        Some(value)
    }

    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::F64(_) => "double",
            Value::F32(_) => "float",
            Value::I32(_) => "int32",
            Value::I64(_) => "int64",
            Value::U32(_) => "uint32",
            Value::U64(_) => "uint64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::EnumNumber(_) => "enum",
            Value::Message(_) => "message",
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f32.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as i32.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as u32.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as an enum number.
    pub fn as_enum_number(&self) -> Option<i32> {
        match self {
            Value::EnumNumber(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a nested message.
    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(v) => Some(&**v),
            _ => None,
        }
    }

    pub(crate) fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Value::F64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::I32(v) | Value::EnumNumber(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
            Value::Bytes(v) => {
                for byte in v.iter() {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            Value::Message(v) => v.write_body(f, indent),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    f64 => F64,
    f32 => F32,
    i8 => I32,
    i16 => I32,
    i32 => I32,
    i64 => I64,
    u8 => U32,
    u16 => U32,
    u32 => U32,
    u64 => U64,
    bool => Bool,
    String => String,
    &str => String,
    Bytes => Bytes,
    Vec<u8> => Bytes,
}

impl From<DynamicMessage> for Value {
    fn from(v: DynamicMessage) -> Self {
        Value::Message(Box::new(v))
    }
}

/// Integer view of a value for the numeric coercion rules
fn integer_of(field: &FieldDescriptor, value: &Value) -> Result<i128> {
    let expected = field.kind().as_str();
    match value {
        Value::I32(v) | Value::EnumNumber(v) => Ok(i128::from(*v)),
        Value::I64(v) => Ok(i128::from(*v)),
        Value::U32(v) => Ok(i128::from(*v)),
        Value::U64(v) => Ok(i128::from(*v)),
        Value::F32(v) => float_to_integer(field, f64::from(*v)),
        Value::F64(v) => float_to_integer(field, *v),
        Value::String(s) => s.trim().parse::<i128>().map_err(|_| Error::TypeMismatch {
            field: field.name().to_string(),
            expected,
            got: "non-numeric string",
        }),
        other => Err(Error::TypeMismatch {
            field: field.name().to_string(),
            expected,
            got: other.kind_name(),
        }),
    }
}

fn float_to_integer(field: &FieldDescriptor, v: f64) -> Result<i128> {
    if !v.is_finite() {
        return Err(Error::OutOfRange {
            field: field.name().to_string(),
            value: v.to_string(),
            expected: field.kind().as_str(),
        });
    }
    // `as` saturates; anything that large fails the range check below
    Ok(v.round_ties_even() as i128)
}

fn narrow<T: TryFrom<i128>>(field: &FieldDescriptor, n: i128) -> Result<T> {
    T::try_from(n).map_err(|_| Error::OutOfRange {
        field: field.name().to_string(),
        value: n.to_string(),
        expected: field.kind().as_str(),
    })
}

/// Validates `value` against the declared type of `field` and converts it to
/// the representation stored for that type.
pub(crate) fn coerce(
    message: &str,
    field: &FieldDescriptor,
    value: Value,
    registry: &Registry,
) -> Result<Value> {
    let mismatch = |got: &'static str| Error::TypeMismatch {
        field: field.name().to_string(),
        expected: field.kind().as_str(),
        got,
    };

    match field.kind() {
        FieldKind::Double => match value {
            Value::F64(v) => Ok(Value::F64(v)),
            Value::F32(v) => Ok(Value::F64(f64::from(v))),
            other => Err(mismatch(other.kind_name())),
        },
        FieldKind::Float => match value {
            Value::F64(v) => Ok(Value::F32(v as f32)),
            Value::F32(v) => Ok(Value::F32(v)),
            other => Err(mismatch(other.kind_name())),
        },
        FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => {
            let n = integer_of(field, &value)?;
            narrow::<i32>(field, n).map(Value::I32)
        }
        FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => {
            let n = integer_of(field, &value)?;
            narrow::<i64>(field, n).map(Value::I64)
        }
        FieldKind::Uint32 | FieldKind::Fixed32 => {
            let n = integer_of(field, &value)?;
            narrow::<u32>(field, n).map(Value::U32)
        }
        FieldKind::Uint64 | FieldKind::Fixed64 => {
            let n = integer_of(field, &value)?;
            narrow::<u64>(field, n).map(Value::U64)
        }
        FieldKind::Bool => match value {
            Value::Bool(v) => Ok(Value::Bool(v)),
            other => Err(mismatch(other.kind_name())),
        },
        FieldKind::String => match value {
            Value::String(v) => Ok(Value::String(v)),
            other => Err(mismatch(other.kind_name())),
        },
        FieldKind::Bytes => match value {
            Value::Bytes(v) => Ok(Value::Bytes(v)),
            other => Err(mismatch(other.kind_name())),
        },
        FieldKind::Enum => match value {
            Value::String(path) => registry
                .get_enum_value_descriptor(&path)
                .map(|v| Value::EnumNumber(v.number()))
                .ok_or(Error::EnumValueNotFound { path }),
            other => {
                let n = integer_of(field, &other)?;
                narrow::<i32>(field, n).map(Value::EnumNumber)
            }
        },
        FieldKind::Message => match value {
            Value::Message(m) if m.full_name() == field.type_name() => Ok(Value::Message(m)),
            Value::Message(m) => Err(Error::MessageTypeMismatch {
                field: field.name().to_string(),
                expected: field.type_name().to_string(),
                got: m.full_name().to_string(),
            }),
            other => Err(mismatch(other.kind_name())),
        },
        FieldKind::Group | FieldKind::Unknown(_) => Err(Error::UnsupportedFieldType {
            message: message.to_string(),
            field: field.name().to_string(),
            kind: field.kind().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Cardinality;
    use crate::test_support;

    const ITEM: &str = "demo.Item";

    fn field(kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor::new("f", 1, kind, Cardinality::Singular, ".demo.Color")
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Value::default_for(FieldKind::String), Some(Value::String(String::new())));
        assert_eq!(Value::default_for(FieldKind::Sint64), Some(Value::I64(0)));
        assert_eq!(Value::default_for(FieldKind::Fixed32), Some(Value::U32(0)));
        assert_eq!(Value::default_for(FieldKind::Bytes), Some(Value::Bytes(Bytes::new())));
        assert_eq!(Value::default_for(FieldKind::Message), None);
    }

    #[test]
    fn test_integer_kinds_convert_numbers_and_strings() {
        let registry = test_support::registry();
        let f = field(FieldKind::Uint32);

        assert_eq!(coerce(ITEM, &f, Value::I64(7), &registry).unwrap(), Value::U32(7));
        assert_eq!(coerce(ITEM, &f, Value::F64(2.5), &registry).unwrap(), Value::U32(2));
        assert_eq!(coerce(ITEM, &f, Value::F32(3.5), &registry).unwrap(), Value::U32(4));
        assert_eq!(coerce(ITEM, &f, " 42 ".into(), &registry).unwrap(), Value::U32(42));

        let f = field(FieldKind::Sint64);
        assert_eq!(coerce(ITEM, &f, Value::U32(9), &registry).unwrap(), Value::I64(9));
        assert_eq!(coerce(ITEM, &f, "-12".into(), &registry).unwrap(), Value::I64(-12));
    }

    #[test]
    fn test_integer_kinds_reject_out_of_range_and_garbage() {
        let registry = test_support::registry();

        let err = coerce(ITEM, &field(FieldKind::Uint32), Value::I32(-1), &registry).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));

        let err =
            coerce(ITEM, &field(FieldKind::Int32), Value::U64(u64::MAX), &registry).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));

        let err = coerce(ITEM, &field(FieldKind::Int64), "ten".into(), &registry).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let err = coerce(ITEM, &field(FieldKind::Int64), Value::Bool(true), &registry).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { got: "bool", .. }));

        let err =
            coerce(ITEM, &field(FieldKind::Int64), Value::F64(f64::NAN), &registry).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
    }

    #[test]
    fn test_floating_kinds_accept_only_floats() {
        let registry = test_support::registry();
        assert_eq!(
            coerce(ITEM, &field(FieldKind::Double), Value::F32(1.5), &registry).unwrap(),
            Value::F64(1.5)
        );
        assert_eq!(
            coerce(ITEM, &field(FieldKind::Float), Value::F64(0.25), &registry).unwrap(),
            Value::F32(0.25)
        );
        assert!(coerce(ITEM, &field(FieldKind::Double), Value::I32(1), &registry).is_err());
    }

    #[test]
    fn test_exact_kinds() {
        let registry = test_support::registry();
        assert!(coerce(ITEM, &field(FieldKind::Bool), Value::Bool(true), &registry).is_ok());
        assert!(coerce(ITEM, &field(FieldKind::Bool), Value::I32(1), &registry).is_err());
        assert!(coerce(ITEM, &field(FieldKind::String), Value::I32(1), &registry).is_err());
        assert!(coerce(ITEM, &field(FieldKind::Bytes), "abc".into(), &registry).is_err());
        assert!(coerce(ITEM, &field(FieldKind::Bytes), vec![1u8, 2].into(), &registry).is_ok());
    }

    #[test]
    fn test_enum_accepts_numbers_and_symbolic_names() {
        let registry = test_support::registry();
        let f = field(FieldKind::Enum);

        assert_eq!(coerce(ITEM, &f, Value::U32(1), &registry).unwrap(), Value::EnumNumber(1));
        assert_eq!(coerce(ITEM, &f, Value::F64(2.0), &registry).unwrap(), Value::EnumNumber(2));
        assert_eq!(
            coerce(ITEM, &f, "demo.Color.BLUE".into(), &registry).unwrap(),
            Value::EnumNumber(2)
        );

        let err = coerce(ITEM, &f, "demo.Color.PURPLE".into(), &registry).unwrap_err();
        assert_eq!(err.to_string(), "enum value path demo.Color.PURPLE not found");
    }

    #[test]
    fn test_message_kind_requires_exact_type() {
        let registry = test_support::registry();
        let f = FieldDescriptor::new(
            "pos",
            16,
            FieldKind::Message,
            Cardinality::Singular,
            ".demo.Point",
        );

        let point = registry.create("demo.Point").unwrap();
        assert!(coerce(ITEM, &f, point.into(), &registry).is_ok());

        let other = registry.create("T").unwrap();
        let err = coerce(ITEM, &f, other.into(), &registry).unwrap_err();
        assert!(matches!(err, Error::MessageTypeMismatch { .. }));

        assert!(coerce(ITEM, &f, Value::I32(0), &registry).is_err());
    }

    #[test]
    fn test_group_is_unsupported() {
        let registry = test_support::registry();
        let err = coerce(ITEM, &field(FieldKind::Group), Value::I32(1), &registry).unwrap_err();
        assert_eq!(err.to_string(), "field type group in demo.Item.f unsupported");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bytes(Bytes::from_static(&[0x0a, 0xff])).to_string(), "0AFF");
        assert_eq!(Value::String("a".into()).to_string(), "\"a\"");
        assert_eq!(Value::EnumNumber(3).to_string(), "3");
    }
}
